//! in-process stand-in for a windowing library. state is thread-local so that tests running in
//! parallel each see their own driver.

use std::cell::RefCell;
use std::ffi::{CStr, c_char, c_void};
use std::ptr::null_mut;

use crate::attribs::pairs_from_ptr;
use crate::libegl::*;

pub const DISPLAY: EGLDisplay = 0xd15 as EGLDisplay;
pub const CONFIG: EGLConfig = 0xc0f as EGLConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetDisplay,
    Initialize,
    ChooseConfig(Vec<EGLint>),
    BindApi(EGLenum),
    CreateContext(Vec<EGLint>),
    CreateWindowSurface { window: usize },
    CreatePbufferSurface(Vec<EGLint>),
    MakeCurrent { surface: usize, context: usize },
    SwapBuffers { surface: usize },
    SwapInterval(EGLint),
    DestroySurface { surface: usize },
    DestroyContext { context: usize },
    Terminate,
    ReleaseThread,
}

#[derive(Debug, Default)]
pub struct Driver {
    pub fail_initialize: bool,
    pub fail_choose_config: bool,
    pub no_matching_config: bool,
    pub fail_bind_api: bool,
    /// number of upcoming eglCreateContext calls that fail.
    pub create_context_failures: usize,
    pub fail_create_surface: bool,
    pub fail_make_current: bool,
    pub fail_swap_buffers: bool,

    current_context: usize,
    current_surface: usize,
    error: EGLint,
    next_handle: usize,
    calls: Vec<Call>,
}

impl Driver {
    fn fail(&mut self, code: EGLenum) {
        self.error = code as EGLint;
    }

    fn handle(&mut self, base: usize) -> usize {
        self.next_handle += 1;
        base + self.next_handle
    }
}

thread_local! {
    static DRIVER: RefCell<Driver> = RefCell::new(Driver::default());
}

pub fn with<R>(f: impl FnOnce(&mut Driver) -> R) -> R {
    DRIVER.with(|driver| f(&mut driver.borrow_mut()))
}

pub fn reset() {
    with(|driver| *driver = Driver::default());
}

pub fn calls() -> Vec<Call> {
    with(|driver| driver.calls.clone())
}

fn record(call: Call) {
    with(|driver| driver.calls.push(call));
}

unsafe fn attribs_to_vec(attrib_list: *const EGLint) -> Vec<EGLint> {
    if attrib_list.is_null() {
        return Vec::new();
    }
    let mut attribs = unsafe { pairs_from_ptr(attrib_list) }.to_vec();
    attribs.push(NONE as EGLint);
    attribs
}

unsafe extern "C" fn get_display(_display_id: EGLNativeDisplayType) -> EGLDisplay {
    record(Call::GetDisplay);
    DISPLAY
}

unsafe extern "C" fn initialize(
    _dpy: EGLDisplay,
    major: *mut EGLint,
    minor: *mut EGLint,
) -> EGLBoolean {
    record(Call::Initialize);
    if with(|driver| driver.fail_initialize) {
        with(|driver| driver.fail(NOT_INITIALIZED));
        return FALSE;
    }
    unsafe {
        *major = 1;
        *minor = 5;
    }
    TRUE
}

unsafe extern "C" fn choose_config(
    _dpy: EGLDisplay,
    attrib_list: *const EGLint,
    configs: *mut EGLConfig,
    config_size: EGLint,
    num_config: *mut EGLint,
) -> EGLBoolean {
    record(Call::ChooseConfig(unsafe { attribs_to_vec(attrib_list) }));
    let (fail, no_match) = with(|driver| (driver.fail_choose_config, driver.no_matching_config));
    if fail {
        with(|driver| driver.fail(BAD_ATTRIBUTE));
        return FALSE;
    }
    unsafe {
        if !no_match && !configs.is_null() && config_size > 0 {
            *configs = CONFIG;
        }
        if !num_config.is_null() {
            *num_config = if no_match { 0 } else { 1 };
        }
    }
    TRUE
}

unsafe extern "C" fn bind_api(api: EGLenum) -> EGLBoolean {
    record(Call::BindApi(api));
    if with(|driver| driver.fail_bind_api) {
        with(|driver| driver.fail(BAD_PARAMETER));
        return FALSE;
    }
    TRUE
}

unsafe extern "C" fn create_context(
    _dpy: EGLDisplay,
    _config: EGLConfig,
    _share_context: EGLContext,
    attrib_list: *const EGLint,
) -> EGLContext {
    record(Call::CreateContext(unsafe { attribs_to_vec(attrib_list) }));
    with(|driver| {
        if driver.create_context_failures > 0 {
            driver.create_context_failures -= 1;
            driver.fail(BAD_MATCH);
            NO_CONTEXT
        } else {
            driver.handle(0xc000) as EGLContext
        }
    })
}

unsafe extern "C" fn create_window_surface(
    _dpy: EGLDisplay,
    _config: EGLConfig,
    win: EGLNativeWindowType,
    _attrib_list: *const EGLint,
) -> EGLSurface {
    record(Call::CreateWindowSurface {
        window: win as usize,
    });
    with(|driver| {
        if driver.fail_create_surface {
            driver.fail(BAD_NATIVE_WINDOW);
            NO_SURFACE
        } else {
            driver.handle(0x5000) as EGLSurface
        }
    })
}

unsafe extern "C" fn make_current(
    _dpy: EGLDisplay,
    draw: EGLSurface,
    _read: EGLSurface,
    ctx: EGLContext,
) -> EGLBoolean {
    record(Call::MakeCurrent {
        surface: draw as usize,
        context: ctx as usize,
    });
    with(|driver| {
        if driver.fail_make_current {
            driver.fail(BAD_SURFACE);
            FALSE
        } else {
            driver.current_context = ctx as usize;
            driver.current_surface = draw as usize;
            TRUE
        }
    })
}

unsafe extern "C" fn swap_buffers(_dpy: EGLDisplay, surface: EGLSurface) -> EGLBoolean {
    record(Call::SwapBuffers {
        surface: surface as usize,
    });
    with(|driver| {
        if driver.fail_swap_buffers {
            driver.fail(BAD_SURFACE);
            FALSE
        } else {
            TRUE
        }
    })
}

unsafe extern "C" fn destroy_surface(_dpy: EGLDisplay, surface: EGLSurface) -> EGLBoolean {
    record(Call::DestroySurface {
        surface: surface as usize,
    });
    TRUE
}

unsafe extern "C" fn destroy_context(_dpy: EGLDisplay, ctx: EGLContext) -> EGLBoolean {
    record(Call::DestroyContext {
        context: ctx as usize,
    });
    TRUE
}

unsafe extern "C" fn terminate(_dpy: EGLDisplay) -> EGLBoolean {
    record(Call::Terminate);
    TRUE
}

unsafe extern "C" fn get_error() -> EGLint {
    with(|driver| std::mem::replace(&mut driver.error, SUCCESS as EGLint))
}

unsafe extern "C" fn fake_extension() {}

unsafe extern "C" fn get_proc_address(procname: *const c_char) -> *mut c_void {
    if unsafe { CStr::from_ptr(procname) } == c"glFakeExtensionEXT" {
        fake_extension as unsafe extern "C" fn() as *mut c_void
    } else {
        null_mut()
    }
}

unsafe extern "C" fn swap_interval(_dpy: EGLDisplay, interval: EGLint) -> EGLBoolean {
    record(Call::SwapInterval(interval));
    TRUE
}

unsafe extern "C" fn release_thread() -> EGLBoolean {
    record(Call::ReleaseThread);
    TRUE
}

unsafe extern "C" fn get_current_context() -> EGLContext {
    with(|driver| driver.current_context as EGLContext)
}

unsafe extern "C" fn query_surface(
    _dpy: EGLDisplay,
    _surface: EGLSurface,
    attribute: EGLint,
    value: *mut EGLint,
) -> EGLBoolean {
    let answer = match attribute as EGLenum {
        WIDTH => 640,
        HEIGHT => 480,
        _ => return FALSE,
    };
    unsafe { *value = answer };
    TRUE
}

unsafe extern "C" fn get_config_attrib(
    _dpy: EGLDisplay,
    _config: EGLConfig,
    attribute: EGLint,
    value: *mut EGLint,
) -> EGLBoolean {
    let answer = match attribute as EGLenum {
        DEPTH_SIZE => 16,
        RED_SIZE | GREEN_SIZE | BLUE_SIZE | ALPHA_SIZE => 8,
        _ => return FALSE,
    };
    unsafe { *value = answer };
    TRUE
}

unsafe extern "C" fn query_string(_dpy: EGLDisplay, name: EGLint) -> *const c_char {
    match name as EGLenum {
        VENDOR => c"fake".as_ptr(),
        VERSION => c"1.5 fake".as_ptr(),
        _ => std::ptr::null(),
    }
}

unsafe extern "C" fn get_current_surface(readdraw: EGLint) -> EGLSurface {
    match readdraw as EGLenum {
        DRAW | READ => with(|driver| driver.current_surface as EGLSurface),
        _ => {
            with(|driver| driver.fail(BAD_PARAMETER));
            NO_SURFACE
        }
    }
}

unsafe extern "C" fn create_pbuffer_surface(
    _dpy: EGLDisplay,
    _config: EGLConfig,
    attrib_list: *const EGLint,
) -> EGLSurface {
    record(Call::CreatePbufferSurface(unsafe { attribs_to_vec(attrib_list) }));
    with(|driver| {
        if driver.fail_create_surface {
            driver.fail(BAD_ALLOC);
            NO_SURFACE
        } else {
            driver.handle(0x5000) as EGLSurface
        }
    })
}

/// resolves egl entry point names to the fake driver, null for anything else.
pub fn lookup(name: &CStr) -> *mut c_void {
    macro_rules! entry {
        ($f:ident: $ty:ty) => {
            $f as $ty as *mut c_void
        };
    }

    match name.to_bytes() {
        b"eglGetDisplay" => entry!(get_display: GetDisplayFn),
        b"eglInitialize" => entry!(initialize: InitializeFn),
        b"eglChooseConfig" => entry!(choose_config: ChooseConfigFn),
        b"eglBindAPI" => entry!(bind_api: BindApiFn),
        b"eglCreateContext" => entry!(create_context: CreateContextFn),
        b"eglCreateWindowSurface" => entry!(create_window_surface: CreateWindowSurfaceFn),
        b"eglMakeCurrent" => entry!(make_current: MakeCurrentFn),
        b"eglSwapBuffers" => entry!(swap_buffers: SwapBuffersFn),
        b"eglDestroySurface" => entry!(destroy_surface: DestroySurfaceFn),
        b"eglDestroyContext" => entry!(destroy_context: DestroyContextFn),
        b"eglTerminate" => entry!(terminate: TerminateFn),
        b"eglGetError" => entry!(get_error: GetErrorFn),
        b"eglGetProcAddress" => entry!(get_proc_address: GetProcAddressFn),
        b"eglSwapInterval" => entry!(swap_interval: SwapIntervalFn),
        b"eglReleaseThread" => entry!(release_thread: ReleaseThreadFn),
        b"eglGetCurrentContext" => entry!(get_current_context: GetCurrentContextFn),
        b"eglQuerySurface" => entry!(query_surface: QuerySurfaceFn),
        b"eglGetConfigAttrib" => entry!(get_config_attrib: GetConfigAttribFn),
        b"eglQueryString" => entry!(query_string: QueryStringFn),
        b"eglGetCurrentSurface" => entry!(get_current_surface: GetCurrentSurfaceFn),
        b"eglCreatePbufferSurface" => entry!(create_pbuffer_surface: CreatePbufferSurfaceFn),
        _ => null_mut(),
    }
}

pub fn api() -> Api {
    match unsafe { Api::load_with(lookup) } {
        Ok(api) => api,
        Err(err) => panic!("fake driver is incomplete: {err}"),
    }
}
