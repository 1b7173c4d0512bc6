#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::ffi::{CStr, c_char, c_uint, c_void};
use std::mem::{size_of, transmute_copy};
use std::ptr::null_mut;
use std::{error, fmt};

pub type khronos_int32_t = i32;

// https://registry.khronos.org/EGL/api/EGL/eglplatform.h

pub type EGLNativeDisplayType = *mut c_void;
pub type EGLNativeWindowType = *mut c_void;

pub type EGLint = khronos_int32_t;

// https://registry.khronos.org/EGL/api/EGL/egl.h

pub type EGLBoolean = c_uint;
pub type EGLenum = c_uint;
pub type EGLDisplay = *mut c_void;
pub type EGLConfig = *mut c_void;
pub type EGLSurface = *mut c_void;
pub type EGLContext = *mut c_void;

// 1.0

pub const ALPHA_SIZE: EGLenum = 0x3021;
pub const BAD_ACCESS: EGLenum = 0x3002;
pub const BAD_ALLOC: EGLenum = 0x3003;
pub const BAD_ATTRIBUTE: EGLenum = 0x3004;
pub const BAD_CONFIG: EGLenum = 0x3005;
pub const BAD_CONTEXT: EGLenum = 0x3006;
pub const BAD_DISPLAY: EGLenum = 0x3008;
pub const BAD_MATCH: EGLenum = 0x3009;
pub const BAD_NATIVE_WINDOW: EGLenum = 0x300B;
pub const BAD_PARAMETER: EGLenum = 0x300C;
pub const BAD_SURFACE: EGLenum = 0x300D;
pub const BLUE_SIZE: EGLenum = 0x3022;
pub const DEFAULT_DISPLAY: EGLNativeDisplayType = null_mut();
pub const DEPTH_SIZE: EGLenum = 0x3025;
pub const DONT_CARE: EGLint = -1;
pub const DRAW: EGLenum = 0x3059;
pub const EXTENSIONS: EGLenum = 0x3055;
pub const FALSE: EGLBoolean = 0;
pub const GREEN_SIZE: EGLenum = 0x3023;
pub const HEIGHT: EGLenum = 0x3056;
pub const NONE: EGLenum = 0x3038;
pub const NOT_INITIALIZED: EGLenum = 0x3001;
pub const NO_CONTEXT: EGLContext = null_mut();
pub const NO_DISPLAY: EGLDisplay = null_mut();
pub const NO_SURFACE: EGLSurface = null_mut();
pub const READ: EGLenum = 0x305A;
pub const RED_SIZE: EGLenum = 0x3024;
pub const STENCIL_SIZE: EGLenum = 0x3026;
pub const SUCCESS: EGLenum = 0x3000;
pub const SURFACE_TYPE: EGLenum = 0x3033;
pub const TRUE: EGLBoolean = 1;
pub const VENDOR: EGLenum = 0x3053;
pub const VERSION: EGLenum = 0x3054;
pub const WIDTH: EGLenum = 0x3057;
pub const WINDOW_BIT: EGLenum = 0x0004;

// 1.2

pub const CLIENT_APIS: EGLenum = 0x308D;
pub const OPENGL_ES_API: EGLenum = 0x30A0;
pub const OPENGL_ES_BIT: EGLenum = 0x0001;
pub const RENDERABLE_TYPE: EGLenum = 0x3040;

// 1.3

pub const CONFORMANT: EGLenum = 0x3042;
pub const CONTEXT_CLIENT_VERSION: EGLenum = 0x3098;
pub const OPENGL_ES2_BIT: EGLenum = 0x0004;

// 1.4

pub const OPENGL_API: EGLenum = 0x30A2;
pub const OPENGL_BIT: EGLenum = 0x0008;

// 1.5

pub const OPENGL_ES3_BIT: EGLenum = 0x00000040;

// ----
// entry points

pub type GetDisplayFn = unsafe extern "C" fn(display_id: EGLNativeDisplayType) -> EGLDisplay;
pub type InitializeFn =
    unsafe extern "C" fn(dpy: EGLDisplay, major: *mut EGLint, minor: *mut EGLint) -> EGLBoolean;
pub type ChooseConfigFn = unsafe extern "C" fn(
    dpy: EGLDisplay,
    attrib_list: *const EGLint,
    configs: *mut EGLConfig,
    config_size: EGLint,
    num_config: *mut EGLint,
) -> EGLBoolean;
pub type BindApiFn = unsafe extern "C" fn(api: EGLenum) -> EGLBoolean;
pub type CreateContextFn = unsafe extern "C" fn(
    dpy: EGLDisplay,
    config: EGLConfig,
    share_context: EGLContext,
    attrib_list: *const EGLint,
) -> EGLContext;
pub type CreateWindowSurfaceFn = unsafe extern "C" fn(
    dpy: EGLDisplay,
    config: EGLConfig,
    win: EGLNativeWindowType,
    attrib_list: *const EGLint,
) -> EGLSurface;
pub type MakeCurrentFn = unsafe extern "C" fn(
    dpy: EGLDisplay,
    draw: EGLSurface,
    read: EGLSurface,
    ctx: EGLContext,
) -> EGLBoolean;
pub type SwapBuffersFn = unsafe extern "C" fn(dpy: EGLDisplay, surface: EGLSurface) -> EGLBoolean;
pub type DestroySurfaceFn =
    unsafe extern "C" fn(dpy: EGLDisplay, surface: EGLSurface) -> EGLBoolean;
pub type DestroyContextFn = unsafe extern "C" fn(dpy: EGLDisplay, ctx: EGLContext) -> EGLBoolean;
pub type TerminateFn = unsafe extern "C" fn(dpy: EGLDisplay) -> EGLBoolean;
pub type GetErrorFn = unsafe extern "C" fn() -> EGLint;
pub type GetProcAddressFn = unsafe extern "C" fn(procname: *const c_char) -> *mut c_void;
pub type SwapIntervalFn = unsafe extern "C" fn(dpy: EGLDisplay, interval: EGLint) -> EGLBoolean;
pub type ReleaseThreadFn = unsafe extern "C" fn() -> EGLBoolean;
pub type GetCurrentContextFn = unsafe extern "C" fn() -> EGLContext;
pub type QuerySurfaceFn = unsafe extern "C" fn(
    dpy: EGLDisplay,
    surface: EGLSurface,
    attribute: EGLint,
    value: *mut EGLint,
) -> EGLBoolean;
pub type GetConfigAttribFn = unsafe extern "C" fn(
    dpy: EGLDisplay,
    config: EGLConfig,
    attribute: EGLint,
    value: *mut EGLint,
) -> EGLBoolean;
pub type QueryStringFn = unsafe extern "C" fn(dpy: EGLDisplay, name: EGLint) -> *const c_char;
pub type GetCurrentSurfaceFn = unsafe extern "C" fn(readdraw: EGLint) -> EGLSurface;
pub type CreatePbufferSurfaceFn = unsafe extern "C" fn(
    dpy: EGLDisplay,
    config: EGLConfig,
    attrib_list: *const EGLint,
) -> EGLSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingEntryPoint(pub &'static CStr);

impl error::Error for MissingEntryPoint {}

impl fmt::Display for MissingEntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "mandatory entry point {} could not be resolved",
            self.0.to_string_lossy()
        ))
    }
}

/// raw function table of the windowing library. mandatory slots are plain function pointers, a
/// table with a missing mandatory slot can not be constructed; optional slots are `None` when the
/// driver does not provide them.
#[derive(Clone, Copy)]
pub struct Api {
    pub eglGetDisplay: GetDisplayFn,
    pub eglInitialize: InitializeFn,
    pub eglChooseConfig: ChooseConfigFn,
    pub eglBindAPI: BindApiFn,
    pub eglCreateContext: CreateContextFn,
    pub eglCreateWindowSurface: CreateWindowSurfaceFn,
    pub eglMakeCurrent: MakeCurrentFn,
    pub eglSwapBuffers: SwapBuffersFn,
    pub eglDestroySurface: DestroySurfaceFn,
    pub eglDestroyContext: DestroyContextFn,
    pub eglTerminate: TerminateFn,
    pub eglGetError: GetErrorFn,

    // optional
    pub eglGetProcAddress: Option<GetProcAddressFn>,
    pub eglSwapInterval: Option<SwapIntervalFn>,
    pub eglReleaseThread: Option<ReleaseThreadFn>,
    pub eglGetCurrentContext: Option<GetCurrentContextFn>,
    pub eglQuerySurface: Option<QuerySurfaceFn>,
    pub eglGetConfigAttrib: Option<GetConfigAttribFn>,
    pub eglQueryString: Option<QueryStringFn>,
    pub eglGetCurrentSurface: Option<GetCurrentSurfaceFn>,
    pub eglCreatePbufferSurface: Option<CreatePbufferSurfaceFn>,
}

impl Api {
    /// `get` is called once per entry point and must return null for names it can not resolve.
    ///
    /// # Safety
    ///
    /// every non-null pointer returned by `get` must point to a function with the signature the
    /// khronos egl registry declares for that name.
    pub unsafe fn load_with(
        mut get: impl FnMut(&CStr) -> *mut c_void,
    ) -> Result<Self, MissingEntryPoint> {
        unsafe {
            Ok(Self {
                eglGetDisplay: required(&mut get, c"eglGetDisplay")?,
                eglInitialize: required(&mut get, c"eglInitialize")?,
                eglChooseConfig: required(&mut get, c"eglChooseConfig")?,
                eglBindAPI: required(&mut get, c"eglBindAPI")?,
                eglCreateContext: required(&mut get, c"eglCreateContext")?,
                eglCreateWindowSurface: required(&mut get, c"eglCreateWindowSurface")?,
                eglMakeCurrent: required(&mut get, c"eglMakeCurrent")?,
                eglSwapBuffers: required(&mut get, c"eglSwapBuffers")?,
                eglDestroySurface: required(&mut get, c"eglDestroySurface")?,
                eglDestroyContext: required(&mut get, c"eglDestroyContext")?,
                eglTerminate: required(&mut get, c"eglTerminate")?,
                eglGetError: required(&mut get, c"eglGetError")?,

                eglGetProcAddress: optional(&mut get, c"eglGetProcAddress"),
                eglSwapInterval: optional(&mut get, c"eglSwapInterval"),
                eglReleaseThread: optional(&mut get, c"eglReleaseThread"),
                eglGetCurrentContext: optional(&mut get, c"eglGetCurrentContext"),
                eglQuerySurface: optional(&mut get, c"eglQuerySurface"),
                eglGetConfigAttrib: optional(&mut get, c"eglGetConfigAttrib"),
                eglQueryString: optional(&mut get, c"eglQueryString"),
                eglGetCurrentSurface: optional(&mut get, c"eglGetCurrentSurface"),
                eglCreatePbufferSurface: optional(&mut get, c"eglCreatePbufferSurface"),
            })
        }
    }
}

unsafe fn optional<F>(
    get: &mut impl FnMut(&CStr) -> *mut c_void,
    name: &'static CStr,
) -> Option<F> {
    assert_eq!(size_of::<F>(), size_of::<*mut c_void>());

    let addr = get(name);
    if addr.is_null() {
        log::debug!("{} is not available", name.to_string_lossy());
        None
    } else {
        Some(unsafe { transmute_copy(&addr) })
    }
}

unsafe fn required<F>(
    get: &mut impl FnMut(&CStr) -> *mut c_void,
    name: &'static CStr,
) -> Result<F, MissingEntryPoint> {
    unsafe { optional(get, name) }.ok_or(MissingEntryPoint(name))
}
