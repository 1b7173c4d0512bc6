use std::ffi::{CStr, c_void};
use std::ptr::{NonNull, null_mut};

use dynlib::DynLib;

mod attribs;
#[cfg(any(test, feature = "fake"))]
pub mod fake;
mod intercept;
mod libegl;

pub use attribs::*;
pub use intercept::*;
pub use libegl::*;

/// the windowing library: its handle, its entry points, and the interceptors standing in for the
/// three negotiation calls. built once, read-only afterwards, safe to share between threads.
pub struct Egl {
    api: Api,
    choose_config: ChooseConfig,
    create_context: CreateContext,
    bind_api: BindApi,
    interception: Interception,

    dynlib: Option<DynLib>,
}

impl Egl {
    /// populates the entry point table from `dynlib`, falling back to the global namespace for
    /// names the handle does not export.
    pub fn load(dynlib: DynLib, interception: Interception) -> Result<Self, MissingEntryPoint> {
        let api = unsafe {
            Api::load_with(|name| {
                dynlib
                    .lookup_ptr(name)
                    .or_else(|| {
                        let global = dynlib::lookup_global(name);
                        if global.is_some() {
                            let name = name.to_string_lossy();
                            log::debug!("{name} resolved from global namespace");
                        }
                        global
                    })
                    .map_or(null_mut(), NonNull::as_ptr)
            })
        }?;
        Ok(Self::with_dynlib(api, interception, Some(dynlib)))
    }

    /// for tables that were resolved by other means (e.g. an embedder-provided table).
    pub fn from_api(api: Api, interception: Interception) -> Self {
        Self::with_dynlib(api, interception, None)
    }

    fn with_dynlib(api: Api, interception: Interception, dynlib: Option<DynLib>) -> Self {
        Self {
            choose_config: ChooseConfig::new(api.eglChooseConfig, interception),
            create_context: CreateContext::new(api.eglCreateContext, interception),
            bind_api: BindApi::new(api.eglBindAPI, interception),
            api,
            interception,

            dynlib,
        }
    }

    pub fn interception(&self) -> Interception {
        self.interception
    }

    pub fn dynlib(&self) -> Option<&DynLib> {
        self.dynlib.as_ref()
    }

    // ----
    // intercepted

    pub unsafe fn choose_config(
        &self,
        dpy: EGLDisplay,
        attrib_list: *const EGLint,
        configs: *mut EGLConfig,
        config_size: EGLint,
        num_config: *mut EGLint,
    ) -> Result<EGLBoolean, AttribListOverflow> {
        unsafe { self.choose_config.call(dpy, attrib_list, configs, config_size, num_config) }
    }

    pub unsafe fn create_context(
        &self,
        dpy: EGLDisplay,
        config: EGLConfig,
        share_context: EGLContext,
        attrib_list: *const EGLint,
    ) -> Result<EGLContext, AttribListOverflow> {
        unsafe { self.create_context.call(dpy, config, share_context, attrib_list) }
    }

    pub unsafe fn bind_api(&self, api: EGLenum) -> EGLBoolean {
        unsafe { self.bind_api.call(api) }
    }

    // ----
    // direct

    pub unsafe fn get_display(&self, display_id: EGLNativeDisplayType) -> EGLDisplay {
        unsafe { (self.api.eglGetDisplay)(display_id) }
    }

    pub unsafe fn initialize(&self, dpy: EGLDisplay) -> Option<(EGLint, EGLint)> {
        let (mut major, mut minor) = (0, 0);
        if unsafe { (self.api.eglInitialize)(dpy, &mut major, &mut minor) } == FALSE {
            None
        } else {
            Some((major, minor))
        }
    }

    pub unsafe fn create_window_surface(
        &self,
        dpy: EGLDisplay,
        config: EGLConfig,
        win: EGLNativeWindowType,
        attrib_list: *const EGLint,
    ) -> EGLSurface {
        unsafe { (self.api.eglCreateWindowSurface)(dpy, config, win, attrib_list) }
    }

    pub unsafe fn make_current(
        &self,
        dpy: EGLDisplay,
        draw: EGLSurface,
        read: EGLSurface,
        ctx: EGLContext,
    ) -> EGLBoolean {
        unsafe { (self.api.eglMakeCurrent)(dpy, draw, read, ctx) }
    }

    pub unsafe fn swap_buffers(&self, dpy: EGLDisplay, surface: EGLSurface) -> EGLBoolean {
        unsafe { (self.api.eglSwapBuffers)(dpy, surface) }
    }

    pub unsafe fn destroy_surface(&self, dpy: EGLDisplay, surface: EGLSurface) -> EGLBoolean {
        unsafe { (self.api.eglDestroySurface)(dpy, surface) }
    }

    pub unsafe fn destroy_context(&self, dpy: EGLDisplay, ctx: EGLContext) -> EGLBoolean {
        unsafe { (self.api.eglDestroyContext)(dpy, ctx) }
    }

    pub unsafe fn terminate(&self, dpy: EGLDisplay) -> EGLBoolean {
        unsafe { (self.api.eglTerminate)(dpy) }
    }

    pub unsafe fn get_error(&self) -> EGLint {
        unsafe { (self.api.eglGetError)() }
    }

    // ----
    // optional, `None` means the driver does not provide the entry point

    pub unsafe fn swap_interval(&self, dpy: EGLDisplay, interval: EGLint) -> Option<EGLBoolean> {
        self.api
            .eglSwapInterval
            .map(|f| unsafe { f(dpy, interval) })
    }

    pub unsafe fn release_thread(&self) -> Option<EGLBoolean> {
        self.api.eglReleaseThread.map(|f| unsafe { f() })
    }

    pub unsafe fn get_current_context(&self) -> Option<EGLContext> {
        self.api.eglGetCurrentContext.map(|f| unsafe { f() })
    }

    pub unsafe fn query_surface(
        &self,
        dpy: EGLDisplay,
        surface: EGLSurface,
        attribute: EGLenum,
    ) -> Option<EGLint> {
        let f = self.api.eglQuerySurface?;
        let mut value = 0;
        if unsafe { f(dpy, surface, attribute as EGLint, &mut value) } == FALSE {
            None
        } else {
            Some(value)
        }
    }

    pub unsafe fn get_config_attrib(
        &self,
        dpy: EGLDisplay,
        config: EGLConfig,
        attribute: EGLenum,
    ) -> Option<EGLint> {
        let f = self.api.eglGetConfigAttrib?;
        let mut value = 0;
        if unsafe { f(dpy, config, attribute as EGLint, &mut value) } == FALSE {
            None
        } else {
            Some(value)
        }
    }

    pub unsafe fn query_string(&self, dpy: EGLDisplay, name: EGLenum) -> Option<&CStr> {
        let f = self.api.eglQueryString?;
        let ptr = unsafe { f(dpy, name as EGLint) };
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(ptr) })
        }
    }

    pub unsafe fn get_current_surface(&self, readdraw: EGLenum) -> Option<EGLSurface> {
        self.api
            .eglGetCurrentSurface
            .map(|f| unsafe { f(readdraw as EGLint) })
    }

    pub unsafe fn create_pbuffer_surface(
        &self,
        dpy: EGLDisplay,
        config: EGLConfig,
        attrib_list: *const EGLint,
    ) -> Option<EGLSurface> {
        self.api
            .eglCreatePbufferSurface
            .map(|f| unsafe { f(dpy, config, attrib_list) })
    }

    pub fn get_proc_address(&self, procname: &CStr) -> Option<NonNull<c_void>> {
        let f = self.api.eglGetProcAddress?;
        NonNull::new(unsafe { f(procname.as_ptr()) })
    }
}
