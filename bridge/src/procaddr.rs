use std::ffi::{CStr, c_void};
use std::ptr::{NonNull, null_mut};

use dynlib::DynLib;
use egl::Egl;

use crate::config::Config;
use crate::resolve::{Loader, load_gles_with};

/// resolves graphics function names for callers that link against nothing.
///
/// read-only once built, lookups may run on any thread.
pub struct ProcAddress {
    egl: &'static Egl,
    // `None` when the raster library could not be opened.
    raster: Option<&'static DynLib>,
}

impl ProcAddress {
    /// opens the raster library right away through `loader`, with the configured scope, so that
    /// its symbols are globally visible before anyone looks them up on their own. a failure is
    /// logged and leaves the raster strategy out.
    pub fn with_loader<L>(egl: &'static Egl, config: &Config, loader: &mut L) -> Self
    where
        L: Loader<Handle = DynLib>,
    {
        let raster = match load_gles_with(loader, config) {
            Ok(raster) => Some(raster),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        };
        Self { egl, raster }
    }

    /// for when the raster library was already resolved, or is known to be absent.
    pub fn with_raster(egl: &'static Egl, raster: Option<&'static DynLib>) -> Self {
        Self { egl, raster }
    }

    /// tries, in order: the raster library, the global namespace, the windowing library handle
    /// and the driver's own eglGetProcAddress. returns null when nothing knows `name`.
    pub fn lookup(&self, name: &CStr) -> *mut c_void {
        let strategies: [&dyn Fn(&CStr) -> Option<NonNull<c_void>>; 4] = [
            &|name: &CStr| self.raster.and_then(|raster| raster.lookup_ptr(name)),
            &dynlib::lookup_global,
            &|name: &CStr| self.egl.dynlib().and_then(|egl| egl.lookup_ptr(name)),
            &|name: &CStr| self.egl.get_proc_address(name),
        ];
        match strategies.iter().find_map(|strategy| strategy(name)) {
            Some(ptr) => ptr.as_ptr(),
            None => {
                log::debug!("{} not found", name.to_string_lossy());
                null_mut()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use egl::{Interception, fake};

    use super::*;

    fn fake_egl() -> &'static Egl {
        Box::leak(Box::new(Egl::from_api(fake::api(), Interception::Rewrite)))
    }

    #[test]
    fn global_namespace() {
        let proc_address = ProcAddress::with_raster(fake_egl(), None);
        assert!(!proc_address.lookup(c"malloc").is_null());
    }

    #[test]
    fn driver_proc_address_is_last_resort() {
        let proc_address = ProcAddress::with_raster(fake_egl(), None);
        let ptr = proc_address.lookup(c"glFakeExtensionEXT");
        assert!(!ptr.is_null());
        assert_eq!(NonNull::new(ptr), fake_egl().get_proc_address(c"glFakeExtensionEXT"));
    }

    #[test]
    fn unknown_name_is_null() {
        let proc_address = ProcAddress::with_raster(fake_egl(), None);
        assert!(proc_address.lookup(c"glDefinitelyNotAFunction42").is_null());
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn raster_library_comes_first() {
        let raster: &'static DynLib = Box::leak(Box::new(DynLib::load(c"libc.so.6").unwrap()));
        let proc_address = ProcAddress::with_raster(fake_egl(), Some(raster));
        let ptr = proc_address.lookup(c"strlen");
        assert_eq!(NonNull::new(ptr), raster.lookup_ptr(c"strlen"));
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn raster_library_is_opened_up_front() {
        use dynlib::Scope;

        use crate::config::Renderer;
        use crate::resolve::{Loader, loaded_gles};

        // stands in for the driver with libc, remembering the scope it was asked for.
        struct LibcLoader(Vec<Scope>);

        impl Loader for LibcLoader {
            type Handle = DynLib;

            fn load(&mut self, _path: &CStr, scope: Scope) -> Result<DynLib, dynlib::Error> {
                self.0.push(scope);
                DynLib::load_with_scope(c"libc.so.6", scope)
            }
        }

        let config = Config {
            renderer: Renderer::Gl4es,
            scope: Renderer::Gl4es.default_scope(),
            ..Config::default()
        };
        let mut loader = LibcLoader(Vec::new());
        let proc_address = ProcAddress::with_loader(fake_egl(), &config, &mut loader);

        let raster = loaded_gles().unwrap();
        assert_eq!(loader.0, vec![Scope::Global]);
        assert!(proc_address.raster.is_some_and(|r| std::ptr::eq(r, raster)));
        assert_eq!(NonNull::new(proc_address.lookup(c"strlen")), raster.lookup_ptr(c"strlen"));
    }

    #[test]
    fn concurrent_lookups() {
        let proc_address: &'static ProcAddress =
            Box::leak(Box::new(ProcAddress::with_raster(fake_egl(), None)));
        let handles: Vec<_> = (0..4)
            .map(|_| thread::spawn(move || proc_address.lookup(c"malloc") as usize))
            .collect();
        let results: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|ptr| *ptr != 0 && *ptr == results[0]));
    }
}
