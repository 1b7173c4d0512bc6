use std::ffi::{CStr, CString, c_void};
use std::mem::{size_of, transmute_copy};
use std::ptr::NonNull;
use std::{error, fmt};

use libc::{RTLD_DEFAULT, RTLD_GLOBAL, RTLD_LAZY, RTLD_LOCAL, dlclose, dlerror, dlopen, dlsym};

#[derive(Debug)]
pub enum Error {
    Load { filename: CString, reason: String },
    Lookup { name: CString, reason: String },
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { filename, reason } => {
                f.write_fmt(format_args!("could not load {filename:?}: {reason}"))
            }
            Self::Lookup { name, reason } => {
                f.write_fmt(format_args!("could not lookup {name:?}: {reason}"))
            }
        }
    }
}

/// takes the pending dlerror message, if any.
///
/// NOTE: the string returned by dlerror is owned by libc and may be overwritten by the next call,
/// it must be copied out right away.
fn take_dlerror() -> Option<String> {
    let err = unsafe { dlerror() };
    if err.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned())
    }
}

/// visibility of the symbols of a loaded library to the rest of the process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// symbols are only reachable through the returned handle.
    #[default]
    Local,
    /// symbols also participate in global (`RTLD_DEFAULT`) resolution.
    Global,
}

impl Scope {
    fn as_flags(self) -> libc::c_int {
        match self {
            Self::Local => RTLD_LAZY | RTLD_LOCAL,
            Self::Global => RTLD_LAZY | RTLD_GLOBAL,
        }
    }
}

pub struct DynLib(NonNull<c_void>);

// NOTE: a dlopen handle is a process-wide token; dlsym on it is thread-safe.
unsafe impl Send for DynLib {}
unsafe impl Sync for DynLib {}

impl fmt::Debug for DynLib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DynLib").field(&self.0).finish()
    }
}

impl DynLib {
    pub fn load(filename: &CStr) -> Result<Self, Error> {
        Self::load_with_scope(filename, Scope::Local)
    }

    pub fn load_with_scope(filename: &CStr, scope: Scope) -> Result<Self, Error> {
        _ = take_dlerror();

        let handle = unsafe { dlopen(filename.as_ptr(), scope.as_flags()) };
        match NonNull::new(handle) {
            Some(handle) => Ok(Self(handle)),
            None => Err(Error::Load {
                filename: filename.to_owned(),
                reason: take_dlerror().unwrap_or_else(|| "unknown dlopen error".to_string()),
            }),
        }
    }

    /// returns `None` when the symbol is absent (or resolves to null, which for the libraries
    /// handled here means the same thing).
    pub fn lookup_ptr(&self, name: &CStr) -> Option<NonNull<c_void>> {
        _ = take_dlerror();
        NonNull::new(unsafe { dlsym(self.0.as_ptr(), name.as_ptr()) })
    }

    /// F must be a pointer-sized type, typically an `unsafe extern "C" fn(..)`.
    pub fn lookup<F: Sized>(&self, name: &CStr) -> Result<F, Error> {
        assert_eq!(size_of::<F>(), size_of::<*mut c_void>());

        _ = take_dlerror();
        let addr = unsafe { dlsym(self.0.as_ptr(), name.as_ptr()) };
        if addr.is_null() {
            return Err(Error::Lookup {
                name: name.to_owned(),
                reason: take_dlerror().unwrap_or_else(|| "symbol resolved to null".to_string()),
            });
        }
        Ok(unsafe { transmute_copy(&addr) })
    }
}

impl Drop for DynLib {
    fn drop(&mut self) {
        unsafe {
            dlclose(self.0.as_ptr());
        }
    }
}

/// looks the symbol up in the global namespace of the process (everything that was loaded with
/// global visibility, plus the executable and its direct dependencies).
pub fn lookup_global(name: &CStr) -> Option<NonNull<c_void>> {
    _ = take_dlerror();
    NonNull::new(unsafe { dlsym(RTLD_DEFAULT, name.as_ptr()) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_library() {
        let err = DynLib::load(c"libdefinitely-not-here.so.42").unwrap_err();
        match err {
            Error::Load { filename, reason } => {
                assert_eq!(filename.as_c_str(), c"libdefinitely-not-here.so.42");
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn global_namespace_has_libc() {
        assert!(lookup_global(c"malloc").is_some());
        assert!(lookup_global(c"definitely_not_a_symbol_42").is_none());
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn lookup_typed_and_raw() {
        let lib = DynLib::load_with_scope(c"libc.so.6", Scope::Local).unwrap();

        let strlen = lib
            .lookup::<unsafe extern "C" fn(*const libc::c_char) -> libc::size_t>(c"strlen")
            .unwrap();
        assert_eq!(unsafe { strlen(c"four".as_ptr()) }, 4);

        assert!(lib.lookup_ptr(c"strlen").is_some());
        assert!(lib.lookup_ptr(c"definitely_not_a_symbol_42").is_none());
        assert!(matches!(
            lib.lookup::<unsafe extern "C" fn()>(c"definitely_not_a_symbol_42"),
            Err(Error::Lookup { .. })
        ));
    }
}
