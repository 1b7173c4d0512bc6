//! c abi for hosts that load the bridge as a shared library.
//!
//! there is one bridge per process. calls are serialized through a mutex, except proc address
//! lookups which only read settled state.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::process;
use std::ptr::null_mut;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use crate::config::Config;
use crate::logger::{Logger, level_from_env};
use crate::negotiation::{Bridge, InvalidState, State};
use crate::procaddr::ProcAddress;
use crate::resolve::SystemLoader;

static BRIDGE: Mutex<Option<Bridge>> = Mutex::new(None);
static PROC_ADDRESS: OnceLock<ProcAddress> = OnceLock::new();

fn lock() -> MutexGuard<'static, Option<Bridge>> {
    BRIDGE.lock().unwrap_or_else(PoisonError::into_inner)
}

fn abort(err: &anyhow::Error) -> ! {
    log::error!("{err:#}");
    log::logger().flush();
    process::abort()
}

/// logs ordinary failures and hands back `None`; unrecoverable ones end the process.
fn report<T>(op: &str, result: anyhow::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) if crate::is_fatal(&err) => abort(&err),
        Err(err) => {
            log::error!("{op}: {err:#}");
            None
        }
    }
}

fn with_bridge<T>(
    op: &'static str,
    f: impl FnOnce(&mut Bridge) -> anyhow::Result<T>,
) -> Option<T> {
    let mut bridge = lock();
    let result = match bridge.as_mut() {
        Some(bridge) => f(bridge),
        None => Err(InvalidState {
            op,
            state: State::Uninitialized,
        }
        .into()),
    };
    report(op, result)
}

fn init() -> anyhow::Result<()> {
    let mut slot = lock();
    if let Some(state) = slot.as_ref().map(Bridge::state) {
        if state != State::Terminated {
            return Err(InvalidState { op: "init", state }.into());
        }
    }

    let config = Config::from_env();
    log::info!(
        "renderer {} ({:?} scope, {:?})",
        config.renderer.as_str(),
        config.scope,
        config.interception
    );
    let bridge = Bridge::init(config)?;
    PROC_ADDRESS.get_or_init(|| {
        ProcAddress::with_loader(bridge.egl(), bridge.config(), &mut SystemLoader)
    });
    *slot = Some(bridge);
    Ok(())
}

/// returns 1 when the display is up and a context can be created.
#[unsafe(no_mangle)]
pub extern "C" fn bridge_init() -> c_int {
    Logger::init(level_from_env());
    report("init", init()).is_some() as c_int
}

/// returns the new context, or null.
#[unsafe(no_mangle)]
pub extern "C" fn bridge_create_context(window: *mut c_void) -> *mut c_void {
    with_bridge("create_context", |bridge| bridge.create_context(window)).unwrap_or(null_mut())
}

#[unsafe(no_mangle)]
pub extern "C" fn bridge_make_current() -> c_int {
    with_bridge("make_current", Bridge::make_current).is_some() as c_int
}

#[unsafe(no_mangle)]
pub extern "C" fn bridge_set_window(window: *mut c_void) -> c_int {
    with_bridge("set_window", |bridge| bridge.replace_window(window)).is_some() as c_int
}

#[unsafe(no_mangle)]
pub extern "C" fn bridge_swap_buffers() {
    with_bridge("swap_buffers", |bridge| bridge.swap_buffers());
}

#[unsafe(no_mangle)]
pub extern "C" fn bridge_swap_interval(interval: c_int) {
    with_bridge("swap_interval", |bridge| bridge.swap_interval(interval));
}

#[unsafe(no_mangle)]
pub extern "C" fn bridge_get_current_context() -> *mut c_void {
    lock()
        .as_ref()
        .map_or(null_mut(), |bridge| bridge.current_context())
}

#[unsafe(no_mangle)]
pub extern "C" fn bridge_terminate() {
    with_bridge("terminate", Bridge::terminate);
}

/// # Safety
///
/// `name` must be null or a valid nul-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn bridge_get_proc_address(name: *const c_char) -> *mut c_void {
    if name.is_null() {
        return null_mut();
    }
    let name = unsafe { CStr::from_ptr(name) };
    match PROC_ADDRESS.get() {
        Some(proc_address) => proc_address.lookup(name),
        None => {
            log::warn!("{} requested before init", name.to_string_lossy());
            null_mut()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // NOTE: nothing in this crate's tests calls bridge_init, the process-wide bridge stays empty.

    #[test]
    fn calls_before_init_fail_softly() {
        assert_eq!(bridge_make_current(), 0);
        assert_eq!(bridge_set_window(0xa11 as *mut c_void), 0);
        assert!(bridge_create_context(0xa11 as *mut c_void).is_null());
        assert!(bridge_get_current_context().is_null());
        bridge_swap_buffers();
        bridge_swap_interval(1);
        bridge_terminate();
    }

    #[test]
    fn proc_address_before_init() {
        assert!(unsafe { bridge_get_proc_address(std::ptr::null()) }.is_null());
        assert!(unsafe { bridge_get_proc_address(c"glClear".as_ptr()) }.is_null());
    }
}
