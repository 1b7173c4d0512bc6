use std::fmt;

use crate::attribs::{
    AttribListOverflow, pairs_from_ptr, rewrite_config_attribs, rewrite_context_attribs,
};
use crate::libegl::*;

/// whether negotiation calls reach the driver as the caller issued them, or coerced into the
/// embedded dialect.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Interception {
    #[default]
    Rewrite,
    Passthrough,
}

// NOTE: the rewriting variants hold an Option because they can be built around a slot that was
// never resolved; in that case they fail closed and return the canonical failure value instead of
// calling through null.

// ----
// config selection

pub enum ChooseConfig {
    Direct(ChooseConfigFn),
    Rewriting { original: Option<ChooseConfigFn> },
}

impl fmt::Debug for ChooseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("ChooseConfig::Direct"),
            Self::Rewriting { original } => f
                .debug_struct("ChooseConfig::Rewriting")
                .field("resolved", &original.is_some())
                .finish(),
        }
    }
}

impl ChooseConfig {
    pub fn new(original: ChooseConfigFn, interception: Interception) -> Self {
        match interception {
            Interception::Rewrite => Self::Rewriting {
                original: Some(original),
            },
            Interception::Passthrough => Self::Direct(original),
        }
    }

    /// # Safety
    ///
    /// arguments must satisfy eglChooseConfig's contract; `attrib_list` must be null or
    /// NONE-terminated.
    pub unsafe fn call(
        &self,
        dpy: EGLDisplay,
        attrib_list: *const EGLint,
        configs: *mut EGLConfig,
        config_size: EGLint,
        num_config: *mut EGLint,
    ) -> Result<EGLBoolean, AttribListOverflow> {
        match self {
            Self::Direct(f) => Ok(unsafe { f(dpy, attrib_list, configs, config_size, num_config) }),
            Self::Rewriting { original } => {
                let Some(original) = original else {
                    log::error!("eglChooseConfig is not resolved");
                    return Ok(FALSE);
                };
                let attribs = rewrite_config_attribs(unsafe { pairs_from_ptr(attrib_list) })?;
                Ok(unsafe { original(dpy, attribs.as_ptr(), configs, config_size, num_config) })
            }
        }
    }
}

// ----
// context creation

pub enum CreateContext {
    Direct(CreateContextFn),
    Rewriting { original: Option<CreateContextFn> },
}

impl fmt::Debug for CreateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("CreateContext::Direct"),
            Self::Rewriting { original } => f
                .debug_struct("CreateContext::Rewriting")
                .field("resolved", &original.is_some())
                .finish(),
        }
    }
}

impl CreateContext {
    pub fn new(original: CreateContextFn, interception: Interception) -> Self {
        match interception {
            Interception::Rewrite => Self::Rewriting {
                original: Some(original),
            },
            Interception::Passthrough => Self::Direct(original),
        }
    }

    /// when the client version was injected (not chosen by the caller) and the driver refuses the
    /// context, one more attempt is made with the version lowered by one. never more than two
    /// driver calls.
    ///
    /// # Safety
    ///
    /// arguments must satisfy eglCreateContext's contract; `attrib_list` must be null or
    /// NONE-terminated.
    pub unsafe fn call(
        &self,
        dpy: EGLDisplay,
        config: EGLConfig,
        share_context: EGLContext,
        attrib_list: *const EGLint,
    ) -> Result<EGLContext, AttribListOverflow> {
        match self {
            Self::Direct(f) => Ok(unsafe { f(dpy, config, share_context, attrib_list) }),
            Self::Rewriting { original } => {
                let Some(original) = original else {
                    log::error!("eglCreateContext is not resolved");
                    return Ok(NO_CONTEXT);
                };
                let mut attribs = rewrite_context_attribs(unsafe { pairs_from_ptr(attrib_list) })?;

                let context =
                    unsafe { original(dpy, config, share_context, attribs.list.as_ptr()) };
                if context != NO_CONTEXT || !attribs.downgrade_injected_version() {
                    return Ok(context);
                }

                log::warn!(
                    "could not create context with default client version, retrying with {:?}",
                    attribs.list.get(CONTEXT_CLIENT_VERSION as EGLint)
                );
                Ok(unsafe { original(dpy, config, share_context, attribs.list.as_ptr()) })
            }
        }
    }
}

// ----
// api binding

pub enum BindApi {
    Direct(BindApiFn),
    Rewriting { original: Option<BindApiFn> },
}

impl fmt::Debug for BindApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("BindApi::Direct"),
            Self::Rewriting { original } => f
                .debug_struct("BindApi::Rewriting")
                .field("resolved", &original.is_some())
                .finish(),
        }
    }
}

impl BindApi {
    pub fn new(original: BindApiFn, interception: Interception) -> Self {
        match interception {
            Interception::Rewrite => Self::Rewriting {
                original: Some(original),
            },
            Interception::Passthrough => Self::Direct(original),
        }
    }

    /// the rewriting variant ignores `api` and always binds the embedded api.
    ///
    /// # Safety
    ///
    /// must be called on a thread where egl calls are allowed.
    pub unsafe fn call(&self, api: EGLenum) -> EGLBoolean {
        match self {
            Self::Direct(f) => unsafe { f(api) },
            Self::Rewriting { original } => {
                let Some(original) = original else {
                    log::error!("eglBindAPI is not resolved");
                    return FALSE;
                };
                if api != OPENGL_ES_API {
                    log::debug!("binding {OPENGL_ES_API:#x} instead of requested {api:#x}");
                }
                unsafe { original(OPENGL_ES_API) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::null_mut;

    use super::*;
    use crate::fake::{self, Call};

    const N: EGLint = NONE as EGLint;
    const VERSION_KEY: EGLint = CONTEXT_CLIENT_VERSION as EGLint;

    fn api() -> Api {
        fake::reset();
        fake::api()
    }

    fn create_context_calls() -> Vec<Vec<EGLint>> {
        fake::calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateContext(attribs) => Some(attribs),
                _ => None,
            })
            .collect()
    }

    unsafe fn choose(choose_config: &ChooseConfig, attribs: &[EGLint]) -> EGLBoolean {
        let mut config = null_mut();
        let mut num_config = 0;
        unsafe {
            choose_config.call(fake::DISPLAY, attribs.as_ptr(), &mut config, 1, &mut num_config)
        }
        .unwrap()
    }

    #[test]
    fn choose_config_passes_rewritten_list() {
        let choose_config = ChooseConfig::new(api().eglChooseConfig, Interception::Rewrite);
        let input = [RENDERABLE_TYPE as EGLint, 0x1, DEPTH_SIZE as EGLint, 24, N];
        assert_eq!(unsafe { choose(&choose_config, &input) }, TRUE);
        assert_eq!(
            fake::calls(),
            vec![Call::ChooseConfig(vec![
                RENDERABLE_TYPE as EGLint,
                0x0004,
                DEPTH_SIZE as EGLint,
                16,
                N
            ])]
        );
    }

    #[test]
    fn choose_config_returns_driver_result() {
        let choose_config = ChooseConfig::new(api().eglChooseConfig, Interception::Rewrite);
        fake::with(|driver| driver.fail_choose_config = true);
        assert_eq!(unsafe { choose(&choose_config, &[N]) }, FALSE);
    }

    #[test]
    fn choose_config_direct_is_untouched() {
        let choose_config = ChooseConfig::new(api().eglChooseConfig, Interception::Passthrough);
        let input = [RENDERABLE_TYPE as EGLint, OPENGL_BIT as EGLint, DEPTH_SIZE as EGLint, 24, N];
        unsafe { choose(&choose_config, &input) };
        assert_eq!(fake::calls(), vec![Call::ChooseConfig(input.to_vec())]);
    }

    #[test]
    fn create_context_injects_default_version() {
        let create_context = CreateContext::new(api().eglCreateContext, Interception::Rewrite);
        let context = unsafe {
            create_context.call(fake::DISPLAY, fake::CONFIG, NO_CONTEXT, [N].as_ptr())
        }
        .unwrap();
        assert_ne!(context, NO_CONTEXT);
        assert_eq!(create_context_calls(), vec![vec![VERSION_KEY, 3, N]]);
    }

    #[test]
    fn create_context_null_attribs_gets_default_version() {
        let create_context = CreateContext::new(api().eglCreateContext, Interception::Rewrite);
        unsafe { create_context.call(fake::DISPLAY, fake::CONFIG, NO_CONTEXT, std::ptr::null()) }
            .unwrap();
        assert_eq!(create_context_calls(), vec![vec![VERSION_KEY, 3, N]]);
    }

    #[test]
    fn create_context_falls_back_once() {
        let create_context = CreateContext::new(api().eglCreateContext, Interception::Rewrite);
        fake::with(|driver| driver.create_context_failures = 1);
        let context = unsafe {
            create_context.call(fake::DISPLAY, fake::CONFIG, NO_CONTEXT, [N].as_ptr())
        }
        .unwrap();
        assert_ne!(context, NO_CONTEXT);
        assert_eq!(
            create_context_calls(),
            vec![vec![VERSION_KEY, 3, N], vec![VERSION_KEY, 2, N]]
        );
    }

    #[test]
    fn create_context_fallback_gives_up_after_second_attempt() {
        let create_context = CreateContext::new(api().eglCreateContext, Interception::Rewrite);
        fake::with(|driver| driver.create_context_failures = usize::MAX);
        let context = unsafe {
            create_context.call(fake::DISPLAY, fake::CONFIG, NO_CONTEXT, [N].as_ptr())
        }
        .unwrap();
        assert_eq!(context, NO_CONTEXT);
        assert_eq!(create_context_calls().len(), 2);
    }

    #[test]
    fn create_context_explicit_version_is_not_retried() {
        let create_context = CreateContext::new(api().eglCreateContext, Interception::Rewrite);
        fake::with(|driver| driver.create_context_failures = usize::MAX);
        let attribs = [VERSION_KEY, 2, N];
        let context = unsafe {
            create_context.call(fake::DISPLAY, fake::CONFIG, NO_CONTEXT, attribs.as_ptr())
        }
        .unwrap();
        assert_eq!(context, NO_CONTEXT);
        assert_eq!(create_context_calls(), vec![vec![VERSION_KEY, 2, N]]);
    }

    #[test]
    fn create_context_overflow_does_not_reach_driver() {
        let create_context = CreateContext::new(api().eglCreateContext, Interception::Rewrite);
        let mut attribs: Vec<EGLint> = (0..31).flat_map(|i| [0x3100 + i, i]).collect();
        attribs.push(N);
        let result = unsafe {
            create_context.call(fake::DISPLAY, fake::CONFIG, NO_CONTEXT, attribs.as_ptr())
        };
        assert!(result.is_err());
        assert!(create_context_calls().is_empty());
    }

    #[test]
    fn bind_api_forces_embedded_api() {
        let bind_api = BindApi::new(api().eglBindAPI, Interception::Rewrite);
        assert_eq!(unsafe { bind_api.call(OPENGL_API) }, TRUE);
        assert_eq!(unsafe { bind_api.call(0) }, TRUE);
        assert_eq!(
            fake::calls(),
            vec![Call::BindApi(OPENGL_ES_API), Call::BindApi(OPENGL_ES_API)]
        );
    }

    #[test]
    fn unresolved_originals_fail_closed() {
        fake::reset();
        let choose_config = ChooseConfig::Rewriting { original: None };
        let create_context = CreateContext::Rewriting { original: None };
        let bind_api = BindApi::Rewriting { original: None };

        assert_eq!(unsafe { choose(&choose_config, &[N]) }, FALSE);
        assert_eq!(
            unsafe { create_context.call(fake::DISPLAY, fake::CONFIG, NO_CONTEXT, [N].as_ptr()) },
            Ok(NO_CONTEXT)
        );
        assert_eq!(unsafe { bind_api.call(OPENGL_ES_API) }, FALSE);
        assert!(fake::calls().is_empty());
    }
}
