use std::ptr::null_mut;
use std::{error, fmt};

use anyhow::{Context as _, anyhow, bail};
use egl::*;
use scopeguard::ScopeGuard;

use crate::Fatal;
use crate::config::Config;
use crate::resolve::load_egl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    /// the windowing library is loaded and its table populated.
    Resolved,
    /// the rendering api is chosen and the display is up.
    Bound,
    ContextCreated,
    SurfaceCreated,
    Current,
    Terminated,
}

#[derive(Debug)]
pub struct InvalidState {
    pub op: &'static str,
    pub state: State,
}

impl error::Error for InvalidState {}

impl fmt::Display for InvalidState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{} is not valid in {:?} state", self.op, self.state))
    }
}

/// the live objects of a negotiation. each field is either the matching NO_* value or a handle
/// the driver returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    pub display: EGLDisplay,
    pub surface: EGLSurface,
    pub context: EGLContext,
}

impl Default for Negotiation {
    fn default() -> Self {
        Self {
            display: NO_DISPLAY,
            surface: NO_SURFACE,
            context: NO_CONTEXT,
        }
    }
}

/// the api a desktop-gl caller binds. it has to agree with the renderable type in
/// `CONFIG_ATTRIBS`; in rewrite mode the interceptors turn both into the embedded dialect.
const REQUESTED_API: EGLenum = OPENGL_API;

/// what a desktop-gl caller would ask for; the interceptor turns it into something embedded
/// drivers accept.
const CONFIG_ATTRIBS: [EGLint; 15] = [
    RED_SIZE as EGLint,
    8,
    GREEN_SIZE as EGLint,
    8,
    BLUE_SIZE as EGLint,
    8,
    ALPHA_SIZE as EGLint,
    8,
    DEPTH_SIZE as EGLint,
    24,
    SURFACE_TYPE as EGLint,
    WINDOW_BIT as EGLint,
    RENDERABLE_TYPE as EGLint,
    OPENGL_BIT as EGLint,
    NONE as EGLint,
];

const EMPTY_ATTRIBS: [EGLint; 1] = [NONE as EGLint];

pub fn egl_get_error(egl: &Egl) -> anyhow::Error {
    let code = unsafe { egl.get_error() };
    anyhow!("egl error {code:#x}")
}

/// one rendering session: the display, the window surface and the context the caller draws into.
pub struct Bridge {
    egl: &'static Egl,
    config: Config,
    state: State,
    negotiation: Negotiation,
    egl_config: EGLConfig,
}

// NOTE: the handles are opaque driver tokens. the owner serializes access (the exported api keeps
// the bridge behind a mutex).
unsafe impl Send for Bridge {}

impl Bridge {
    pub fn init(config: Config) -> anyhow::Result<Self> {
        if !config.renderer.negotiates_with_egl() {
            bail!(
                "renderer {} is not brought up through egl",
                config.renderer.as_str()
            );
        }
        let egl = load_egl(&config)?;
        Self::with_egl(egl, config)
    }

    /// continues from a windowing library that is already loaded.
    pub fn with_egl(egl: &'static Egl, config: Config) -> anyhow::Result<Self> {
        let mut this = Self {
            egl,
            config,
            state: State::Resolved,
            negotiation: Negotiation::default(),
            egl_config: null_mut(),
        };
        this.bind_api();
        this.open_display()?;
        this.state = State::Bound;
        Ok(this)
    }

    pub fn egl(&self) -> &'static Egl {
        self.egl
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn negotiation(&self) -> Negotiation {
        self.negotiation
    }

    fn expect_state(&self, op: &'static str, allowed: &[State]) -> Result<(), InvalidState> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(InvalidState {
                op,
                state: self.state,
            })
        }
    }

    // the driver default is kept when binding fails; a wrong api shows up later as a context
    // creation failure, which is reported there.
    fn bind_api(&mut self) {
        if unsafe { self.egl.bind_api(REQUESTED_API) } == FALSE {
            log::warn!(
                "could not bind rendering api ({}), keeping driver default",
                egl_get_error(self.egl)
            );
        }
    }

    fn open_display(&mut self) -> anyhow::Result<()> {
        let display = unsafe { self.egl.get_display(DEFAULT_DISPLAY) };
        if display == NO_DISPLAY {
            return Err(egl_get_error(self.egl)).context("could not get display");
        }
        let Some((major, minor)) = (unsafe { self.egl.initialize(display) }) else {
            return Err(egl_get_error(self.egl)).context("could not initialize display");
        };
        log::info!("initialized egl {major}.{minor}");
        if let Some(vendor) = unsafe { self.egl.query_string(display, VENDOR) } {
            log::info!("egl vendor: {}", vendor.to_string_lossy());
        }
        self.negotiation.display = display;
        Ok(())
    }

    fn choose_config(&self) -> anyhow::Result<EGLConfig> {
        let display = self.negotiation.display;
        let mut egl_config = null_mut();
        let mut num_config = 0;
        let ok = unsafe {
            self.egl.choose_config(
                display,
                CONFIG_ATTRIBS.as_ptr(),
                &mut egl_config,
                1,
                &mut num_config,
            )
        }
        .context(Fatal)?;
        if ok == FALSE {
            return Err(egl_get_error(self.egl)).context("could not choose config");
        }
        if num_config < 1 {
            bail!("no config matches the requested attributes");
        }

        let attrib =
            |attribute| unsafe { self.egl.get_config_attrib(display, egl_config, attribute) };
        if let (Some(r), Some(g), Some(b), Some(a), Some(depth)) = (
            attrib(RED_SIZE),
            attrib(GREEN_SIZE),
            attrib(BLUE_SIZE),
            attrib(ALPHA_SIZE),
            attrib(DEPTH_SIZE),
        ) {
            log::info!("chose config r{r}g{g}b{b}a{a} depth {depth}");
        }

        Ok(egl_config)
    }

    fn create_surface(
        &self,
        egl_config: EGLConfig,
        window: EGLNativeWindowType,
    ) -> anyhow::Result<EGLSurface> {
        let display = self.negotiation.display;
        let surface = unsafe {
            self.egl
                .create_window_surface(display, egl_config, window, EMPTY_ATTRIBS.as_ptr())
        };
        if surface == NO_SURFACE {
            return Err(egl_get_error(self.egl)).context("could not create window surface");
        }
        if let (Some(width), Some(height)) = unsafe {
            (
                self.egl.query_surface(display, surface, WIDTH),
                self.egl.query_surface(display, surface, HEIGHT),
            )
        } {
            log::info!("created window surface {width}x{height}");
        }
        Ok(surface)
    }

    /// chooses a config, creates a context and a window surface for `window`. the context is
    /// destroyed again when the surface cannot be created.
    pub fn create_context(&mut self, window: EGLNativeWindowType) -> anyhow::Result<EGLContext> {
        self.expect_state("create_context", &[State::Bound])?;
        if window.is_null() {
            bail!("no native window to render into");
        }

        let egl_config = self.choose_config()?;

        let display = self.negotiation.display;
        let context = unsafe {
            self.egl
                .create_context(display, egl_config, NO_CONTEXT, EMPTY_ATTRIBS.as_ptr())
        }
        .context(Fatal)?;
        if context == NO_CONTEXT {
            return Err(egl_get_error(self.egl)).context("could not create context");
        }
        self.state = State::ContextCreated;

        let egl = self.egl;
        let context = scopeguard::guard(context, move |context| {
            log::debug!("destroying context {context:?}");
            unsafe { egl.destroy_context(display, context) };
        });

        let surface = match self.create_surface(egl_config, window) {
            Ok(surface) => surface,
            Err(err) => {
                self.state = State::Bound;
                return Err(err);
            }
        };

        let context = ScopeGuard::into_inner(context);
        self.egl_config = egl_config;
        self.negotiation.context = context;
        self.negotiation.surface = surface;
        self.state = State::SurfaceCreated;
        Ok(context)
    }

    pub fn make_current(&mut self) -> anyhow::Result<()> {
        self.expect_state("make_current", &[State::SurfaceCreated, State::Current])?;
        let Negotiation {
            display,
            surface,
            context,
        } = self.negotiation;
        if unsafe { self.egl.make_current(display, surface, surface, context) } == FALSE {
            return Err(egl_get_error(self.egl)).context("could not make context current");
        }
        self.state = State::Current;
        Ok(())
    }

    /// moves rendering onto a new native window. the context survives, and is made current again
    /// if it was current before.
    pub fn replace_window(&mut self, window: EGLNativeWindowType) -> anyhow::Result<()> {
        self.expect_state(
            "replace_window",
            &[State::ContextCreated, State::SurfaceCreated, State::Current],
        )?;
        if window.is_null() {
            bail!("no native window to render into");
        }

        let display = self.negotiation.display;
        let was_current = self.state == State::Current;
        if was_current {
            unsafe { self.egl.make_current(display, NO_SURFACE, NO_SURFACE, NO_CONTEXT) };
        }
        if self.negotiation.surface != NO_SURFACE {
            unsafe { self.egl.destroy_surface(display, self.negotiation.surface) };
            self.negotiation.surface = NO_SURFACE;
        }
        self.state = State::ContextCreated;

        self.negotiation.surface = self.create_surface(self.egl_config, window)?;
        self.state = State::SurfaceCreated;
        if was_current {
            self.make_current()?;
        }
        Ok(())
    }

    pub fn swap_buffers(&self) -> anyhow::Result<()> {
        self.expect_state("swap_buffers", &[State::SurfaceCreated, State::Current])?;
        let Negotiation {
            display, surface, ..
        } = self.negotiation;
        if unsafe { self.egl.swap_buffers(display, surface) } == FALSE {
            return Err(egl_get_error(self.egl)).context("could not swap buffers");
        }
        Ok(())
    }

    /// a driver without eglSwapInterval keeps its default pacing.
    pub fn swap_interval(&self, interval: EGLint) -> anyhow::Result<()> {
        self.expect_state(
            "swap_interval",
            &[
                State::Bound,
                State::ContextCreated,
                State::SurfaceCreated,
                State::Current,
            ],
        )?;
        let interval = if self.config.force_vsync { 1 } else { interval };
        match unsafe { self.egl.swap_interval(self.negotiation.display, interval) } {
            None => {
                log::debug!("swap interval is not supported by the driver");
                Ok(())
            }
            Some(FALSE) => Err(egl_get_error(self.egl)).context("could not set swap interval"),
            Some(_) => Ok(()),
        }
    }

    /// the context current on the calling thread, as far as the driver knows; the negotiated one
    /// when the driver cannot tell.
    pub fn current_context(&self) -> EGLContext {
        unsafe { self.egl.get_current_context() }.unwrap_or(self.negotiation.context)
    }

    /// releases everything this bridge created. driver failures along the way are logged, the
    /// teardown continues regardless.
    pub fn terminate(&mut self) -> anyhow::Result<()> {
        self.expect_state(
            "terminate",
            &[
                State::Resolved,
                State::Bound,
                State::ContextCreated,
                State::SurfaceCreated,
                State::Current,
            ],
        )?;

        let Negotiation {
            display,
            surface,
            context,
        } = self.negotiation;
        let egl = self.egl;
        if display != NO_DISPLAY {
            unsafe {
                if egl.make_current(display, NO_SURFACE, NO_SURFACE, NO_CONTEXT) == FALSE {
                    log::warn!("could not release current context ({})", egl_get_error(egl));
                }
                if surface != NO_SURFACE && egl.destroy_surface(display, surface) == FALSE {
                    log::warn!("could not destroy surface ({})", egl_get_error(egl));
                }
                if context != NO_CONTEXT && egl.destroy_context(display, context) == FALSE {
                    log::warn!("could not destroy context ({})", egl_get_error(egl));
                }
                if egl.terminate(display) == FALSE {
                    log::warn!("could not terminate display ({})", egl_get_error(egl));
                }
            }
        }
        unsafe { egl.release_thread() };

        self.negotiation = Negotiation::default();
        self.egl_config = null_mut();
        self.state = State::Terminated;
        log::info!("terminated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use egl::fake::{self, Call};

    use super::*;

    const WINDOW: EGLNativeWindowType = 0xa11 as EGLNativeWindowType;

    fn fake_egl(interception: Interception) -> &'static Egl {
        Box::leak(Box::new(Egl::from_api(fake::api(), interception)))
    }

    fn bridge() -> Bridge {
        fake::reset();
        Bridge::with_egl(fake_egl(Interception::Rewrite), Config::default()).unwrap()
    }

    #[test]
    fn full_lifecycle() {
        let mut bridge = bridge();
        assert_eq!(bridge.state(), State::Bound);
        assert_eq!(bridge.negotiation().display, fake::DISPLAY);

        let context = bridge.create_context(WINDOW).unwrap();
        assert_ne!(context, NO_CONTEXT);
        assert_eq!(bridge.state(), State::SurfaceCreated);

        bridge.make_current().unwrap();
        assert_eq!(bridge.state(), State::Current);
        assert_eq!(bridge.current_context(), context);

        bridge.swap_interval(0).unwrap();
        bridge.swap_buffers().unwrap();

        let Negotiation { surface, .. } = bridge.negotiation();
        bridge.terminate().unwrap();
        assert_eq!(bridge.state(), State::Terminated);
        assert_eq!(bridge.negotiation(), Negotiation::default());

        let n = |attrib: EGLenum| attrib as EGLint;
        assert_eq!(
            fake::calls(),
            vec![
                Call::BindApi(OPENGL_ES_API),
                Call::GetDisplay,
                Call::Initialize,
                Call::ChooseConfig(vec![
                    n(RED_SIZE),
                    8,
                    n(GREEN_SIZE),
                    8,
                    n(BLUE_SIZE),
                    8,
                    n(ALPHA_SIZE),
                    8,
                    n(DEPTH_SIZE),
                    16,
                    n(SURFACE_TYPE),
                    n(WINDOW_BIT),
                    n(RENDERABLE_TYPE),
                    n(OPENGL_ES2_BIT),
                    n(NONE),
                ]),
                Call::CreateContext(vec![n(CONTEXT_CLIENT_VERSION), 3, n(NONE)]),
                Call::CreateWindowSurface {
                    window: WINDOW as usize
                },
                Call::MakeCurrent {
                    surface: surface as usize,
                    context: context as usize
                },
                Call::SwapInterval(0),
                Call::SwapBuffers {
                    surface: surface as usize
                },
                Call::MakeCurrent {
                    surface: 0,
                    context: 0
                },
                Call::DestroySurface {
                    surface: surface as usize
                },
                Call::DestroyContext {
                    context: context as usize
                },
                Call::Terminate,
                Call::ReleaseThread,
            ]
        );
    }

    #[test]
    fn passthrough_leaves_requests_alone() {
        fake::reset();
        let mut bridge =
            Bridge::with_egl(fake_egl(Interception::Passthrough), Config::default()).unwrap();
        bridge.create_context(WINDOW).unwrap();
        let calls = fake::calls();
        assert_eq!(calls[0], Call::BindApi(OPENGL_API));
        assert!(calls.contains(&Call::ChooseConfig(CONFIG_ATTRIBS.to_vec())));
        assert!(calls.contains(&Call::CreateContext(vec![NONE as EGLint])));
    }

    /// the bound api and the renderable bit of the config request must name the same dialect,
    /// otherwise a real driver refuses the context.
    #[test]
    fn bound_api_matches_requested_renderable_type() {
        for (interception, api, renderable) in [
            (Interception::Passthrough, OPENGL_API, OPENGL_BIT),
            (Interception::Rewrite, OPENGL_ES_API, OPENGL_ES2_BIT),
        ] {
            fake::reset();
            let mut bridge = Bridge::with_egl(fake_egl(interception), Config::default()).unwrap();
            bridge.create_context(WINDOW).unwrap();

            let calls = fake::calls();
            let bound = calls.iter().find_map(|call| match call {
                Call::BindApi(api) => Some(*api),
                _ => None,
            });
            let requested = calls.iter().find_map(|call| match call {
                Call::ChooseConfig(attribs) => attribs
                    .chunks_exact(2)
                    .find(|pair| pair[0] == RENDERABLE_TYPE as EGLint)
                    .map(|pair| pair[1]),
                _ => None,
            });
            assert_eq!(bound, Some(api), "{interception:?}");
            assert_eq!(requested, Some(renderable as EGLint), "{interception:?}");
        }
    }

    #[test]
    fn bind_failure_is_not_fatal() {
        fake::reset();
        fake::with(|driver| driver.fail_bind_api = true);
        let bridge = Bridge::with_egl(fake_egl(Interception::Rewrite), Config::default()).unwrap();
        assert_eq!(bridge.state(), State::Bound);
    }

    #[test]
    fn display_failure() {
        fake::reset();
        fake::with(|driver| driver.fail_initialize = true);
        let err = match Bridge::with_egl(fake_egl(Interception::Rewrite), Config::default()) {
            Ok(_) => panic!("initialize failure must surface"),
            Err(err) => err,
        };
        assert!(!crate::is_fatal(&err));
        assert!(format!("{err:#}").contains("could not initialize display"));
    }

    #[test]
    fn surface_failure_destroys_context() {
        let mut bridge = bridge();
        fake::with(|driver| driver.fail_create_surface = true);
        assert!(bridge.create_context(WINDOW).is_err());
        assert_eq!(bridge.state(), State::Bound);
        assert_eq!(bridge.negotiation().context, NO_CONTEXT);

        let calls = fake::calls();
        assert!(matches!(calls.last(), Some(Call::DestroyContext { .. })));

        // and the negotiation can be retried
        fake::with(|driver| driver.fail_create_surface = false);
        bridge.create_context(WINDOW).unwrap();
        assert_eq!(bridge.state(), State::SurfaceCreated);
    }

    #[test]
    fn context_fallback_to_version_two() {
        let mut bridge = bridge();
        fake::with(|driver| driver.create_context_failures = 1);
        bridge.create_context(WINDOW).unwrap();
        let versions: Vec<_> = fake::calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateContext(attribs) => Some(attribs),
                _ => None,
            })
            .collect();
        assert_eq!(
            versions,
            vec![
                vec![CONTEXT_CLIENT_VERSION as EGLint, 3, NONE as EGLint],
                vec![CONTEXT_CLIENT_VERSION as EGLint, 2, NONE as EGLint],
            ]
        );
    }

    #[test]
    fn no_matching_config() {
        let mut bridge = bridge();
        fake::with(|driver| driver.no_matching_config = true);
        assert!(bridge.create_context(WINDOW).is_err());
        assert_eq!(bridge.state(), State::Bound);
    }

    #[test]
    fn out_of_order_calls() {
        let mut bridge = bridge();
        let err = bridge.make_current().unwrap_err();
        let invalid = err.downcast_ref::<InvalidState>().unwrap();
        assert_eq!(invalid.op, "make_current");
        assert_eq!(invalid.state, State::Bound);

        assert!(bridge.swap_buffers().is_err());
        assert!(bridge.replace_window(WINDOW).is_err());
        assert!(bridge.create_context(null_mut()).is_err());
    }

    #[test]
    fn replace_window_keeps_context() {
        let mut bridge = bridge();
        let context = bridge.create_context(WINDOW).unwrap();
        bridge.make_current().unwrap();
        let old_surface = bridge.negotiation().surface;

        let new_window = 0xa12 as EGLNativeWindowType;
        bridge.replace_window(new_window).unwrap();
        assert_eq!(bridge.state(), State::Current);
        assert_eq!(bridge.negotiation().context, context);
        assert_ne!(bridge.negotiation().surface, old_surface);

        let calls = fake::calls();
        assert!(calls.contains(&Call::DestroySurface {
            surface: old_surface as usize
        }));
        assert!(calls.contains(&Call::CreateWindowSurface {
            window: new_window as usize
        }));
        assert_eq!(
            calls.last(),
            Some(&Call::MakeCurrent {
                surface: bridge.negotiation().surface as usize,
                context: context as usize
            })
        );
    }

    #[test]
    fn replace_window_failure_keeps_context() {
        let mut bridge = bridge();
        bridge.create_context(WINDOW).unwrap();
        fake::with(|driver| driver.fail_create_surface = true);
        assert!(bridge.replace_window(0xa12 as EGLNativeWindowType).is_err());
        assert_eq!(bridge.state(), State::ContextCreated);
        assert_eq!(bridge.negotiation().surface, NO_SURFACE);
        assert_ne!(bridge.negotiation().context, NO_CONTEXT);

        fake::with(|driver| driver.fail_create_surface = false);
        bridge.replace_window(0xa13 as EGLNativeWindowType).unwrap();
        assert_eq!(bridge.state(), State::SurfaceCreated);
    }

    #[test]
    fn forced_vsync() {
        fake::reset();
        let config = Config {
            force_vsync: true,
            ..Config::default()
        };
        let bridge = Bridge::with_egl(fake_egl(Interception::Rewrite), config).unwrap();
        bridge.swap_interval(0).unwrap();
        assert_eq!(fake::calls().last(), Some(&Call::SwapInterval(1)));
    }

    #[test]
    fn missing_swap_interval_is_a_no_op() {
        fake::reset();
        let mut api = fake::api();
        api.eglSwapInterval = None;
        let egl = Box::leak(Box::new(Egl::from_api(api, Interception::Rewrite)));
        let bridge = Bridge::with_egl(egl, Config::default()).unwrap();
        bridge.swap_interval(1).unwrap();
        assert!(!fake::calls().iter().any(|call| matches!(call, Call::SwapInterval(_))));
    }

    #[test]
    fn terminate_is_absorbing() {
        let mut bridge = bridge();
        bridge.create_context(WINDOW).unwrap();
        bridge.terminate().unwrap();
        assert!(bridge.terminate().is_err());
        assert!(bridge.make_current().is_err());
        assert!(bridge.create_context(WINDOW).is_err());
        assert_eq!(bridge.state(), State::Terminated);
    }

    #[test]
    fn swap_failure_is_reported() {
        let mut bridge = bridge();
        bridge.create_context(WINDOW).unwrap();
        fake::with(|driver| driver.fail_swap_buffers = true);
        let err = bridge.swap_buffers().unwrap_err();
        assert!(format!("{err:#}").contains(&format!("{:#x}", BAD_SURFACE)));
    }

    #[test]
    fn other_renderers_are_rejected() {
        let config = Config {
            renderer: crate::Renderer::VulkanZink,
            ..Config::default()
        };
        let err = match Bridge::init(config) {
            Ok(_) => panic!("vulkan_zink must not go through egl"),
            Err(err) => err,
        };
        assert!(!crate::is_fatal(&err));
    }
}
