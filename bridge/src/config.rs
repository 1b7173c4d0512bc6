use std::env;
use std::ffi::CString;

use dynlib::Scope;
use egl::Interception;

pub const RENDERER_VAR: &str = "BRIDGE_RENDERER";
pub const SYMBOL_SCOPE_VAR: &str = "BRIDGE_SYMBOL_SCOPE";
pub const INTERCEPTION_VAR: &str = "BRIDGE_INTERCEPTION";
pub const FORCE_VSYNC_VAR: &str = "BRIDGE_FORCE_VSYNC";
pub const EGL_LIBRARY_VAR: &str = "LIBGL_EGL";
pub const GLES_LIBRARY_VAR: &str = "LIBGL_GLES";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Renderer {
    /// the device's own embedded driver.
    #[default]
    SystemGles,
    /// desktop gl translated onto the embedded driver.
    Gl4es,
    /// gl on top of vulkan.
    VulkanZink,
    /// remote / software rendering.
    Virgl,
}

impl Renderer {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "opengles" => Some(Self::SystemGles),
            "gl4es" => Some(Self::Gl4es),
            "vulkan_zink" => Some(Self::VulkanZink),
            "virgl" => Some(Self::Virgl),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SystemGles => "opengles",
            Self::Gl4es => "gl4es",
            Self::VulkanZink => "vulkan_zink",
            Self::Virgl => "virgl",
        }
    }

    /// whether this renderer is brought up through egl context negotiation. the others are served
    /// by their own backends.
    pub fn negotiates_with_egl(self) -> bool {
        matches!(self, Self::SystemGles | Self::Gl4es)
    }

    /// NOTE: the translation layer resolves raster symbols on its own, by name, through the global
    /// namespace; it only works when the driver was loaded with global visibility.
    pub fn default_scope(self) -> Scope {
        match self {
            Self::Gl4es => Scope::Global,
            Self::SystemGles | Self::VulkanZink | Self::Virgl => Scope::Local,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Config {
    pub renderer: Renderer,
    pub scope: Scope,
    pub interception: Interception,
    pub force_vsync: bool,
    /// tried before any built-in windowing library location.
    pub egl_library: Option<CString>,
    /// tried before any built-in raster library location.
    pub gles_library: Option<CString>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// unknown values are logged and replaced by defaults, a typo must not keep the renderer from
    /// starting.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let renderer = match var(RENDERER_VAR) {
            None => Renderer::default(),
            Some(value) => Renderer::parse(&value).unwrap_or_else(|| {
                let fallback = Renderer::default();
                log::warn!("unknown {RENDERER_VAR} {value:?}, using {}", fallback.as_str());
                Renderer::default()
            }),
        };

        let scope = match var(SYMBOL_SCOPE_VAR).as_deref() {
            None => renderer.default_scope(),
            Some("local") => Scope::Local,
            Some("global") => Scope::Global,
            Some(value) => {
                log::warn!("unknown {SYMBOL_SCOPE_VAR} {value:?}, using renderer default");
                renderer.default_scope()
            }
        };

        let interception = match var(INTERCEPTION_VAR).as_deref() {
            None | Some("rewrite") => Interception::Rewrite,
            Some("passthrough") => Interception::Passthrough,
            Some(value) => {
                log::warn!("unknown {INTERCEPTION_VAR} {value:?}, using rewrite");
                Interception::Rewrite
            }
        };

        let library = |key: &str| {
            var(key)
                .filter(|value| !value.is_empty())
                .and_then(|value| match CString::new(value) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        log::warn!("ignoring {key}: {err}");
                        None
                    }
                })
        };

        Self {
            renderer,
            scope,
            interception,
            force_vsync: var(FORCE_VSYNC_VAR).is_some_and(|value| value == "true"),
            egl_library: library(EGL_LIBRARY_VAR),
            gles_library: library(GLES_LIBRARY_VAR),
        }
    }
}
