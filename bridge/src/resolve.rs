use std::ffi::{CStr, CString};
use std::sync::OnceLock;
use std::{error, fmt};

use anyhow::Context as _;
use dynlib::{DynLib, Scope};
use egl::Egl;

use crate::Fatal;
use crate::config::{Config, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Library {
    /// display, config, surface and context management.
    Egl,
    /// the actual drawing commands.
    Gles,
}

impl Library {
    fn file_names(self) -> &'static [&'static str] {
        match self {
            Self::Egl => &["libEGL.so", "libEGL.so.1"],
            Self::Gles => &["libGLESv2.so", "libGLESv2.so.2"],
        }
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Egl => "windowing library",
            Self::Gles => "raster library",
        })
    }
}

#[cfg(target_pointer_width = "64")]
const LIBRARY_DIRS: &[&str] = &["/system/lib64", "/system/lib", "/vendor/lib64", "/vendor/lib"];
#[cfg(not(target_pointer_width = "64"))]
const LIBRARY_DIRS: &[&str] = &["/system/lib", "/vendor/lib"];

const GL4ES_LIBRARY: &str = "libgl4es_114.so";

/// ordered locations to try for `library`: the user override, the renderer's own library, bare
/// names for the loader's search path, then absolute system and vendor paths. each location
/// appears once.
pub fn candidates(library: Library, config: &Config) -> Vec<CString> {
    let mut out: Vec<CString> = Vec::new();
    let mut push = |candidate: CString| {
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    };

    let user_override = match library {
        Library::Egl => config.egl_library.as_ref(),
        Library::Gles => config.gles_library.as_ref(),
    };
    if let Some(path) = user_override {
        push(path.clone());
    }

    // NOTE: file names and dirs are compile-time strings without interior nuls.
    let mut push_str = |s: String| {
        if let Ok(s) = CString::new(s) {
            push(s);
        }
    };

    if library == Library::Gles && config.renderer == Renderer::Gl4es {
        push_str(GL4ES_LIBRARY.to_string());
    }
    for name in library.file_names() {
        push_str(name.to_string());
    }
    for dir in LIBRARY_DIRS {
        for name in library.file_names() {
            push_str(format!("{dir}/{name}"));
        }
    }

    out
}

pub trait Loader {
    type Handle;

    fn load(&mut self, path: &CStr, scope: Scope) -> Result<Self::Handle, dynlib::Error>;
}

/// loads through the platform dynamic loader.
pub struct SystemLoader;

impl Loader for SystemLoader {
    type Handle = DynLib;

    fn load(&mut self, path: &CStr, scope: Scope) -> Result<DynLib, dynlib::Error> {
        DynLib::load_with_scope(path, scope)
    }
}

#[derive(Debug)]
pub struct ResolveError {
    pub library: Library,
    /// one entry per attempted candidate, in order.
    pub failures: Vec<dynlib::Error>,
}

impl error::Error for ResolveError {}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "could not resolve {} ({} candidates tried)",
            self.library,
            self.failures.len()
        ))?;
        for failure in self.failures.iter() {
            f.write_fmt(format_args!("\n  {failure}"))?;
        }
        Ok(())
    }
}

/// tries `candidates` in order and returns the first one that loads. candidates that fail are
/// logged and skipped, only the exhaustion of the whole list is an error.
pub fn resolve<L: Loader>(
    loader: &mut L,
    library: Library,
    candidates: &[CString],
    scope: Scope,
) -> Result<L::Handle, ResolveError> {
    let mut failures = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        log::debug!("trying {candidate:?} for {library}");
        match loader.load(candidate, scope) {
            Ok(handle) => {
                log::info!("resolved {library} from {candidate:?} ({scope:?} scope)");
                return Ok(handle);
            }
            Err(err) => {
                log::warn!("{err}");
                failures.push(err);
            }
        }
    }
    Err(ResolveError { library, failures })
}

// ----
// process-wide library slots, populated once and never unloaded.

static EGL: OnceLock<Egl> = OnceLock::new();
static GLES: OnceLock<DynLib> = OnceLock::new();

/// resolves the windowing library and populates its entry point table. either failure is fatal.
pub fn load_egl_with<L>(loader: &mut L, config: &Config) -> anyhow::Result<Egl>
where
    L: Loader<Handle = DynLib>,
{
    let dynlib = resolve(
        loader,
        Library::Egl,
        &candidates(Library::Egl, config),
        config.scope,
    )
    .context(Fatal)?;
    Egl::load(dynlib, config.interception).context(Fatal)
}

/// the first successful load wins; later calls return the same table regardless of `config`.
pub fn load_egl(config: &Config) -> anyhow::Result<&'static Egl> {
    if let Some(egl) = EGL.get() {
        return Ok(egl);
    }
    let egl = load_egl_with(&mut SystemLoader, config)?;
    Ok(EGL.get_or_init(|| egl))
}

/// like `load_egl`, the first successful load wins and later calls do not touch `loader`.
pub fn load_gles_with<L>(loader: &mut L, config: &Config) -> Result<&'static DynLib, ResolveError>
where
    L: Loader<Handle = DynLib>,
{
    if let Some(gles) = GLES.get() {
        return Ok(gles);
    }
    let gles = resolve(
        loader,
        Library::Gles,
        &candidates(Library::Gles, config),
        config.scope,
    )?;
    Ok(GLES.get_or_init(|| gles))
}

pub fn loaded_gles() -> Option<&'static DynLib> {
    GLES.get()
}
