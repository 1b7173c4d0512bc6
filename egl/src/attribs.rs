use std::{error, fmt, slice};

use crate::libegl::*;

/// room for 31 key/value pairs plus the sentinel.
pub const ATTRIB_LIST_CAPACITY: usize = 64;

/// the deepest depth buffer the rewritten config request asks for; drivers on the target devices
/// commonly reject anything above it for window surfaces.
pub const MAX_DEPTH_SIZE: EGLint = 16;

/// renderable type every config request is coerced to.
pub const EMBEDDED_RENDERABLE_TYPE: EGLint = OPENGL_ES2_BIT as EGLint;

/// client version injected into context attribs when the caller did not ask for one.
pub const DEFAULT_CLIENT_VERSION: EGLint = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttribListOverflow {
    pub capacity: usize,
}

impl error::Error for AttribListOverflow {}

impl fmt::Display for AttribListOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "attribute list does not fit into {} ints",
            self.capacity
        ))
    }
}

/// fixed-capacity, always NONE-terminated key/value list.
#[derive(Clone)]
pub struct AttribList {
    data: [EGLint; ATTRIB_LIST_CAPACITY],
    // number of ints before the sentinel
    len: usize,
}

impl Default for AttribList {
    fn default() -> Self {
        Self {
            data: [NONE as EGLint; ATTRIB_LIST_CAPACITY],
            len: 0,
        }
    }
}

impl fmt::Debug for AttribList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl PartialEq for AttribList {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for AttribList {}

impl AttribList {
    pub fn new() -> Self {
        Self::default()
    }

    /// fails instead of truncating, a silently shortened list would select a config or context the
    /// caller never asked for.
    pub fn push(&mut self, key: EGLint, value: EGLint) -> Result<(), AttribListOverflow> {
        // key + value + sentinel
        if self.len + 3 > ATTRIB_LIST_CAPACITY {
            return Err(AttribListOverflow {
                capacity: ATTRIB_LIST_CAPACITY,
            });
        }
        self.data[self.len] = key;
        self.data[self.len + 1] = value;
        self.len += 2;
        self.data[self.len] = NONE as EGLint;
        Ok(())
    }

    pub fn get(&self, key: EGLint) -> Option<EGLint> {
        self.pairs().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (EGLint, EGLint)> + '_ {
        self.data[..self.len]
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
    }

    /// number of key/value pairs.
    pub fn len(&self) -> usize {
        self.len / 2
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// the list including its sentinel.
    pub fn as_slice(&self) -> &[EGLint] {
        &self.data[..=self.len]
    }

    pub fn as_ptr(&self) -> *const EGLint {
        self.data.as_ptr()
    }

    fn set_value_at(&mut self, pair_index: usize, value: EGLint) {
        assert!(pair_index < self.len());
        self.data[pair_index * 2 + 1] = value;
    }
}

/// returns key/value ints of a NONE-terminated list, without the sentinel. the scan steps over
/// values so that a value which happens to equal NONE does not end the list.
///
/// # Safety
///
/// `ptr` must be null or point to a NONE-terminated list of key/value pairs that outlives `'a`.
pub unsafe fn pairs_from_ptr<'a>(ptr: *const EGLint) -> &'a [EGLint] {
    if ptr.is_null() {
        return &[];
    }
    let mut len = 0;
    while unsafe { *ptr.add(len) } != NONE as EGLint {
        len += 2;
    }
    unsafe { slice::from_raw_parts(ptr, len) }
}

pub fn rewrite_config_value(key: EGLint, value: EGLint) -> EGLint {
    match key as EGLenum {
        RENDERABLE_TYPE => EMBEDDED_RENDERABLE_TYPE,
        DEPTH_SIZE => value.min(MAX_DEPTH_SIZE),
        _ => value,
    }
}

/// copies `pairs` into a fresh list, coercing renderable type and clamping depth size. order and
/// every other pair are kept as-is.
pub fn rewrite_config_attribs(pairs: &[EGLint]) -> Result<AttribList, AttribListOverflow> {
    debug_assert!(pairs.len() % 2 == 0);

    let mut list = AttribList::new();
    for pair in pairs.chunks_exact(2) {
        let (key, value) = (pair[0], pair[1]);
        let rewritten = rewrite_config_value(key, value);
        if rewritten != value {
            log::debug!("config attrib {key:#x}: {value:#x} -> {rewritten:#x}");
        }
        list.push(key, rewritten)?;
    }
    Ok(list)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextAttribs {
    pub list: AttribList,
    /// pair index of the client version that was injected, `None` when the caller specified one.
    pub injected_version: Option<usize>,
}

impl ContextAttribs {
    /// lowers the injected client version by one major version. returns false (and changes
    /// nothing) when the caller chose the version, or when there is nothing left to lower.
    pub fn downgrade_injected_version(&mut self) -> bool {
        let Some(index) = self.injected_version else {
            return false;
        };
        let Some(version) = self.list.get(CONTEXT_CLIENT_VERSION as EGLint) else {
            return false;
        };
        if version <= 1 {
            return false;
        }
        self.list.set_value_at(index, version - 1);
        true
    }
}

/// copies `pairs` unchanged and appends a client version right before the sentinel if the caller
/// did not specify one.
pub fn rewrite_context_attribs(pairs: &[EGLint]) -> Result<ContextAttribs, AttribListOverflow> {
    debug_assert!(pairs.len() % 2 == 0);

    let mut list = AttribList::new();
    let mut has_version = false;
    for pair in pairs.chunks_exact(2) {
        has_version |= pair[0] == CONTEXT_CLIENT_VERSION as EGLint;
        list.push(pair[0], pair[1])?;
    }

    let injected_version = if has_version {
        None
    } else {
        let index = list.len();
        list.push(CONTEXT_CLIENT_VERSION as EGLint, DEFAULT_CLIENT_VERSION)?;
        Some(index)
    };

    Ok(ContextAttribs {
        list,
        injected_version,
    })
}
