//! brings up an embedded gl driver for callers written against desktop gl.
//!
//! the windowing library is located at runtime, its negotiation calls are rewritten into a dialect
//! embedded drivers accept, and graphics symbols are handed out by name.

use std::fmt;

mod config;
pub mod ffi;
mod logger;
mod negotiation;
mod procaddr;
mod resolve;

pub use config::*;
pub use logger::*;
pub use negotiation::*;
pub use procaddr::*;
pub use resolve::*;

/// attached as context to errors after which the process cannot render at all.
#[derive(Debug)]
pub struct Fatal;

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unrecoverable")
    }
}

pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Fatal>().is_some()
}
