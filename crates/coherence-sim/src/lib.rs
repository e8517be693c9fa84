//! Script front end for the coherence simulator: input validation,
//! rendering and logging.

/// Stderr backend for the `log` facade.
pub mod logger;
/// Plain-text and JSON rendering.
pub mod render;
/// Field-level request validation.
pub mod request;
/// Line-oriented request scripts.
pub mod script;

pub use request::RequestError;
pub use script::{parse_script, ScriptCommand, ScriptError, ScriptItem};

#[cfg(test)]
use tempfile as _;
