//! Core functionality for Heiretsu archive tooling.
//!
//! This mostly includes script file parsing, the pseudocode renderer and the
//! dialogue patcher used to write translated text back into script files.

#![allow(clippy::uninlined_format_args)]

pub mod error;
pub mod format;

/// Synthetic script builders, shared by unit and integration tests.
pub mod test_util;

pub use error::{Result, ScriptError};
pub use format::script::catalog::OpcodeCatalog;
pub use format::script::render::RenderMode;
pub use format::script::{EditOutcome, PatchConfig, ScriptFile};
pub use heiretsu_nls::Encoding;
