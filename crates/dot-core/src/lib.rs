//! Reconciliation engine for dotsync
//!
//! A [`TargetState`] is built from a source directory whose file names
//! encode the desired target (see [`attr`]), evaluated through a
//! [`TemplateEngine`], and applied through any [`dot_system::System`]
//! backend. Applying twice in a row issues no mutations the second time.

pub mod attr;
pub mod entry;
pub mod error;
pub mod target_state;
pub mod template;

pub use attr::{DirAttrs, FileAttrs, FileType, RunPolicy};
pub use entry::{ApplyOptions, ApplyReport, Entry, SCRIPT_STATE_BUCKET};
pub use error::{Error, Result};
pub use target_state::TargetState;
pub use template::{SimpleEngine, TemplateEngine, TemplateError, TemplateFuncs};
