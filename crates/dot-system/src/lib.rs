//! Mutation backends for dotsync
//!
//! Every change the reconciliation engine makes goes through the
//! [`System`] contract. Swapping the backend changes what "applying" means
//! without touching the engine:
//!
//! - [`RealSystem`]: performs the operations against a [`dot_fs::Vfs`] and
//!   runs scripts as subprocesses
//! - [`GitDiffSystem`]: performs nothing and describes each operation as a
//!   git-style patch
//! - [`DryRunSystem`]: performs nothing and records whether anything would
//!   have changed

pub mod dryrun;
pub mod encoder;
pub mod error;
pub mod gitdiff;
pub mod hash;
pub mod mode;
pub mod patch;
pub mod real;
pub mod sniff;
pub mod system;
pub mod textdiff;

pub use dryrun::DryRunSystem;
pub use encoder::UnifiedEncoder;
pub use error::{Error, Result};
pub use gitdiff::GitDiffSystem;
pub use hash::ObjectHash;
pub use mode::FileMode;
pub use patch::{Chunk, ChunkOp, FilePatch, Patch, PatchCollector, PatchFile, PatchSink};
pub use real::RealSystem;
pub use system::{System, SystemReader};
