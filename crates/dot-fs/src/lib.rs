//! Filesystem primitives for dotsync
//!
//! Provides normalized paths, the [`Vfs`] primitive contract with a live
//! ([`OsFs`]) and an in-memory ([`MemFs`]) implementation, and the ordered
//! write routines the backends build on.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod memfs;
pub mod osfs;
pub mod path;
pub mod vfs;

pub use config::{ConfigStore, Format};
pub use error::{Error, Result};
pub use memfs::MemFs;
pub use osfs::OsFs;
pub use path::NormalizedPath;
pub use vfs::{DirEntry, FileKind, Metadata, Vfs, WriteHandle};
