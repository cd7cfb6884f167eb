//! The primitive filesystem contract
//!
//! Backends never touch `std::fs` directly; they go through a [`Vfs`], which
//! lets the same backend run against the live operating system or against an
//! in-memory tree in tests.

use std::path::PathBuf;

use crate::{NormalizedPath, Result};

/// Type of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    /// Sockets, fifos, devices.
    Other,
}

/// The subset of stat(2) the backends need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    kind: FileKind,
    perm: u32,
    dev: u64,
    len: u64,
}

impl Metadata {
    pub fn new(kind: FileKind, perm: u32, dev: u64, len: u64) -> Self {
        Self {
            kind,
            perm: perm & 0o7777,
            dev,
            len,
        }
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Permission bits only, without file type bits.
    pub fn perm(&self) -> u32 {
        self.perm
    }

    /// Identifier of the device holding the object.
    pub fn dev(&self) -> u64 {
        self.dev
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// One entry of a directory listing, with lstat metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub metadata: Metadata,
}

/// An open, truncated file awaiting new content.
pub trait WriteHandle {
    /// Set permission bits on the open file.
    fn chmod(&mut self, perm: u32) -> Result<()>;

    /// Append bytes.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Flush and release the handle.
    fn close(self: Box<Self>) -> Result<()>;
}

/// POSIX-like filesystem primitives.
///
/// All paths are absolute [`NormalizedPath`]s in the filesystem's own
/// namespace.
pub trait Vfs {
    /// True when this filesystem is the operating system's, where other
    /// processes may observe intermediate states.
    fn is_live(&self) -> bool;

    /// Separator used by [`Vfs::glob`] patterns.
    fn path_separator(&self) -> char {
        '/'
    }

    /// The operating-system path backing `path`, for live filesystems.
    fn native_path(&self, path: &NormalizedPath) -> Option<PathBuf>;

    fn stat(&self, path: &NormalizedPath) -> Result<Metadata>;

    fn lstat(&self, path: &NormalizedPath) -> Result<Metadata>;

    /// Entries of a directory, sorted by name.
    fn read_dir(&self, path: &NormalizedPath) -> Result<Vec<DirEntry>>;

    fn read_file(&self, path: &NormalizedPath) -> Result<Vec<u8>>;

    fn read_link(&self, path: &NormalizedPath) -> Result<String>;

    /// Open for writing, creating with `perm` or truncating an existing file.
    fn create_truncate(&self, path: &NormalizedPath, perm: u32)
        -> Result<Box<dyn WriteHandle + '_>>;

    fn mkdir(&self, path: &NormalizedPath, perm: u32) -> Result<()>;

    fn chmod(&self, path: &NormalizedPath, perm: u32) -> Result<()>;

    /// Create a symlink at `new` pointing at `old`.
    fn symlink(&self, old: &str, new: &NormalizedPath) -> Result<()>;

    fn rename(&self, old: &NormalizedPath, new: &NormalizedPath) -> Result<()>;

    /// Remove a path and everything below it. Missing paths are not an error.
    fn remove_all(&self, path: &NormalizedPath) -> Result<()>;

    /// Paths matching a shell glob pattern, sorted.
    fn glob(&self, pattern: &str) -> Result<Vec<NormalizedPath>>;
}
