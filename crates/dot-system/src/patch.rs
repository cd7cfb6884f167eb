//! Patch model
//!
//! Mirrors the structure of a git patch: a [`Patch`] holds [`FilePatch`]es,
//! each comparing an optional old file against an optional new file. A
//! missing `from` is a creation and a missing `to` is a deletion.

use crate::hash::ObjectHash;
use crate::mode::FileMode;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOp {
    Equal,
    Add,
    Delete,
}

/// A run of lines sharing one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub op: ChunkOp,
    pub content: Vec<u8>,
}

impl Chunk {
    pub fn new(op: ChunkOp, content: impl AsRef<[u8]>) -> Self {
        Self {
            op,
            content: content.as_ref().to_vec(),
        }
    }
}

/// One side of a file patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFile {
    /// Path relative to the patch root, without a leading separator.
    pub path: String,
    pub mode: FileMode,
    pub hash: ObjectHash,
}

impl PatchFile {
    pub fn new(path: impl Into<String>, mode: FileMode, hash: ObjectHash) -> Self {
        Self {
            path: path.into(),
            mode,
            hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilePatch {
    pub from: Option<PatchFile>,
    pub to: Option<PatchFile>,
    pub is_binary: bool,
    /// Empty when `is_binary` is set.
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Patch {
    /// Free text written before the file patches.
    pub message: String,
    pub file_patches: Vec<FilePatch>,
}

impl From<FilePatch> for Patch {
    fn from(file_patch: FilePatch) -> Self {
        Self {
            message: String::new(),
            file_patches: vec![file_patch],
        }
    }
}

/// Destination for encoded patches.
pub trait PatchSink {
    fn encode(&mut self, patch: &Patch) -> Result<()>;
}

impl<P: PatchSink + ?Sized> PatchSink for &mut P {
    fn encode(&mut self, patch: &Patch) -> Result<()> {
        (**self).encode(patch)
    }
}

/// Keeps every patch it receives, in order.
#[derive(Debug, Default)]
pub struct PatchCollector {
    patches: Vec<Patch>,
}

impl PatchCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn into_patches(self) -> Vec<Patch> {
        self.patches
    }

    /// All file patches across all received patches.
    pub fn file_patches(&self) -> impl Iterator<Item = &FilePatch> {
        self.patches.iter().flat_map(|p| p.file_patches.iter())
    }
}

impl PatchSink for PatchCollector {
    fn encode(&mut self, patch: &Patch) -> Result<()> {
        self.patches.push(patch.clone());
        Ok(())
    }
}
