//! A backend that describes changes as git patches

use std::process::Command;

use dot_fs::{DirEntry, Metadata, NormalizedPath};

use crate::hash::ObjectHash;
use crate::mode::FileMode;
use crate::patch::{Chunk, ChunkOp, FilePatch, Patch, PatchFile, PatchSink};
use crate::sniff::is_binary;
use crate::system::{System, SystemReader};
use crate::textdiff::diff_chunks;
use crate::{Error, Result};

/// Wraps a read-only view and, instead of changing anything, sends one patch
/// per requested operation to a [`PatchSink`].
///
/// Reads pass through to the wrapped reader, so they describe the current
/// state, not the pending patch. State writes are discarded.
pub struct GitDiffSystem<'a, P> {
    reader: &'a dyn SystemReader,
    sink: P,
    prefix: NormalizedPath,
}

impl<'a, P: PatchSink> GitDiffSystem<'a, P> {
    /// Emitted paths are made relative to `prefix`.
    pub fn new(reader: &'a dyn SystemReader, sink: P, prefix: impl Into<NormalizedPath>) -> Self {
        Self {
            reader,
            sink,
            prefix: prefix.into(),
        }
    }

    pub fn sink(&self) -> &P {
        &self.sink
    }

    pub fn into_sink(self) -> P {
        self.sink
    }

    fn relative(&self, path: &NormalizedPath) -> String {
        path.strip_prefix(&self.prefix)
            .unwrap_or_else(|| path.as_str().trim_start_matches('/'))
            .to_string()
    }

    fn mode_of(&self, path: &NormalizedPath, metadata: &Metadata) -> Result<FileMode> {
        FileMode::from_metadata(metadata).ok_or_else(|| Error::DiffEncoding {
            path: self.relative(path),
            message: format!("no git file mode for {:?}", metadata.kind()),
        })
    }

    fn emit(&mut self, file_patch: FilePatch) -> Result<()> {
        self.sink.encode(&Patch::from(file_patch))
    }
}

/// Chunks for content shown whole, or none when binary.
fn added(data: &[u8]) -> (bool, Vec<Chunk>) {
    if is_binary(data) {
        (true, Vec::new())
    } else {
        (false, vec![Chunk::new(ChunkOp::Add, data)])
    }
}

impl<P> SystemReader for GitDiffSystem<'_, P> {
    fn stat(&self, path: &NormalizedPath) -> Result<Metadata> {
        self.reader.stat(path)
    }

    fn lstat(&self, path: &NormalizedPath) -> Result<Metadata> {
        self.reader.lstat(path)
    }

    fn read_dir(&self, path: &NormalizedPath) -> Result<Vec<DirEntry>> {
        self.reader.read_dir(path)
    }

    fn read_file(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        self.reader.read_file(path)
    }

    fn read_link(&self, path: &NormalizedPath) -> Result<String> {
        self.reader.read_link(path)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<NormalizedPath>> {
        self.reader.glob(pattern)
    }

    fn state_get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.reader.state_get(bucket, key)
    }

    fn idempotent_cmd_output(&self, cmd: &mut Command) -> Result<Vec<u8>> {
        self.reader.idempotent_cmd_output(cmd)
    }

    fn path_separator(&self) -> char {
        self.reader.path_separator()
    }
}

impl<P: PatchSink> System for GitDiffSystem<'_, P> {
    fn chmod(&mut self, path: &NormalizedPath, perm: u32) -> Result<()> {
        let metadata = self.reader.stat(path)?;
        let from_mode = self.mode_of(path, &metadata)?;
        // Only the permission bits change
        let to_mode = FileMode::from_kind(metadata.kind(), perm).unwrap_or(from_mode);
        let path = self.relative(path);
        self.emit(FilePatch {
            from: Some(PatchFile::new(&path, from_mode, ObjectHash::ZERO)),
            to: Some(PatchFile::new(path, to_mode, ObjectHash::ZERO)),
            ..FilePatch::default()
        })
    }

    fn mkdir(&mut self, path: &NormalizedPath, _perm: u32) -> Result<()> {
        self.emit(FilePatch {
            to: Some(PatchFile::new(self.relative(path), FileMode::Dir, ObjectHash::ZERO)),
            ..FilePatch::default()
        })
    }

    fn rename(&mut self, old: &NormalizedPath, new: &NormalizedPath) -> Result<()> {
        let metadata = self.reader.lstat(old)?;
        let mode = self.mode_of(old, &metadata)?;
        self.emit(FilePatch {
            from: Some(PatchFile::new(self.relative(old), mode, ObjectHash::ZERO)),
            to: Some(PatchFile::new(self.relative(new), mode, ObjectHash::ZERO)),
            ..FilePatch::default()
        })
    }

    fn remove_all(&mut self, path: &NormalizedPath) -> Result<()> {
        let metadata = match self.reader.lstat(path) {
            Ok(metadata) => metadata,
            // Nothing to remove, nothing to show
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let mode = self.mode_of(path, &metadata)?;
        self.emit(FilePatch {
            from: Some(PatchFile::new(self.relative(path), mode, ObjectHash::ZERO)),
            ..FilePatch::default()
        })
    }

    fn write_file(&mut self, path: &NormalizedPath, data: &[u8], perm: u32) -> Result<()> {
        let to_mode = FileMode::from_kind(dot_fs::FileKind::File, perm).unwrap_or(FileMode::Regular);
        let current = match self.reader.stat(path) {
            Ok(metadata) => {
                let mode = self.mode_of(path, &metadata)?;
                Some((mode, self.reader.read_file(path)?))
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let relative = self.relative(path);
        let file_patch = match current {
            Some((from_mode, from_data)) => {
                let binary = is_binary(&from_data) || is_binary(data);
                FilePatch {
                    from: Some(PatchFile::new(&relative, from_mode, ObjectHash::of_blob(&from_data))),
                    to: Some(PatchFile::new(relative, to_mode, ObjectHash::of_blob(data))),
                    is_binary: binary,
                    chunks: if binary { Vec::new() } else { diff_chunks(&from_data, data) },
                }
            }
            None => {
                let (binary, chunks) = added(data);
                FilePatch {
                    from: None,
                    to: Some(PatchFile::new(relative, to_mode, ObjectHash::of_blob(data))),
                    is_binary: binary,
                    chunks,
                }
            }
        };
        self.emit(file_patch)
    }

    fn write_symlink(&mut self, old: &str, new: &NormalizedPath) -> Result<()> {
        self.emit(FilePatch {
            to: Some(PatchFile::new(
                self.relative(new),
                FileMode::Symlink,
                ObjectHash::of_blob(old.as_bytes()),
            )),
            chunks: vec![Chunk::new(ChunkOp::Add, old)],
            ..FilePatch::default()
        })
    }

    fn state_set(&mut self, _bucket: &[u8], _key: &[u8], _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn state_delete(&mut self, _bucket: &[u8], _key: &[u8]) -> Result<()> {
        Ok(())
    }

    fn run_script(&mut self, name: &NormalizedPath, data: &[u8]) -> Result<()> {
        let (binary, chunks) = added(data);
        self.emit(FilePatch {
            to: Some(PatchFile::new(
                self.relative(name),
                FileMode::Executable,
                ObjectHash::of_blob(data),
            )),
            is_binary: binary,
            chunks,
            ..FilePatch::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchCollector;
    use crate::RealSystem;
    use dot_fs::MemFs;
    use dot_state::MemoryState;
    use pretty_assertions::assert_eq;

    fn reader() -> RealSystem<MemFs, MemoryState> {
        let fs = MemFs::new();
        fs.create_file("/home/user/.bashrc", "old\n", 0o644).unwrap();
        fs.create_file("/home/user/blob", b"\x00\x01\x02".as_slice(), 0o644).unwrap();
        fs.create_symlink("target", "/home/user/link").unwrap();
        RealSystem::new(fs, MemoryState::new())
    }

    #[test]
    fn paths_are_relative_to_prefix() {
        let reader = reader();
        let mut system = GitDiffSystem::new(&reader, PatchCollector::new(), "/home/user");
        system.mkdir(&"/home/user/.config/app".into(), 0o755).unwrap();

        let patch = system.into_sink().into_patches().remove(0);
        let to = patch.file_patches[0].to.as_ref().unwrap();
        assert_eq!(to.path, ".config/app");
        assert_eq!(to.mode, FileMode::Dir);
        assert!(to.hash.is_zero());
    }

    #[test]
    fn write_file_over_existing_diffs_lines() {
        let reader = reader();
        let mut system = GitDiffSystem::new(&reader, PatchCollector::new(), "/home/user");
        system.write_file(&"/home/user/.bashrc".into(), b"new\n", 0o755).unwrap();

        let file_patch = system.into_sink().into_patches().remove(0).file_patches.remove(0);
        assert_eq!(file_patch.from.as_ref().unwrap().mode, FileMode::Regular);
        assert_eq!(file_patch.to.as_ref().unwrap().mode, FileMode::Executable);
        assert_eq!(file_patch.from.unwrap().hash, ObjectHash::of_blob(b"old\n"));
        assert_eq!(
            file_patch.chunks,
            vec![Chunk::new(ChunkOp::Delete, "old\n"), Chunk::new(ChunkOp::Add, "new\n")]
        );
    }

    #[test]
    fn write_file_with_binary_side_has_no_chunks() {
        let reader = reader();
        let mut system = GitDiffSystem::new(&reader, PatchCollector::new(), "/home/user");
        system.write_file(&"/home/user/blob".into(), b"text\n", 0o644).unwrap();

        let file_patch = &system.sink().patches()[0].file_patches[0];
        assert!(file_patch.is_binary);
        assert!(file_patch.chunks.is_empty());
    }

    #[test]
    fn write_missing_file_is_creation() {
        let reader = reader();
        let mut system = GitDiffSystem::new(&reader, PatchCollector::new(), "/home/user");
        system.write_file(&"/home/user/new".into(), b"hi\n", 0o600).unwrap();

        let file_patch = &system.sink().patches()[0].file_patches[0];
        assert!(file_patch.from.is_none());
        assert_eq!(file_patch.chunks, vec![Chunk::new(ChunkOp::Add, "hi\n")]);
    }

    #[test]
    fn remove_all_uses_link_mode() {
        let reader = reader();
        let mut system = GitDiffSystem::new(&reader, PatchCollector::new(), "/home/user");
        system.remove_all(&"/home/user/link".into()).unwrap();
        system.remove_all(&"/home/user/missing".into()).unwrap();

        let patches = system.into_sink().into_patches();
        assert_eq!(patches.len(), 1);
        let from = patches[0].file_patches[0].from.as_ref().unwrap();
        assert_eq!(from.mode, FileMode::Symlink);
        assert!(patches[0].file_patches[0].to.is_none());
    }

    #[test]
    fn chmod_on_missing_path_fails() {
        let reader = reader();
        let mut system = GitDiffSystem::new(&reader, PatchCollector::new(), "/home/user");
        let err = system.chmod(&"/home/user/missing".into(), 0o600).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn state_writes_are_discarded() {
        let mut reader = reader();
        reader.state_set(b"bucket", b"key", b"value").unwrap();

        let mut system = GitDiffSystem::new(&reader, PatchCollector::new(), "/");
        system.state_set(b"bucket", b"key", b"other").unwrap();
        system.state_delete(b"bucket", b"key").unwrap();

        assert_eq!(system.state_get(b"bucket", b"key").unwrap(), Some(b"value".to_vec()));
        assert!(system.sink().patches().is_empty());
    }
}
