use std::process::Command;

use dot_fs::{DirEntry, Metadata, NormalizedPath};

use crate::system::{System, SystemReader};
use crate::Result;

/// Reads through to a wrapped reader and discards every write, remembering
/// whether any write was requested.
pub struct DryRunSystem<'a> {
    reader: &'a dyn SystemReader,
    modified: bool,
}

impl<'a> DryRunSystem<'a> {
    pub fn new(reader: &'a dyn SystemReader) -> Self {
        Self {
            reader,
            modified: false,
        }
    }

    /// True once any mutating operation has been requested.
    pub fn modified(&self) -> bool {
        self.modified
    }

    fn discard(&mut self) -> Result<()> {
        self.modified = true;
        Ok(())
    }
}

impl SystemReader for DryRunSystem<'_> {
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

impl System for DryRunSystem<'_> {
    fn chmod(&mut self, _path: &NormalizedPath, _perm: u32) -> Result<()> {
        self.discard()
    }

    fn mkdir(&mut self, _path: &NormalizedPath, _perm: u32) -> Result<()> {
        self.discard()
    }

    fn rename(&mut self, _old: &NormalizedPath, _new: &NormalizedPath) -> Result<()> {
        self.discard()
    }

    fn remove_all(&mut self, _path: &NormalizedPath) -> Result<()> {
        self.discard()
    }

    fn write_file(&mut self, _path: &NormalizedPath, _data: &[u8], _perm: u32) -> Result<()> {
        self.discard()
    }

    fn write_symlink(&mut self, _old: &str, _new: &NormalizedPath) -> Result<()> {
        self.discard()
    }

    fn state_set(&mut self, _bucket: &[u8], _key: &[u8], _value: &[u8]) -> Result<()> {
        self.discard()
    }

    fn state_delete(&mut self, _bucket: &[u8], _key: &[u8]) -> Result<()> {
        self.discard()
    }

    fn run_script(&mut self, _name: &NormalizedPath, _data: &[u8]) -> Result<()> {
        self.discard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RealSystem;
    use dot_fs::MemFs;
    use dot_state::MemoryState;

    #[test]
    fn writes_are_discarded_and_flagged() {
        let real = RealSystem::new(MemFs::new(), MemoryState::new());
        let mut system = DryRunSystem::new(&real);
        assert!(!system.modified());

        system.write_file(&"/f".into(), b"data", 0o644).unwrap();

        assert!(system.modified());
        assert!(system.stat(&"/f".into()).unwrap_err().is_not_found());
    }
}
