//! The direct backend

use std::collections::HashMap;
use std::fs::Permissions;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Command;

use dot_fs::{DirEntry, Metadata, NormalizedPath, Vfs};
use dot_state::PersistentState;
use tracing::debug;

use crate::system::{System, SystemReader};
use crate::{Error, Result};

/// Mode of the temporary copy a script runs from.
const SCRIPT_PERM: u32 = 0o700;

/// A [`System`] that changes a [`Vfs`] and runs scripts as subprocesses.
///
/// On a live filesystem symlinks are replaced atomically: the new link is
/// created in a scratch directory on the destination's device and renamed
/// over the destination. The device of each directory and the scratch
/// directory of each device are cached for the lifetime of the instance.
#[derive(Debug)]
pub struct RealSystem<F, S> {
    fs: F,
    state: S,
    dev_cache: HashMap<NormalizedPath, u64>,
    scratch_dirs: HashMap<u64, PathBuf>,
}

impl<F: Vfs, S: PersistentState> RealSystem<F, S> {
    pub fn new(fs: F, state: S) -> Self {
        Self {
            fs,
            state,
            dev_cache: HashMap::new(),
            scratch_dirs: HashMap::new(),
        }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn into_parts(self) -> (F, S) {
        (self.fs, self.state)
    }

    /// A native directory on the same device as `dir`, suitable for staging
    /// files that are then renamed into `dir`.
    ///
    /// Prefers the process temp directory when it shares the device.
    fn scratch_dir(&mut self, dir: &NormalizedPath) -> Result<PathBuf> {
        let dev = match self.dev_cache.get(dir) {
            Some(&dev) => dev,
            None => {
                let dev = self.fs.stat(dir)?.dev();
                self.dev_cache.insert(dir.clone(), dev);
                dev
            }
        };
        if let Some(scratch) = self.scratch_dirs.get(&dev) {
            return Ok(scratch.clone());
        }

        let temp_dir = std::env::temp_dir();
        let scratch = match std::fs::metadata(&temp_dir) {
            Ok(metadata) if metadata.dev() == dev => temp_dir,
            _ => self.fs.native_path(dir).ok_or_else(|| {
                dot_fs::Error::kind(dir.to_native(), ErrorKind::Unsupported, "no native path")
            })?,
        };
        debug!(dir = %dir, dev, scratch = %scratch.display(), "selected scratch directory");
        self.scratch_dirs.insert(dev, scratch.clone());
        Ok(scratch)
    }

    fn execute(&self, name: &NormalizedPath, script: &Path) -> Result<()> {
        let mut cmd = Command::new(script);
        if let Some(dir) = name
            .parent()
            .and_then(|parent| self.fs.native_path(&parent))
            .filter(|dir| dir.is_dir())
        {
            cmd.current_dir(dir);
        }

        let status = cmd.status().map_err(|source| Error::Spawn {
            program: name.to_string(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Script {
                name: name.to_string(),
                status,
            })
        }
    }
}

impl<F: Vfs, S: PersistentState> SystemReader for RealSystem<F, S> {
    fn stat(&self, path: &NormalizedPath) -> Result<Metadata> {
        Ok(self.fs.stat(path)?)
    }

    fn lstat(&self, path: &NormalizedPath) -> Result<Metadata> {
        Ok(self.fs.lstat(path)?)
    }

    fn read_dir(&self, path: &NormalizedPath) -> Result<Vec<DirEntry>> {
        Ok(self.fs.read_dir(path)?)
    }

    fn read_file(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        Ok(self.fs.read_file(path)?)
    }

    fn read_link(&self, path: &NormalizedPath) -> Result<String> {
        Ok(self.fs.read_link(path)?)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<NormalizedPath>> {
        Ok(self.fs.glob(pattern)?)
    }

    fn state_get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.state.get(bucket, key)?)
    }

    fn idempotent_cmd_output(&self, cmd: &mut Command) -> Result<Vec<u8>> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        let output = cmd.output().map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(Error::Command {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            })
        }
    }

    fn path_separator(&self) -> char {
        self.fs.path_separator()
    }
}

impl<F: Vfs, S: PersistentState> System for RealSystem<F, S> {
    fn chmod(&mut self, path: &NormalizedPath, perm: u32) -> Result<()> {
        debug!(path = %path, perm = format_args!("{perm:o}"), "chmod");
        Ok(self.fs.chmod(path, perm)?)
    }

    fn mkdir(&mut self, path: &NormalizedPath, perm: u32) -> Result<()> {
        debug!(path = %path, perm = format_args!("{perm:o}"), "mkdir");
        self.fs.mkdir(path, perm)?;
        // The umask applies to mkdir, not to chmod
        self.fs.chmod(path, perm)?;
        Ok(())
    }

    fn rename(&mut self, old: &NormalizedPath, new: &NormalizedPath) -> Result<()> {
        debug!(old = %old, new = %new, "rename");
        Ok(self.fs.rename(old, new)?)
    }

    fn remove_all(&mut self, path: &NormalizedPath) -> Result<()> {
        debug!(path = %path, "remove_all");
        Ok(self.fs.remove_all(path)?)
    }

    fn write_file(&mut self, path: &NormalizedPath, data: &[u8], perm: u32) -> Result<()> {
        debug!(path = %path, len = data.len(), perm = format_args!("{perm:o}"), "write_file");
        Ok(dot_fs::io::write_file(&self.fs, path, data, perm)?)
    }

    fn write_symlink(&mut self, old: &str, new: &NormalizedPath) -> Result<()> {
        debug!(old, new = %new, "write_symlink");
        if self.fs.is_live()
            && let Some(dest) = self.fs.native_path(new)
        {
            let dir = new.parent().unwrap_or_else(NormalizedPath::root);
            let scratch = self.scratch_dir(&dir)?;
            dot_fs::io::replace_symlink(&scratch, old, &dest)?;
            return Ok(());
        }

        self.fs.remove_all(new)?;
        Ok(self.fs.symlink(old, new)?)
    }

    fn state_set(&mut self, bucket: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        debug!(
            bucket = %String::from_utf8_lossy(bucket),
            key = %String::from_utf8_lossy(key),
            "state_set"
        );
        Ok(self.state.set(bucket, key, value)?)
    }

    fn state_delete(&mut self, bucket: &[u8], key: &[u8]) -> Result<()> {
        debug!(
            bucket = %String::from_utf8_lossy(bucket),
            key = %String::from_utf8_lossy(key),
            "state_delete"
        );
        Ok(self.state.delete(bucket, key)?)
    }

    fn run_script(&mut self, name: &NormalizedPath, data: &[u8]) -> Result<()> {
        debug!(name = %name, len = data.len(), "run_script");

        // Random part first so the extension survives
        let suffix = format!(".{}", name.file_name().unwrap_or("script"));
        let mut file = tempfile::Builder::new()
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| dot_fs::Error::io(std::env::temp_dir(), e))?;
        let path = file.path().to_path_buf();

        // Private before any content is written
        let written = file
            .as_file()
            .set_permissions(Permissions::from_mode(SCRIPT_PERM))
            .and_then(|()| file.write_all(data))
            .map_err(|e| Error::from(dot_fs::Error::io(&path, e)));
        let script = file.into_temp_path();

        let result = written.and_then(|()| self.execute(name, &script));
        let cleanup = script
            .close()
            .map_err(|e| Error::from(dot_fs::Error::io(&path, e)));

        match (result, cleanup) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(first), Err(second)) => Err(Error::combine(first, second)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use dot_fs::{MemFs, OsFs, WriteHandle};
    use dot_state::MemoryState;

    /// Live filesystem that counts `stat` calls.
    struct StatCounter {
        inner: OsFs,
        stats: Cell<usize>,
    }

    impl Vfs for StatCounter {
        fn is_live(&self) -> bool {
            self.inner.is_live()
        }

        fn native_path(&self, path: &NormalizedPath) -> Option<PathBuf> {
            self.inner.native_path(path)
        }

        fn stat(&self, path: &NormalizedPath) -> dot_fs::Result<Metadata> {
            self.stats.set(self.stats.get() + 1);
            self.inner.stat(path)
        }

        fn lstat(&self, path: &NormalizedPath) -> dot_fs::Result<Metadata> {
            self.inner.lstat(path)
        }

        fn read_dir(&self, path: &NormalizedPath) -> dot_fs::Result<Vec<DirEntry>> {
            self.inner.read_dir(path)
        }

        fn read_file(&self, path: &NormalizedPath) -> dot_fs::Result<Vec<u8>> {
            self.inner.read_file(path)
        }

        fn read_link(&self, path: &NormalizedPath) -> dot_fs::Result<String> {
            self.inner.read_link(path)
        }

        fn create_truncate(
            &self,
            path: &NormalizedPath,
            perm: u32,
        ) -> dot_fs::Result<Box<dyn WriteHandle + '_>> {
            self.inner.create_truncate(path, perm)
        }

        fn mkdir(&self, path: &NormalizedPath, perm: u32) -> dot_fs::Result<()> {
            self.inner.mkdir(path, perm)
        }

        fn chmod(&self, path: &NormalizedPath, perm: u32) -> dot_fs::Result<()> {
            self.inner.chmod(path, perm)
        }

        fn symlink(&self, old: &str, new: &NormalizedPath) -> dot_fs::Result<()> {
            self.inner.symlink(old, new)
        }

        fn rename(&self, old: &NormalizedPath, new: &NormalizedPath) -> dot_fs::Result<()> {
            self.inner.rename(old, new)
        }

        fn remove_all(&self, path: &NormalizedPath) -> dot_fs::Result<()> {
            self.inner.remove_all(path)
        }

        fn glob(&self, pattern: &str) -> dot_fs::Result<Vec<NormalizedPath>> {
            self.inner.glob(pattern)
        }
    }

    #[test]
    fn scratch_dir_is_resolved_once_per_directory_and_device() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("home/sub")).unwrap();
        std::fs::write(temp.path().join("home/a"), "file").unwrap();
        let fs = StatCounter {
            inner: OsFs::rooted(temp.path()),
            stats: Cell::new(0),
        };
        let mut system = RealSystem::new(fs, MemoryState::new());

        system.write_symlink("one", &"/home/a".into()).unwrap();
        system.write_symlink("two", &"/home/b".into()).unwrap();
        assert_eq!(system.fs().stats.get(), 1);
        assert_eq!(system.dev_cache.len(), 1);
        assert_eq!(system.scratch_dirs.len(), 1);

        system.write_symlink("three", &"/home/sub/c".into()).unwrap();
        assert_eq!(system.fs().stats.get(), 2);
        assert_eq!(system.dev_cache.len(), 2);
        // Same device, same scratch directory
        assert_eq!(system.scratch_dirs.len(), 1);

        let scratch = system.scratch_dirs.values().next().unwrap();
        assert!(*scratch == std::env::temp_dir() || *scratch == temp.path().join("home"));
        assert_eq!(std::fs::read_link(temp.path().join("home/a")).unwrap().to_str(), Some("one"));
        assert_eq!(std::fs::read_link(temp.path().join("home/b")).unwrap().to_str(), Some("two"));
        assert_eq!(
            std::fs::read_link(temp.path().join("home/sub/c")).unwrap().to_str(),
            Some("three")
        );
    }

    #[test]
    fn symlink_on_memfs_replaces_existing_file() {
        let fs = MemFs::new();
        fs.create_file("/home/user/link", "file", 0o644).unwrap();
        let mut system = RealSystem::new(fs, MemoryState::new());

        system.write_symlink("target", &"/home/user/link".into()).unwrap();

        assert_eq!(system.read_link(&"/home/user/link".into()).unwrap(), "target");
    }

    #[test]
    fn mkdir_sets_exact_mode() {
        let mut system = RealSystem::new(MemFs::new(), MemoryState::new());
        system.mkdir(&"/secret".into(), 0o700).unwrap();
        assert_eq!(system.stat(&"/secret".into()).unwrap().perm(), 0o700);
    }

    #[test]
    fn state_round_trip() {
        let mut system = RealSystem::new(MemFs::new(), MemoryState::new());
        system.state_set(b"b", b"k", b"v").unwrap();
        assert_eq!(system.state_get(b"b", b"k").unwrap(), Some(b"v".to_vec()));
        system.state_delete(b"b", b"k").unwrap();
        assert_eq!(system.state_get(b"b", b"k").unwrap(), None);
    }
}
