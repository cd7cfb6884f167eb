//! The mutation backend contract

use std::process::Command;

use dot_fs::{DirEntry, Metadata, NormalizedPath};

use crate::Result;

/// Read-only view of a target: filesystem queries, persistent state lookups
/// and side-effect-free commands.
///
/// Reads always describe the actual current state. A backend that records
/// pending changes instead of performing them still answers reads from what
/// is really there.
pub trait SystemReader {
    fn stat(&self, path: &NormalizedPath) -> Result<Metadata>;

    fn lstat(&self, path: &NormalizedPath) -> Result<Metadata>;

    /// Directory entries sorted by name.
    fn read_dir(&self, path: &NormalizedPath) -> Result<Vec<DirEntry>>;

    fn read_file(&self, path: &NormalizedPath) -> Result<Vec<u8>>;

    fn read_link(&self, path: &NormalizedPath) -> Result<String>;

    fn glob(&self, pattern: &str) -> Result<Vec<NormalizedPath>>;

    fn state_get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Run a command without side effects and return its stdout.
    fn idempotent_cmd_output(&self, cmd: &mut Command) -> Result<Vec<u8>>;

    fn path_separator(&self) -> char {
        '/'
    }
}

/// A [`SystemReader`] that can also change things.
pub trait System: SystemReader {
    fn chmod(&mut self, path: &NormalizedPath, perm: u32) -> Result<()>;

    fn mkdir(&mut self, path: &NormalizedPath, perm: u32) -> Result<()>;

    fn rename(&mut self, old: &NormalizedPath, new: &NormalizedPath) -> Result<()>;

    /// Remove `path` and everything below it. Missing paths are not an error.
    fn remove_all(&mut self, path: &NormalizedPath) -> Result<()>;

    /// Replace the content of `path` with `data`, leaving it with exactly
    /// `perm`.
    fn write_file(&mut self, path: &NormalizedPath, data: &[u8], perm: u32) -> Result<()>;

    /// Make `new` a symlink pointing at `old`, replacing whatever is there.
    fn write_symlink(&mut self, old: &str, new: &NormalizedPath) -> Result<()>;

    fn state_set(&mut self, bucket: &[u8], key: &[u8], value: &[u8]) -> Result<()>;

    fn state_delete(&mut self, bucket: &[u8], key: &[u8]) -> Result<()>;

    /// Execute `data` as a script named after `name`. Always runs; deciding
    /// whether a script should run is the caller's job.
    fn run_script(&mut self, name: &NormalizedPath, data: &[u8]) -> Result<()>;
}

impl<S: SystemReader + ?Sized> SystemReader for &mut S {
    fn stat(&self, path: &NormalizedPath) -> Result<Metadata> {
        (**self).stat(path)
    }

    fn lstat(&self, path: &NormalizedPath) -> Result<Metadata> {
        (**self).lstat(path)
    }

    fn read_dir(&self, path: &NormalizedPath) -> Result<Vec<DirEntry>> {
        (**self).read_dir(path)
    }

    fn read_file(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        (**self).read_file(path)
    }

    fn read_link(&self, path: &NormalizedPath) -> Result<String> {
        (**self).read_link(path)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<NormalizedPath>> {
        (**self).glob(pattern)
    }

    fn state_get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).state_get(bucket, key)
    }

    fn idempotent_cmd_output(&self, cmd: &mut Command) -> Result<Vec<u8>> {
        (**self).idempotent_cmd_output(cmd)
    }

    fn path_separator(&self) -> char {
        (**self).path_separator()
    }
}

impl<S: System + ?Sized> System for &mut S {
    fn chmod(&mut self, path: &NormalizedPath, perm: u32) -> Result<()> {
        (**self).chmod(path, perm)
    }

    fn mkdir(&mut self, path: &NormalizedPath, perm: u32) -> Result<()> {
        (**self).mkdir(path, perm)
    }

    fn rename(&mut self, old: &NormalizedPath, new: &NormalizedPath) -> Result<()> {
        (**self).rename(old, new)
    }

    fn remove_all(&mut self, path: &NormalizedPath) -> Result<()> {
        (**self).remove_all(path)
    }

    fn write_file(&mut self, path: &NormalizedPath, data: &[u8], perm: u32) -> Result<()> {
        (**self).write_file(path, data, perm)
    }

    fn write_symlink(&mut self, old: &str, new: &NormalizedPath) -> Result<()> {
        (**self).write_symlink(old, new)
    }

    fn state_set(&mut self, bucket: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        (**self).state_set(bucket, key, value)
    }

    fn state_delete(&mut self, bucket: &[u8], key: &[u8]) -> Result<()> {
        (**self).state_delete(bucket, key)
    }

    fn run_script(&mut self, name: &NormalizedPath, data: &[u8]) -> Result<()> {
        (**self).run_script(name, data)
    }
}
