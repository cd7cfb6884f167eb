//! A [`System`] decorator that counts mutating calls.

use std::process::Command;

use dot_fs::{DirEntry, Metadata, NormalizedPath};
use dot_system::{Result, System, SystemReader};

/// Forwards everything to `inner`, counting each mutating call by name.
///
/// ```rust,no_run
/// # use dot_test_utils::CountingSystem;
/// # fn demo(inner: &mut dyn dot_system::System) {
/// let mut system = CountingSystem::new(inner);
/// // ... apply through `system` ...
/// assert_eq!(system.mutations(), 0, "{:?}", system.calls());
/// # }
/// ```
pub struct CountingSystem<S> {
    inner: S,
    calls: Vec<String>,
}

impl<S> CountingSystem<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Vec::new(),
        }
    }

    /// Number of mutating calls seen so far.
    pub fn mutations(&self) -> usize {
        self.calls.len()
    }

    /// Each mutating call as `"<method> <path>"`, in order.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn record(&mut self, method: &str, path: impl std::fmt::Display) {
        self.calls.push(format!("{method} {path}"));
    }
}

impl<S: SystemReader> SystemReader for CountingSystem<S> {
    fn stat(&self, path: &NormalizedPath) -> Result<Metadata> {
        self.inner.stat(path)
    }

    fn lstat(&self, path: &NormalizedPath) -> Result<Metadata> {
        self.inner.lstat(path)
    }

    fn read_dir(&self, path: &NormalizedPath) -> Result<Vec<DirEntry>> {
        self.inner.read_dir(path)
    }

    fn read_file(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        self.inner.read_file(path)
    }

    fn read_link(&self, path: &NormalizedPath) -> Result<String> {
        self.inner.read_link(path)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<NormalizedPath>> {
        self.inner.glob(pattern)
    }

    fn state_get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.state_get(bucket, key)
    }

    fn idempotent_cmd_output(&self, cmd: &mut Command) -> Result<Vec<u8>> {
        self.inner.idempotent_cmd_output(cmd)
    }
}

impl<S: System> System for CountingSystem<S> {
    fn chmod(&mut self, path: &NormalizedPath, perm: u32) -> Result<()> {
        self.record("chmod", path);
        self.inner.chmod(path, perm)
    }

    fn mkdir(&mut self, path: &NormalizedPath, perm: u32) -> Result<()> {
        self.record("mkdir", path);
        self.inner.mkdir(path, perm)
    }

    fn rename(&mut self, old: &NormalizedPath, new: &NormalizedPath) -> Result<()> {
        self.record("rename", old);
        self.inner.rename(old, new)
    }

    fn remove_all(&mut self, path: &NormalizedPath) -> Result<()> {
        self.record("remove_all", path);
        self.inner.remove_all(path)
    }

    fn write_file(&mut self, path: &NormalizedPath, data: &[u8], perm: u32) -> Result<()> {
        self.record("write_file", path);
        self.inner.write_file(path, data, perm)
    }

    fn write_symlink(&mut self, old: &str, new: &NormalizedPath) -> Result<()> {
        self.record("write_symlink", new);
        self.inner.write_symlink(old, new)
    }

    fn state_set(&mut self, bucket: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        self.record("state_set", String::from_utf8_lossy(key));
        self.inner.state_set(bucket, key, value)
    }

    fn state_delete(&mut self, bucket: &[u8], key: &[u8]) -> Result<()> {
        self.record("state_delete", String::from_utf8_lossy(key));
        self.inner.state_delete(bucket, key)
    }

    fn run_script(&mut self, name: &NormalizedPath, data: &[u8]) -> Result<()> {
        self.record("run_script", name);
        self.inner.run_script(name, data)
    }
}
