//! [`TestHome`] builder for reconciliation scenarios on a real filesystem.

use std::fs;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Path, PathBuf};

use dot_fs::{NormalizedPath, OsFs};
use dot_state::MemoryState;
use dot_system::RealSystem;
use tempfile::TempDir;

/// A temporary directory holding a source tree under `source/` and a
/// target tree under `home/`.
///
/// Backends built with [`system`](Self::system) see the temporary
/// directory as `/`, so the source is `/source` and the target `/home`.
///
/// ```rust,no_run
/// use dot_test_utils::TestHome;
///
/// let home = TestHome::new();
/// home.write_source("dot_bashrc", "export EDITOR=vi\n");
/// home.write_target(".bashrc", "old\n", 0o644);
/// // ... apply ...
/// home.assert_file(".bashrc", "export EDITOR=vi\n");
/// ```
pub struct TestHome {
    temp_dir: TempDir,
}

impl Default for TestHome {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHome {
    /// Create the temporary directory with empty `source/` and `home/`.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("source")).unwrap();
        fs::create_dir(temp_dir.path().join("home")).unwrap();
        Self { temp_dir }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// `/source`, as seen through [`system`](Self::system).
    pub fn source_dir(&self) -> NormalizedPath {
        NormalizedPath::new("/source")
    }

    /// `/home`, as seen through [`system`](Self::system).
    pub fn target_dir(&self) -> NormalizedPath {
        NormalizedPath::new("/home")
    }

    /// Native path of `rel` inside the source tree.
    pub fn source_path(&self, rel: &str) -> PathBuf {
        self.root().join("source").join(rel)
    }

    /// Native path of `rel` inside the target tree.
    pub fn target_path(&self, rel: &str) -> PathBuf {
        self.root().join("home").join(rel)
    }

    /// A direct backend over the temporary directory with fresh state.
    pub fn system(&self) -> RealSystem<OsFs, MemoryState> {
        RealSystem::new(OsFs::rooted(self.root()), MemoryState::new())
    }

    /// Write a source file, creating parents.
    pub fn write_source(&self, rel: &str, content: &str) {
        write(&self.source_path(rel), content, 0o644);
    }

    /// Write a target file with an exact mode, creating parents.
    pub fn write_target(&self, rel: &str, content: &str, mode: u32) {
        write(&self.target_path(rel), content, mode);
    }

    /// Create a target symlink `rel` pointing at `link`.
    pub fn symlink_target(&self, rel: &str, link: &str) {
        let path = self.target_path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        symlink(link, path).unwrap();
    }

    /// Assert that the target file `rel` holds exactly `content`.
    ///
    /// # Panics
    /// Panics if the file cannot be read or differs.
    pub fn assert_file(&self, rel: &str, content: &str) {
        let path = self.target_path(rel);
        let actual = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Could not read {}: {e}", path.display()));
        assert_eq!(actual, content, "Unexpected content in {}", path.display());
    }

    /// Assert the permission bits of target `rel`, without following
    /// symlinks.
    pub fn assert_mode(&self, rel: &str, mode: u32) {
        let path = self.target_path(rel);
        let metadata = fs::symlink_metadata(&path)
            .unwrap_or_else(|e| panic!("Could not stat {}: {e}", path.display()));
        assert_eq!(
            metadata.permissions().mode() & 0o7777,
            mode,
            "Unexpected mode {:o} on {}",
            metadata.permissions().mode() & 0o7777,
            path.display()
        );
    }

    /// Assert that target `rel` is a symlink to `link`.
    pub fn assert_symlink(&self, rel: &str, link: &str) {
        let path = self.target_path(rel);
        let actual = fs::read_link(&path)
            .unwrap_or_else(|e| panic!("{} is not a symlink: {e}", path.display()));
        assert_eq!(actual, Path::new(link), "Unexpected link in {}", path.display());
    }

    /// Assert that target `rel` does not exist, not even as a dangling link.
    pub fn assert_missing(&self, rel: &str) {
        let path = self.target_path(rel);
        assert!(
            fs::symlink_metadata(&path).is_err(),
            "Expected {} NOT to exist",
            path.display()
        );
    }
}

fn write(path: &Path, content: &str, mode: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}
