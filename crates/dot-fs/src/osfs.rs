//! The live operating-system filesystem

use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::vfs::{DirEntry, FileKind, Metadata, Vfs, WriteHandle};
use crate::{Error, NormalizedPath, Result};

/// [`Vfs`] backed by `std::fs`.
///
/// An `OsFs` may be rooted at a directory, in which case every path is
/// resolved below that directory: `/etc/hosts` on an `OsFs` rooted at
/// `/tmp/x` is `/tmp/x/etc/hosts`. Rooted instances are still live.
#[derive(Debug, Clone, Default)]
pub struct OsFs {
    root: Option<PathBuf>,
}

impl OsFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// An `OsFs` whose `/` is `root`.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &NormalizedPath) -> PathBuf {
        match &self.root {
            None => path.to_native(),
            Some(root) => root.join(path.as_str().trim_start_matches('/')),
        }
    }

    fn unresolve(&self, native: &Path) -> NormalizedPath {
        match &self.root {
            None => NormalizedPath::new(native),
            Some(root) => {
                let relative = native.strip_prefix(root).unwrap_or(native);
                NormalizedPath::new(format!("/{}", relative.to_string_lossy()))
            }
        }
    }
}

fn to_metadata(metadata: &fs::Metadata) -> Metadata {
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Dir
    } else if file_type.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };
    Metadata::new(
        kind,
        metadata.permissions().mode(),
        metadata.dev(),
        metadata.len(),
    )
}

struct OsWriteHandle {
    file: File,
    path: PathBuf,
}

impl WriteHandle for OsWriteHandle {
    fn chmod(&mut self, perm: u32) -> Result<()> {
        self.file
            .set_permissions(Permissions::from_mode(perm))
            .map_err(|e| Error::io(&self.path, e))
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .map_err(|e| Error::io(&self.path, e))
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.file.flush().map_err(|e| Error::io(&self.path, e))
    }
}

impl Vfs for OsFs {
    fn is_live(&self) -> bool {
        true
    }

    fn path_separator(&self) -> char {
        std::path::MAIN_SEPARATOR
    }

    fn native_path(&self, path: &NormalizedPath) -> Option<PathBuf> {
        Some(self.resolve(path))
    }

    fn stat(&self, path: &NormalizedPath) -> Result<Metadata> {
        let native = self.resolve(path);
        fs::metadata(&native)
            .map(|m| to_metadata(&m))
            .map_err(|e| Error::io(native, e))
    }

    fn lstat(&self, path: &NormalizedPath) -> Result<Metadata> {
        let native = self.resolve(path);
        fs::symlink_metadata(&native)
            .map(|m| to_metadata(&m))
            .map_err(|e| Error::io(native, e))
    }

    fn read_dir(&self, path: &NormalizedPath) -> Result<Vec<DirEntry>> {
        let native = self.resolve(path);
        let mut entries = Vec::new();
        for entry in fs::read_dir(&native).map_err(|e| Error::io(&native, e))? {
            let entry = entry.map_err(|e| Error::io(&native, e))?;
            let entry_path = entry.path();
            let metadata =
                fs::symlink_metadata(&entry_path).map_err(|e| Error::io(&entry_path, e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                metadata: to_metadata(&metadata),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_file(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        let native = self.resolve(path);
        fs::read(&native).map_err(|e| Error::io(native, e))
    }

    fn read_link(&self, path: &NormalizedPath) -> Result<String> {
        let native = self.resolve(path);
        fs::read_link(&native)
            .map(|target| target.to_string_lossy().into_owned())
            .map_err(|e| Error::io(native, e))
    }

    fn create_truncate(
        &self,
        path: &NormalizedPath,
        perm: u32,
    ) -> Result<Box<dyn WriteHandle + '_>> {
        let native = self.resolve(path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(perm)
            .open(&native)
            .map_err(|e| Error::io(&native, e))?;
        Ok(Box::new(OsWriteHandle { file, path: native }))
    }

    fn mkdir(&self, path: &NormalizedPath, perm: u32) -> Result<()> {
        let native = self.resolve(path);
        DirBuilder::new()
            .mode(perm)
            .create(&native)
            .map_err(|e| Error::io(native, e))
    }

    fn chmod(&self, path: &NormalizedPath, perm: u32) -> Result<()> {
        let native = self.resolve(path);
        fs::set_permissions(&native, Permissions::from_mode(perm))
            .map_err(|e| Error::io(native, e))
    }

    fn symlink(&self, old: &str, new: &NormalizedPath) -> Result<()> {
        let native = self.resolve(new);
        std::os::unix::fs::symlink(old, &native).map_err(|e| Error::io(native, e))
    }

    fn rename(&self, old: &NormalizedPath, new: &NormalizedPath) -> Result<()> {
        let from = self.resolve(old);
        let to = self.resolve(new);
        fs::rename(&from, &to).map_err(|e| Error::io(from, e))
    }

    fn remove_all(&self, path: &NormalizedPath) -> Result<()> {
        let native = self.resolve(path);
        let metadata = match fs::symlink_metadata(&native) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::io(native, e)),
        };
        let result = if metadata.is_dir() {
            fs::remove_dir_all(&native)
        } else {
            fs::remove_file(&native)
        };
        result.map_err(|e| Error::io(native, e))
    }

    fn glob(&self, pattern: &str) -> Result<Vec<NormalizedPath>> {
        let native_pattern = match &self.root {
            None => pattern.to_string(),
            Some(root) => format!(
                "{}/{}",
                glob::Pattern::escape(&root.to_string_lossy()),
                pattern.trim_start_matches('/')
            ),
        };
        let paths = glob::glob(&native_pattern).map_err(|e| Error::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let mut matches = Vec::new();
        for entry in paths {
            let entry = entry.map_err(|e| Error::io(e.path().to_path_buf(), e.into_error()))?;
            matches.push(self.unresolve(&entry));
        }
        matches.sort();
        Ok(matches)
    }
}
