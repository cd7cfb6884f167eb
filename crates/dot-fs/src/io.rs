//! Ordered and atomic write routines

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::vfs::Vfs;
use crate::{Error, NormalizedPath, Result};

/// Write `data` to `path` with exactly `perm`.
///
/// The file is truncated first, then its permissions are set, then the new
/// bytes are written. Old content is therefore never visible under the new
/// mode, and new content is never visible under the old mode. Unlike
/// `std::fs::write`, the permissions of an existing file are always reset.
pub fn write_file(fs: &dyn Vfs, path: &NormalizedPath, data: &[u8], perm: u32) -> Result<()> {
    let mut handle = fs.create_truncate(path, perm)?;
    let written = handle.chmod(perm).and_then(|()| handle.write_all(data));
    let closed = handle.close();
    match (written, closed) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Err(first), Err(second)) => Err(Error::combine(first, second)),
    }
}

/// Replace `dest` with a symlink to `old` without a window where `dest` is
/// missing.
///
/// The link is created under a unique name in `scratch_dir`, which must be on
/// the same device as `dest`, and renamed over `dest`.
pub fn replace_symlink(scratch_dir: &Path, old: &str, dest: &Path) -> Result<()> {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = scratch_dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    std::os::unix::fs::symlink(old, &temp_path).map_err(|e| Error::io(&temp_path, e))?;

    if let Err(e) = fs::rename(&temp_path, dest) {
        let primary = Error::io(dest, e);
        return match fs::remove_file(&temp_path) {
            Ok(()) => Err(primary),
            Err(cleanup) => Err(Error::combine(primary, Error::io(&temp_path, cleanup))),
        };
    }
    Ok(())
}

/// Replace the file at native `path` with `content` so that readers see
/// either the old or the new bytes, never a mix.
///
/// The content is written and synced under a unique name next to `path`,
/// then renamed over it. Missing parent directories are created.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let written = File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp_path, path));
    if let Err(e) = written {
        let primary = Error::io(path, e);
        return match fs::remove_file(&temp_path) {
            Ok(()) => Err(primary),
            Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => Err(primary),
            Err(cleanup) => Err(Error::combine(primary, Error::io(&temp_path, cleanup))),
        };
    }
    Ok(())
}
