use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::memory::MemoryState;
use crate::{Error, PersistentState, Result};

/// State format version for forward compatibility
const FORMAT_VERSION: &str = "1";

/// On-disk shape: hex-encoded buckets, keys and values.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    version: String,
    #[serde(default)]
    buckets: BTreeMap<String, BTreeMap<String, String>>,
}

/// A durable store persisted as a TOML file.
///
/// Changes are serialized through an exclusive lock on a sidecar
/// `<file>.lock` that is never replaced. Under the lock the document is
/// re-read, changed and written back with [`dot_fs::io::write_atomic`], so
/// concurrent writers never drop each other's records and a crash leaves
/// either the old or the new document. A document that cannot be decoded
/// is rejected and never repaired.
#[derive(Debug)]
pub struct FileState {
    path: PathBuf,
    lock_path: PathBuf,
    entries: MemoryState,
}

impl FileState {
    /// Open the store at `path`. A missing file is an empty store, and is
    /// not created until the first change.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the file exists but is not a valid
    /// state document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let lock_path = sidecar(&path);
        // Documents only ever appear whole, so reading needs no lock
        let entries = load(&path)?;
        tracing::debug!(path = %path.display(), keys = entries.len(), "opened state");
        Ok(Self {
            path,
            lock_path,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file whose lock serializes writers.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// A snapshot of every record.
    pub fn entries(&self) -> &MemoryState {
        &self.entries
    }

    /// Apply `change` to the latest durable document under the writer lock.
    /// `change` returns whether it modified anything; unchanged documents
    /// are not rewritten.
    fn update(&mut self, change: impl FnOnce(&mut MemoryState) -> Result<bool>) -> Result<()> {
        let lock = self.lock_exclusive()?;

        self.entries = load(&self.path)?;
        if change(&mut self.entries)? {
            let content = toml::to_string_pretty(&encode(&self.entries))?;
            dot_fs::io::write_atomic(&self.path, content.as_bytes())?;
            tracing::debug!(path = %self.path.display(), keys = self.entries.len(), "saved state");
        }

        FileExt::unlock(&lock).map_err(|_| Error::LockFailed {
            path: self.lock_path.clone(),
        })
    }

    /// Blocks while another process holds the lock.
    fn lock_exclusive(&self) -> Result<File> {
        if let Some(parent) = self.lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| Error::io(&self.lock_path, e))?;
        FileExt::lock_exclusive(&file).map_err(|_| Error::LockFailed {
            path: self.lock_path.clone(),
        })?;
        Ok(file)
    }
}

fn sidecar(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

fn load(path: &Path) -> Result<MemoryState> {
    match fs::read_to_string(path) {
        Ok(content) => decode(path, &content),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(MemoryState::new()),
        Err(e) => Err(Error::io(path, e)),
    }
}

impl PersistentState for FileState {
    fn get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.entries.get(bucket, key)
    }

    fn set(&mut self, bucket: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        self.update(|entries| {
            let changed = entries.get(bucket, key)?.as_deref() != Some(value);
            entries.set(bucket, key, value)?;
            Ok(changed)
        })
    }

    fn delete(&mut self, bucket: &[u8], key: &[u8]) -> Result<()> {
        self.update(|entries| {
            if entries.get(bucket, key)?.is_none() {
                return Ok(false);
            }
            entries.delete(bucket, key)?;
            Ok(true)
        })
    }
}

fn encode(entries: &MemoryState) -> StateDocument {
    let mut buckets: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for (bucket, key, value) in entries.iter() {
        buckets
            .entry(hex::encode(bucket))
            .or_default()
            .insert(hex::encode(key), hex::encode(value));
    }
    StateDocument {
        version: FORMAT_VERSION.to_string(),
        buckets,
    }
}

fn decode(path: &Path, content: &str) -> Result<MemoryState> {
    // Saves never leave a partial file, so an empty one was not written by us
    if content.trim().is_empty() {
        return Err(Error::corrupt(path, "empty document"));
    }

    let document: StateDocument =
        toml::from_str(content).map_err(|e| Error::corrupt(path, e.to_string()))?;
    if document.version != FORMAT_VERSION {
        return Err(Error::corrupt(
            path,
            format!("unsupported version {:?}", document.version),
        ));
    }

    let unhex = |field: &str, value: &str| {
        hex::decode(value).map_err(|e| Error::corrupt(path, format!("invalid {field} {value:?}: {e}")))
    };

    let mut entries = MemoryState::new();
    for (bucket, records) in &document.buckets {
        let bucket = unhex("bucket", bucket)?;
        for (key, value) in records {
            entries.set(&bucket, &unhex("key", key)?, &unhex("value", value)?)?;
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn saves_leave_only_document_and_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.toml");

        let mut state = FileState::open(&path).unwrap();
        state.set(b"script-runs", b"install.sh", b"sha256:abc").unwrap();
        state.set(b"script-runs", b"setup.sh", b"sha256:def").unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, ["state.toml", "state.toml.lock"]);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("version = \"1\""));
        assert!(raw.contains(&hex::encode(b"script-runs")));
    }

    #[test]
    fn lock_file_is_stable_across_saves() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempdir().unwrap();
        let mut state = FileState::open(dir.path().join("state.toml")).unwrap();

        state.set(b"b", b"k", b"1").unwrap();
        let first = fs::metadata(state.lock_path()).unwrap().ino();
        state.set(b"b", b"k", b"2").unwrap();
        let second = fs::metadata(state.lock_path()).unwrap().ino();

        assert_eq!(first, second);
    }

    #[test]
    fn unchanged_set_does_not_rewrite() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("state.toml");
        let mut state = FileState::open(&path).unwrap();

        state.set(b"b", b"k", b"v").unwrap();
        let before = fs::metadata(&path).unwrap().ino();
        state.set(b"b", b"k", b"v").unwrap();
        state.delete(b"b", b"missing").unwrap();

        assert_eq!(fs::metadata(&path).unwrap().ino(), before);
    }

    #[test]
    fn document_round_trips_binary_values() {
        let mut entries = MemoryState::new();
        entries.set(&[0, 255], &[1, 2, 3], &[0xde, 0xad]).unwrap();

        let text = toml::to_string(&encode(&entries)).unwrap();
        let decoded = decode(Path::new("state.toml"), &text).unwrap();

        assert_eq!(decoded, entries);
    }

    #[test]
    fn empty_document_is_corrupt() {
        let err = decode(Path::new("state.toml"), "\n").unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }), "{err}");
    }
}
