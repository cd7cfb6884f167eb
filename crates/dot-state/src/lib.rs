//! Persistent bucket/key state for dotsync
//!
//! A [`PersistentState`] maps `(bucket, key)` to a value, all opaque byte
//! strings. Buckets are logical namespaces; the reconciliation engine uses
//! one of them to remember which scripts it has already run.
//!
//! # Stores
//!
//! - [`FileState`]: a durable TOML document, rewritten atomically on every
//!   change
//! - [`MemoryState`]: an in-process map for tests and previews
//! - [`ReadOnlyState`]: wraps another store and rejects all writes

pub mod error;
mod file;
mod memory;

pub use error::{Error, Result};
pub use file::FileState;
pub use memory::MemoryState;

/// Durable bucket/key storage.
pub trait PersistentState {
    /// The value stored under `(bucket, key)`, if any.
    fn get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `(bucket, key)`, replacing any previous value.
    fn set(&mut self, bucket: &[u8], key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `(bucket, key)`. Removing a missing key is not an error.
    fn delete(&mut self, bucket: &[u8], key: &[u8]) -> Result<()>;
}

impl<S: PersistentState + ?Sized> PersistentState for Box<S> {
    fn get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(bucket, key)
    }

    fn set(&mut self, bucket: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        (**self).set(bucket, key, value)
    }

    fn delete(&mut self, bucket: &[u8], key: &[u8]) -> Result<()> {
        (**self).delete(bucket, key)
    }
}

/// A store that answers reads from `inner` and refuses every write.
#[derive(Debug, Clone, Default)]
pub struct ReadOnlyState<S> {
    inner: S,
}

impl<S: PersistentState> ReadOnlyState<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: PersistentState> PersistentState for ReadOnlyState<S> {
    fn get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(bucket, key)
    }

    fn set(&mut self, _bucket: &[u8], _key: &[u8], _value: &[u8]) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn delete(&mut self, _bucket: &[u8], _key: &[u8]) -> Result<()> {
        Err(Error::ReadOnly)
    }
}
