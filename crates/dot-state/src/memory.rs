use std::collections::BTreeMap;

use crate::{PersistentState, Result};

type Buckets = BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, Vec<u8>>>;

/// In-memory state; nothing survives the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    buckets: Buckets,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over `(bucket, key, value)` in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8], &[u8])> {
        self.buckets.iter().flat_map(|(bucket, entries)| {
            entries
                .iter()
                .map(move |(key, value)| (bucket.as_slice(), key.as_slice(), value.as_slice()))
        })
    }
}

impl PersistentState for MemoryState {
    fn get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .buckets
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn set(&mut self, bucket: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        self.buckets
            .entry(bucket.to_vec())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, bucket: &[u8], key: &[u8]) -> Result<()> {
        if let Some(entries) = self.buckets.get_mut(bucket) {
            entries.remove(key);
            if entries.is_empty() {
                self.buckets.remove(bucket);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_are_independent_namespaces() {
        let mut state = MemoryState::new();
        state.set(b"a", b"key", b"1").unwrap();
        state.set(b"b", b"key", b"2").unwrap();

        assert_eq!(state.get(b"a", b"key").unwrap(), Some(b"1".to_vec()));
        assert_eq!(state.get(b"b", b"key").unwrap(), Some(b"2".to_vec()));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn delete_missing_key_is_ok() {
        let mut state = MemoryState::new();
        state.delete(b"nope", b"nothing").unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn delete_drops_empty_bucket() {
        let mut state = MemoryState::new();
        state.set(b"a", b"k", b"v").unwrap();
        state.delete(b"a", b"k").unwrap();
        assert_eq!(state.iter().count(), 0);
    }
}
