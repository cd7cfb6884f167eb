//! Git blob object hashes

use std::fmt;

use sha1::{Digest, Sha1};

/// A git object id: SHA-1 over the object header and content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHash([u8; 20]);

impl ObjectHash {
    /// The "unknown" sentinel.
    pub const ZERO: ObjectHash = ObjectHash([0; 20]);

    /// Hash `content` as a blob: `sha1("blob <len>\0" + content)`.
    pub fn of_blob(content: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(format!("blob {}\0", content.len()).as_bytes());
        hasher.update(content);
        Self(hasher.finalize().into())
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl Default for ObjectHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
