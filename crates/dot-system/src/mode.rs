//! Git file modes

use std::fmt;

use dot_fs::{FileKind, Metadata};

/// The file modes git records in trees and patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    Empty,
    Dir,
    Regular,
    Executable,
    Symlink,
}

impl FileMode {
    /// Translate a filesystem object type and permission bits.
    ///
    /// Any execute bit makes a regular file [`FileMode::Executable`]. Returns
    /// `None` for object types git cannot represent.
    pub fn from_kind(kind: FileKind, perm: u32) -> Option<Self> {
        match kind {
            FileKind::Dir => Some(Self::Dir),
            FileKind::File if perm & 0o111 != 0 => Some(Self::Executable),
            FileKind::File => Some(Self::Regular),
            FileKind::Symlink => Some(Self::Symlink),
            FileKind::Other => None,
        }
    }

    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        Self::from_kind(metadata.kind(), metadata.perm())
    }

    /// The numeric mode as git writes it.
    pub fn bits(self) -> u32 {
        match self {
            Self::Empty => 0,
            Self::Dir => 0o040000,
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}", self.bits())
    }
}
