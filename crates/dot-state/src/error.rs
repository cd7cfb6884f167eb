//! Error types for dot-state

use std::path::PathBuf;

/// Result type for dot-state operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dot-state operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fs(#[from] dot_fs::Error),

    /// The durable document exists but cannot be decoded.
    #[error("Corrupt state file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed for {path}")]
    LockFailed { path: PathBuf },

    #[error("State store is read-only")]
    ReadOnly,
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }
}
