//! Error types for dot-fs

use std::io::ErrorKind;
use std::path::PathBuf;

/// Result type for dot-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dot-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config at {path}: {message}")]
    ConfigParse {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Invalid glob pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("{first}; additionally: {second}")]
    Combined {
        first: Box<Error>,
        second: Box<Error>,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build an I/O error of the given kind without an underlying OS error.
    pub fn kind(path: impl Into<PathBuf>, kind: ErrorKind, message: &str) -> Self {
        Self::io(path, std::io::Error::new(kind, message.to_string()))
    }

    /// Combine a primary failure with a failure from a later cleanup step.
    pub fn combine(first: Error, second: Error) -> Self {
        Self::Combined {
            first: Box::new(first),
            second: Box::new(second),
        }
    }

    /// The underlying I/O error kind, if this is a plain I/O failure.
    pub fn io_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// True when the path did not exist.
    pub fn is_not_found(&self) -> bool {
        self.io_kind() == Some(ErrorKind::NotFound)
    }
}
