//! Error types for dot-core

use dot_fs::NormalizedPath;

use crate::template::TemplateError;

/// Result type for dot-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while populating or applying a target state
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: NormalizedPath,
        #[source]
        source: dot_system::Error,
    },

    #[error("Failed to update {path}: {source}")]
    Write {
        path: NormalizedPath,
        #[source]
        source: dot_system::Error,
    },

    #[error("Script {name} failed: {source}")]
    Script {
        name: String,
        #[source]
        source: dot_system::Error,
    },

    #[error("{source}")]
    Template {
        /// Source name of the entry whose template failed.
        name: String,
        #[source]
        source: TemplateError,
    },

    #[error("Cannot describe change to {path}: {source}")]
    DiffEncoding {
        path: NormalizedPath,
        #[source]
        source: dot_system::Error,
    },

    #[error("{target_name} is produced by both {first} and {second}")]
    DuplicateTarget {
        target_name: String,
        first: String,
        second: String,
    },

    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<Error>),
}

impl Error {
    pub fn read(path: &NormalizedPath, source: dot_system::Error) -> Self {
        Self::Read {
            path: path.clone(),
            source,
        }
    }

    /// A failed mutation. Backends that cannot express the change produce
    /// [`Error::DiffEncoding`] instead of [`Error::Write`].
    pub fn write(path: &NormalizedPath, source: dot_system::Error) -> Self {
        match source {
            dot_system::Error::DiffEncoding { .. } => Self::DiffEncoding {
                path: path.clone(),
                source,
            },
            source => Self::Write {
                path: path.clone(),
                source,
            },
        }
    }

    /// Collapse a list of errors: none is `None`, one is itself.
    pub fn from_many(mut errors: Vec<Error>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }

    /// Whether this error stops an apply that is not keeping going.
    ///
    /// Unreadable targets and failed templates only affect their own entry.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Read { .. } | Self::Template { .. } => false,
            Self::Write { .. }
            | Self::Script { .. }
            | Self::DiffEncoding { .. }
            | Self::DuplicateTarget { .. } => true,
            Self::Multiple(errors) => errors.iter().any(Error::is_fatal),
        }
    }
}
