//! Error types for dot-system

use std::process::ExitStatus;

/// Result type for dot-system operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dot-system operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fs(#[from] dot_fs::Error),

    #[error(transparent)]
    State(#[from] dot_state::Error),

    /// A script ran and exited unsuccessfully.
    #[error("Script {name} failed: {status}")]
    Script { name: String, status: ExitStatus },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command {program} failed ({status}): {stderr}")]
    Command {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    /// The operation has no representation in git's patch format.
    #[error("Cannot encode {path} as a git diff: {message}")]
    DiffEncoding { path: String, message: String },

    #[error("Failed to write patch output: {0}")]
    Output(#[source] std::io::Error),

    #[error("{}", join_messages(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    /// Merge a primary failure with a cleanup failure.
    pub fn combine(first: Error, second: Error) -> Self {
        let mut errors = match first {
            Self::Multiple(errors) => errors,
            other => vec![other],
        };
        match second {
            Self::Multiple(more) => errors.extend(more),
            other => errors.push(other),
        }
        Self::Multiple(errors)
    }

    /// True when the error means the path did not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Fs(e) => e.is_not_found(),
            _ => false,
        }
    }
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
