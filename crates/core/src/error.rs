//! Error taxonomy shared by every core operation.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced to the caller at an operation boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// A source directory, backup folder or game entry does not exist.
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),

    /// A copy, delete, rename or write failed.
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        /// Short verb phrase describing what was attempted.
        action: &'static str,
        /// Path the operation was acting on.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Fetching the version marker or the replacement binary failed.
    #[error("network request failed: {0}")]
    Network(String),

    /// The rename or copy target already exists.
    #[error("{} already exists", .0.display())]
    NameCollision(PathBuf),

    /// A version string or snapshot name did not match the expected format.
    #[error("could not parse {0}")]
    Parse(String),

    /// Caller supplied an empty name, empty selection or unknown game.
    #[error("{0}")]
    InvalidInput(String),

    /// The catalog document could not be encoded or decoded.
    #[error("catalog document is malformed: {0}")]
    Catalog(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Whether the error is a missing path rather than a failed operation.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
