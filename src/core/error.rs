//! Defines the custom error type for the `core` module.

use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for the `core` module.
///
/// This enum encapsulates all possible errors that can occur during
/// core operations like directory walking, entry staging, and output rewriting.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Represents an I/O error, typically from file system operations.
    #[error("I/O error for path {1}: {0}")]
    Io(#[source] std::io::Error, PathBuf),

    /// Represents an error that occurred when a Tokio task was joined.
    /// This is often due to a task panicking or being cancelled.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Represents an error while compiling an ignore/exclude pattern.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Represents a source path that was expected to be a directory but was not.
    #[error("Source path is not a valid directory: {0}")]
    NotADirectory(PathBuf),

    /// The output file could not be prepared, even after retrying.
    #[error("Could not prepare output {path} after {attempts} attempts: {source}")]
    OutputUnavailable {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// The transpiler rejected a file or could not be invoked.
    #[error("Transpilation of {0} failed: {1}")]
    Transpile(PathBuf, String),
}

impl CoreError {
    /// Shorthand for wrapping an `io::Error` together with the path it concerns.
    pub fn io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CoreError::Io(err, path.into())
    }
}
