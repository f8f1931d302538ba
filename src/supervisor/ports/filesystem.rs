//! Filesystem port for registry, pid file and log access.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Result type for filesystem operations.
pub type FilesystemResult<T> = Result<T, FilesystemError>;

/// Text-file operations used by the supervisor.
///
/// A missing file is never an error: reads return `Ok(None)` and removals
/// return `Ok(false)`. Errors are reserved for an unusable environment and for
/// content that is not text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Reads the whole file as UTF-8 text, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`FilesystemError::NotText`] when the content is not UTF-8.
    async fn read_text(&self, path: &Utf8Path) -> FilesystemResult<Option<String>>;

    /// Replaces the file content, creating the parent directory if needed.
    async fn write_text(&self, path: &Utf8Path, contents: &str) -> FilesystemResult<()>;

    /// Removes the file, returning whether it existed.
    async fn remove(&self, path: &Utf8Path) -> FilesystemResult<bool>;
}

/// Errors returned by filesystem adapters.
#[derive(Debug, Clone, Error)]
pub enum FilesystemError {
    /// The path does not name a file inside a directory.
    #[error("invalid file path: {0}")]
    InvalidPath(Utf8PathBuf),

    /// The file exists but its content is not UTF-8 text.
    #[error("file {0} does not contain UTF-8 text")]
    NotText(Utf8PathBuf),

    /// The underlying filesystem operation failed.
    #[error("filesystem operation on {path} failed: {source}")]
    Io {
        /// Path the operation targeted.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        source: Arc<std::io::Error>,
    },
}

impl FilesystemError {
    /// Wraps an I/O failure for `path`.
    pub fn io(path: &Utf8Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.to_owned(),
            source: Arc::new(err),
        }
    }
}
