//! Process-table port for spawning, probing and terminating servers.

use crate::supervisor::domain::{ProcessId, ServerCommand};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for process control operations.
pub type ProcessControlResult<T> = Result<T, ProcessControlError>;

/// Everything needed to launch the supervised server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Command to run.
    pub command: ServerCommand,
    /// Working directory for the process.
    pub working_directory: Utf8PathBuf,
    /// File receiving standard output.
    pub stdout_log: Utf8PathBuf,
    /// File receiving standard error.
    pub stderr_log: Utf8PathBuf,
}

/// Process lifecycle contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Launches a detached server process and returns its identifier.
    async fn spawn(&self, request: &SpawnRequest) -> ProcessControlResult<ProcessId>;

    /// Reports whether the process is still running.
    async fn is_alive(&self, pid: ProcessId) -> ProcessControlResult<bool>;

    /// Asks the process to exit, waiting up to `grace` before killing it.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessControlError::NotFound`] when the process is already
    /// gone.
    async fn terminate(&self, pid: ProcessId, grace: Duration) -> ProcessControlResult<()>;
}

/// Errors returned by process control adapters.
#[derive(Debug, Clone, Error)]
pub enum ProcessControlError {
    /// The process does not exist.
    #[error("process {0} not found")]
    NotFound(ProcessId),

    /// The server command could not be launched.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that failed to launch.
        program: String,
        /// Underlying error.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Generic process-table failure.
    #[error("process control error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl ProcessControlError {
    /// Wraps a spawn failure for `program`.
    pub fn spawn(program: impl Into<String>, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Spawn {
            program: program.into(),
            source: Arc::new(err),
        }
    }

    /// Wraps a runtime error from the process adapter.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }
}
