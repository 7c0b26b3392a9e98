use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigInvalid(String),

    #[error("Server '{0}' not found in configuration")]
    ServerNotFound(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Unsupported database type '{0}' (expected 'postgres' or 'mongo')")]
    UnsupportedDatabaseKind(String),

    #[error("Backup file not found: {}", .0.display())]
    BackupNotFound(PathBuf),

    #[error("Remote command `{command}` failed with status {status}: {stderr}")]
    RemoteCommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Transfer from {from} to {to} failed: {reason}")]
    TransferFailed {
        from: String,
        to: String,
        reason: String,
    },

    #[error("{failed} entities failed, see log for details")]
    BatchIncomplete { failed: usize },
}

/// Finds the first `AppError` anywhere in an error chain.
pub fn classify(err: &anyhow::Error) -> Option<&AppError> {
    err.chain().find_map(|cause| cause.downcast_ref::<AppError>())
}
