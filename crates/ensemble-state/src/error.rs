//! Error types for ensemble-state.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Project does not exist, or exists under a different owner.
    ///
    /// Owner mismatch is deliberately indistinguishable from absence so a
    /// caller cannot probe for other users' project ids.
    #[error("project not found: {project_id}")]
    ProjectNotFound { project_id: String },

    /// Project record failed validation before write.
    #[error("invalid project: {reason}")]
    InvalidProject { reason: String },

    /// A record on disk could not be decoded.
    #[error("corrupt record at {path}: {detail}")]
    Corrupt { path: String, detail: String },

    /// Serialization failure.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
