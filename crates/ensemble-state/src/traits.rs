//! Storage trait definitions for Ensemble.
//!
//! [`ProjectStore`] is the single source of truth for project and task
//! state. It is async and backend-agnostic; an in-memory fake is provided
//! for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{ContributionEntry, Project, ProjectId, UserId};

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Durable project storage.
///
/// Guarantees:
/// - `save_project` replaces the whole record atomically: a subsequent load
///   observes either the entire updated project or the previous version,
///   never a partial write.
/// - `append_entry` is independent of whole-project saves, so a completed
///   contribution survives a later failed save.
/// - `load_project` enforces owner isolation: an owner mismatch is reported
///   as not-found.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Create and persist a new project. Fails with
    /// [`StorageError::InvalidProject`] when `name` is empty.
    async fn create_project(
        &self,
        owner: UserId,
        name: &str,
        description: &str,
    ) -> StorageResult<Project>;

    /// Load a project by id, scoped to `owner`.
    async fn load_project(&self, owner: UserId, project_id: &ProjectId)
        -> StorageResult<Project>;

    /// Atomically persist the full project state.
    async fn save_project(&self, project: &Project) -> StorageResult<()>;

    /// List all projects belonging to `owner`, in no guaranteed order.
    async fn list_projects(&self, owner: UserId) -> StorageResult<Vec<Project>>;

    /// Append one immutable contribution entry to the project's ledger.
    async fn append_entry(&self, entry: &ContributionEntry) -> StorageResult<()>;

    /// All ledger entries for a project, in append order.
    async fn entries_for(&self, project_id: &ProjectId) -> StorageResult<Vec<ContributionEntry>>;
}
