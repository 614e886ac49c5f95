//! Error taxonomy for the collaboration engine.

use ensemble_state::{ProjectId, StorageError, TaskId, WorkerRole};

/// Transient failures at the worker invocation boundary.
///
/// The scheduler treats every variant uniformly: bounded retry with
/// exponential backoff, then permanent task failure.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker invocation timed out")]
    Timeout,

    #[error("worker rate-limited: {0}")]
    RateLimited(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("no available worker for role {role}")]
    NoneAvailable { role: WorkerRole },
}

/// Graph construction defects, surfaced before any execution starts.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("dependency cycle detected: {}", cycle_path(.cycle))]
    CycleDetected { cycle: Vec<TaskId> },

    #[error("task {task_id} depends on unknown task {missing}")]
    DanglingDependency { task_id: TaskId, missing: TaskId },

    #[error("decomposition produced no tasks")]
    EmptyDecomposition,
}

fn cycle_path(cycle: &[TaskId]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Top-level errors produced by the collaboration engine.
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("worker {worker_key} is already registered with a different role")]
    DuplicateWorker { worker_key: String },

    #[error("a run is already in progress for project {project_id}")]
    ProjectBusy { project_id: ProjectId },

    #[error("no usable contributions for project {project_id}")]
    NoContributions { project_id: ProjectId },

    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for collaboration operations.
pub type Result<T> = std::result::Result<T, CollabError>;
