//! Ensemble Core Library
//!
//! Coordinates multiple independent AI workers to jointly answer a user
//! request: a task-dependency graph is built per request, executed wave by
//! wave against the worker registry, and the recorded contributions are
//! synthesized into one role-sectioned response.
//!
//! # Module layout
//!
//! - [`registry`] — worker definitions and the process-wide registry
//! - [`invoker`] — the opaque "invoke worker" capability boundary
//! - [`graph`] — task graph validation, wave ordering, decomposition
//! - [`scheduler`] — wave-based concurrent execution with bounded retry
//! - [`synthesis`] — deterministic confidence-weighted merge
//! - [`engine`] — transport-facing facade
//! - [`stats`] — ledger statistics
//! - [`telemetry`] — tracing initialisation

pub mod engine;
pub mod error;
pub mod graph;
pub mod invoker;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod synthesis;
pub mod telemetry;

pub use ensemble_state::{
    ContributionEntry, Project, ProjectId, ProjectStats, ProjectStatus, Task, TaskId, TaskStatus,
    UserId, WorkerRole,
};

pub use engine::{Engine, InboundRequest};
pub use error::{CollabError, GraphError, Result, WorkerError};
pub use graph::{
    build_graph, topological_waves, validate, Decomposer, PlannerDecomposer, TemplateDecomposer,
};
pub use invoker::{CannedInvoker, WorkerInvoker, WorkerReply};
pub use registry::{CostClass, InvocationParams, WorkerRegistry, WorkerSpec};
pub use scheduler::{
    CollaborationResult, CollaborationScheduler, RunLockTable, SchedulerPolicy,
};
pub use stats::{ContributionStats, WorkerStats};
pub use synthesis::{synthesize, SynthesisConfig, SynthesizedResponse};
pub use telemetry::init_tracing;

/// Ensemble version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
