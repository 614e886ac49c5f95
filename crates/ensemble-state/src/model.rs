//! Persisted collaboration model: projects, tasks, ledger entries.
//!
//! These records define the durable state layout owned by the
//! [`ProjectStore`](crate::ProjectStore). Everything here is plain data with
//! serde derives; execution logic lives in `ensemble-core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner identity, as delivered by the chat-transport layer.
pub type UserId = i64;

/// Unique identifier for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    /// Generate a new random ProjectId.
    pub fn new() -> Self {
        ProjectId(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ProjectId(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for a task within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId.
    pub fn new() -> Self {
        TaskId(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The five worker role archetypes in a collaboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    General,
    Research,
    Specialist,
    Code,
    Creative,
}

impl WorkerRole {
    /// Default ordering of role sections in a synthesized response.
    pub fn priority_order() -> [WorkerRole; 5] {
        [
            WorkerRole::General,
            WorkerRole::Research,
            WorkerRole::Specialist,
            WorkerRole::Code,
            WorkerRole::Creative,
        ]
    }

    /// Human-readable section label.
    pub fn label(&self) -> &'static str {
        match self {
            WorkerRole::General => "General",
            WorkerRole::Research => "Research",
            WorkerRole::Specialist => "Specialist",
            WorkerRole::Code => "Code",
            WorkerRole::Creative => "Creative",
        }
    }
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerRole::General => "general",
            WorkerRole::Research => "research",
            WorkerRole::Specialist => "specialist",
            WorkerRole::Code => "code",
            WorkerRole::Creative => "creative",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WorkerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(WorkerRole::General),
            "research" => Ok(WorkerRole::Research),
            "specialist" => Ok(WorkerRole::Specialist),
            "code" => Ok(WorkerRole::Code),
            "creative" => Ok(WorkerRole::Creative),
            other => Err(format!("unknown worker role: {other}")),
        }
    }
}

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Completed,
    Archived,
}

/// Status of a task.
///
/// `Blocked` is terminal and distinct from `Failed`: a blocked task never
/// ran because a dependency failed permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies.
    Pending,
    /// All dependencies done; eligible for dispatch.
    Ready,
    /// Dispatched to a worker.
    Running,
    /// Completed with a result and confidence.
    Done,
    /// Own execution failed permanently (retries exhausted).
    Failed,
    /// A dependency failed permanently; never dispatched.
    Blocked,
}

impl TaskStatus {
    /// `true` for states a task can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed | TaskStatus::Blocked)
    }
}

/// A unit of work assigned to a worker role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique within the owning project.
    pub task_id: TaskId,

    /// What this task asks the worker to do.
    pub description: String,

    /// Role the task is routed to; the registry resolves a concrete worker.
    pub role: WorkerRole,

    /// Current status.
    pub status: TaskStatus,

    /// Tasks that must be `Done` before this one may run.
    pub depends_on: Vec<TaskId>,

    /// Worker output, set when the task reaches `Done`.
    pub result: Option<String>,

    /// Confidence score in `0.0..=1.0`; set if and only if status is `Done`.
    pub confidence: Option<f64>,

    /// Invocation attempts consumed so far (first try included).
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(
        description: impl Into<String>,
        role: WorkerRole,
        depends_on: Vec<TaskId>,
    ) -> Self {
        Self {
            task_id: TaskId::new(),
            description: description.into(),
            role,
            status: TaskStatus::Pending,
            depends_on,
            result: None,
            confidence: None,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// All dependencies done; eligible for dispatch.
    pub fn mark_ready(&mut self) {
        self.status = TaskStatus::Ready;
    }

    /// Dispatched to a worker. Stamps `started_at` on the first dispatch
    /// only; `attempts` is maintained by the scheduler.
    pub fn mark_started(&mut self) {
        self.status = TaskStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Record a successful completion. Confidence is clamped to `0.0..=1.0`.
    pub fn mark_done(&mut self, result: impl Into<String>, confidence: f64) {
        self.status = TaskStatus::Done;
        self.result = Some(result.into());
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self.completed_at = Some(Utc::now());
    }

    /// Retries exhausted; terminal.
    pub fn mark_failed(&mut self) {
        self.status = TaskStatus::Failed;
        self.confidence = None;
        self.completed_at = Some(Utc::now());
    }

    /// A dependency failed permanently; terminal without ever running.
    pub fn mark_blocked(&mut self) {
        self.status = TaskStatus::Blocked;
        self.confidence = None;
        self.completed_at = Some(Utc::now());
    }

    /// `true` once the task can never change status again.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Computed per-project statistics, derived on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectStats {
    pub total_tasks: usize,
    pub done_tasks: usize,
    pub failed_tasks: usize,
    pub blocked_tasks: usize,
    /// `done / total` in percent; 0 for an empty task list.
    pub completion_rate: f64,
}

/// A durable, owner-scoped collaboration project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub project_id: ProjectId,

    /// Creating user; projects are never shared across users.
    pub owner: UserId,

    pub name: String,
    pub description: String,

    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,

    pub status: ProjectStatus,

    /// Task list in creation order. Creation order is the tie-break for
    /// deterministic wave ordering, so it must be preserved.
    pub tasks: Vec<Task>,
}

impl Project {
    /// Create a new active project. Name validation happens in the store.
    pub fn new(owner: UserId, name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            project_id: ProjectId::new(),
            owner,
            name: name.into(),
            description: description.into(),
            created_at: now,
            last_active_at: now,
            status: ProjectStatus::Active,
            tasks: Vec::new(),
        }
    }

    /// Look up a task by id.
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == *task_id)
    }

    /// Look up a task by id, mutably.
    pub fn task_mut(&mut self, task_id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.task_id == *task_id)
    }

    /// Append newly decomposed tasks, preserving creation order.
    pub fn add_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks.extend(tasks);
        self.touch();
    }

    /// Bump the last-active timestamp.
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    /// Explicitly archive; inactivity-based archiving is an external policy.
    pub fn archive(&mut self) {
        self.status = ProjectStatus::Archived;
        self.touch();
    }

    /// `true` when every task has reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.tasks.iter().all(Task::is_terminal)
    }

    /// `true` when the task list is non-empty and every task is `Done`.
    pub fn all_done(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status == TaskStatus::Done)
    }

    /// Derive completion statistics from the current task list.
    pub fn stats(&self) -> ProjectStats {
        let total = self.tasks.len();
        let done = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .count();
        let failed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();
        let blocked = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Blocked)
            .count();
        ProjectStats {
            total_tasks: total,
            done_tasks: done,
            failed_tasks: failed,
            blocked_tasks: blocked,
            completion_rate: if total == 0 {
                0.0
            } else {
                done as f64 / total as f64 * 100.0
            },
        }
    }
}

/// One worker's recorded output for one task.
///
/// Entries are immutable once written; a correction is a new entry, never an
/// edit of an existing one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContributionEntry {
    pub project_id: ProjectId,
    pub task_id: TaskId,
    pub worker_key: String,
    pub role: WorkerRole,
    pub output_text: String,
    /// Opaque worker-reported confidence in `0.0..=1.0`.
    pub confidence: f64,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_serde_roundtrip() {
        let mut project = Project::new(42, "demo", "a demo project");
        project.add_tasks(vec![Task::new("analyze", WorkerRole::General, vec![])]);

        let json = serde_json::to_string(&project).expect("serialize");
        let back: Project = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(project, back);
    }

    #[test]
    fn test_task_confidence_set_only_on_done() {
        let mut task = Task::new("t", WorkerRole::Code, vec![]);
        assert!(task.confidence.is_none());

        task.mark_started();
        assert!(task.confidence.is_none());

        task.mark_done("output", 0.9);
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.confidence, Some(0.9));

        let mut failed = Task::new("t2", WorkerRole::Code, vec![]);
        failed.mark_started();
        failed.mark_failed();
        assert!(failed.confidence.is_none());
    }

    #[test]
    fn test_task_confidence_is_clamped() {
        let mut task = Task::new("t", WorkerRole::General, vec![]);
        task.mark_started();
        task.mark_done("out", 1.7);
        assert_eq!(task.confidence, Some(1.0));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Ready.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_started_at_stamped_once_across_retries() {
        let mut task = Task::new("t", WorkerRole::Research, vec![]);
        task.mark_started();
        let first = task.started_at;
        assert!(first.is_some());

        task.mark_started();
        assert_eq!(task.started_at, first);
    }

    #[test]
    fn test_project_stats() {
        let mut project = Project::new(1, "p", "");
        let mut a = Task::new("a", WorkerRole::General, vec![]);
        let mut b = Task::new("b", WorkerRole::Code, vec![]);
        let c = Task::new("c", WorkerRole::Creative, vec![]);
        a.mark_started();
        a.mark_done("ok", 0.8);
        b.mark_started();
        b.mark_failed();
        project.add_tasks(vec![a, b, c]);

        let stats = project.stats();
        assert_eq!(stats.total_tasks, 3);
        assert_eq!(stats.done_tasks, 1);
        assert_eq!(stats.failed_tasks, 1);
        assert_eq!(stats.blocked_tasks, 0);
        assert!((stats.completion_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_worker_role_parse_and_display() {
        for role in WorkerRole::priority_order() {
            let parsed: WorkerRole = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("pilot".parse::<WorkerRole>().is_err());
    }
}
