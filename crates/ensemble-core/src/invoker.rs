//! The worker invocation boundary.
//!
//! The engine treats a worker call as an opaque async capability returning
//! text plus a self-reported confidence score. The caller injects a
//! [`WorkerInvoker`] implementation; production wires this to provider HTTP
//! clients (outside core scope), tests and the CLI use [`CannedInvoker`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use ensemble_state::{Project, Task, TaskStatus, WorkerRole};

use crate::error::WorkerError;
use crate::registry::WorkerSpec;

/// One worker's reply to one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReply {
    pub text: String,
    /// Opaque self-reported confidence in `0.0..=1.0`.
    pub confidence: f64,
}

/// Opaque "invoke worker" capability.
#[async_trait]
pub trait WorkerInvoker: Send + Sync {
    async fn invoke(
        &self,
        worker: &WorkerSpec,
        prompt: &str,
        context: &str,
    ) -> std::result::Result<WorkerReply, WorkerError>;
}

/// Prompt rendering for task dispatch.
pub mod prompt {
    use super::*;

    /// Render the role-specific prompt for a task.
    pub fn task_prompt(task: &Task, worker: &WorkerSpec, context: &str) -> String {
        let system = worker
            .params
            .system_prompt
            .replace("{role}", &worker.role.to_string());
        format!(
            "{system}\n\n\
             Context:\n{context}\n\n\
             Task: {description}\n\n\
             As {name} ({role}), provide your expertise for this task.",
            description = task.description,
            name = worker.display_name,
            role = worker.role,
        )
    }

    /// Render project context: name, description, and the most recent
    /// completed results.
    pub fn project_context(project: &Project) -> String {
        let mut context = format!(
            "Project: {}\nDescription: {}\n",
            project.name, project.description
        );
        let recent: Vec<&Task> = project
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .collect();
        if !recent.is_empty() {
            context.push_str("Completed so far:\n");
            for task in recent.iter().rev().take(5).rev() {
                let result = task.result.as_deref().unwrap_or("");
                let snippet: String = result.chars().take(100).collect();
                context.push_str(&format!("- [{}] {}: {snippet}\n", task.role, task.description));
            }
        }
        context
    }
}

/// Deterministic offline invoker for tests and the CLI demo surface.
///
/// Replies with a canned per-role text (or a generated one echoing the
/// prompt) and can be scripted to fail the first N invocations of a given
/// worker, to exercise the retry path.
pub struct CannedInvoker {
    replies: HashMap<WorkerRole, WorkerReply>,
    fail_budget: Mutex<HashMap<String, u32>>,
    default_confidence: f64,
}

impl CannedInvoker {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            fail_budget: Mutex::new(HashMap::new()),
            default_confidence: 0.75,
        }
    }

    /// Fixed reply for every task routed to `role`.
    pub fn with_reply(
        mut self,
        role: WorkerRole,
        text: impl Into<String>,
        confidence: f64,
    ) -> Self {
        self.replies.insert(
            role,
            WorkerReply {
                text: text.into(),
                confidence,
            },
        );
        self
    }

    /// Fail the first `n` invocations of `worker_key` with a transport error.
    pub fn fail_first(self, worker_key: impl Into<String>, n: u32) -> Self {
        self.fail_budget
            .lock()
            .unwrap()
            .insert(worker_key.into(), n);
        self
    }
}

impl Default for CannedInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerInvoker for CannedInvoker {
    async fn invoke(
        &self,
        worker: &WorkerSpec,
        prompt: &str,
        _context: &str,
    ) -> std::result::Result<WorkerReply, WorkerError> {
        {
            let mut budget = self.fail_budget.lock().unwrap();
            if let Some(remaining) = budget.get_mut(&worker.worker_key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(WorkerError::Transport("injected failure".to_string()));
                }
            }
        }

        if let Some(reply) = self.replies.get(&worker.role) {
            return Ok(reply.clone());
        }

        let snippet: String = prompt.chars().take(80).collect();
        Ok(WorkerReply {
            text: format!("{} ({}): {snippet}", worker.display_name, worker.role),
            confidence: self.default_confidence,
        })
    }
}
