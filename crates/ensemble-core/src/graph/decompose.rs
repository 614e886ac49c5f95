//! Pluggable decomposition of a user request into tasks.
//!
//! The graph engine's contract is independent of where tasks come from:
//! whatever a [`Decomposer`] produces is re-validated before execution.
//! Implementations are selected by configuration, never by runtime type
//! inspection.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use ensemble_state::{Project, Task, TaskId, WorkerRole};

use crate::error::{CollabError, Result};
use crate::invoker::{prompt, WorkerInvoker};
use crate::registry::WorkerRegistry;

/// Capability interface: turn a request into a task list.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, project: &Project, request: &str) -> Result<Vec<Task>>;
}

/// Static decomposition: one analysis task per available worker role.
///
/// With `integrate` set, a closing task for the first available role is
/// added that depends on all the others, producing a two-wave graph.
pub struct TemplateDecomposer {
    registry: Arc<WorkerRegistry>,
    integrate: bool,
}

impl TemplateDecomposer {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            registry,
            integrate: false,
        }
    }

    pub fn with_integration(mut self) -> Self {
        self.integrate = true;
        self
    }
}

#[async_trait]
impl Decomposer for TemplateDecomposer {
    async fn decompose(&self, _project: &Project, request: &str) -> Result<Vec<Task>> {
        // Unavailable workers have no role here, so builds route around them.
        let roles = self.registry.available_roles();
        let mut tasks: Vec<Task> = roles
            .iter()
            .map(|role| {
                Task::new(
                    format!("Address from the {role} perspective: {request}"),
                    *role,
                    vec![],
                )
            })
            .collect();

        if self.integrate && tasks.len() > 1 {
            let deps: Vec<TaskId> = tasks.iter().map(|t| t.task_id).collect();
            tasks.push(Task::new(
                format!("Integrate all perspectives into a final recommendation: {request}"),
                roles[0],
                deps,
            ));
        }

        Ok(tasks)
    }
}

/// Planner-based decomposition: a planning worker proposes the task list.
///
/// The planner replies with a JSON array of
/// `{"description", "role", "depends_on": [indices]}`; indices resolve
/// within the same array. The graph engine re-validates the result, so a
/// malformed plan can never reach execution.
pub struct PlannerDecomposer {
    registry: Arc<WorkerRegistry>,
    invoker: Arc<dyn WorkerInvoker>,
    planner_role: WorkerRole,
}

impl PlannerDecomposer {
    pub fn new(registry: Arc<WorkerRegistry>, invoker: Arc<dyn WorkerInvoker>) -> Self {
        Self {
            registry,
            invoker,
            planner_role: WorkerRole::General,
        }
    }

    pub fn with_planner_role(mut self, role: WorkerRole) -> Self {
        self.planner_role = role;
        self
    }
}

#[async_trait]
impl Decomposer for PlannerDecomposer {
    async fn decompose(&self, project: &Project, request: &str) -> Result<Vec<Task>> {
        let planner = self.registry.resolve(self.planner_role)?;
        let plan_prompt = format!(
            "Decompose the following request into a JSON array of tasks. \
             Each element: {{\"description\": string, \"role\": one of \
             general|research|specialist|code|creative, \"depends_on\": \
             array of indices into this array}}. Reply with JSON only.\n\n\
             Request: {request}"
        );
        let context = prompt::project_context(project);
        let reply = self.invoker.invoke(&planner, &plan_prompt, &context).await?;
        parse_plan(&reply.text)
    }
}

#[derive(Debug, Deserialize)]
struct PlannedTask {
    description: String,
    role: WorkerRole,
    #[serde(default)]
    depends_on: Vec<usize>,
}

/// Parse a planner reply into tasks, tolerating prose around the JSON array.
pub(crate) fn parse_plan(text: &str) -> Result<Vec<Task>> {
    let start = text.find('[');
    let end = text.rfind(']');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => {
            return Err(CollabError::Validation(
                "planner reply contained no JSON array".to_string(),
            ))
        }
    };

    let planned: Vec<PlannedTask> = serde_json::from_str(json)
        .map_err(|e| CollabError::Validation(format!("planner plan did not parse: {e}")))?;

    // Allocate all ids up front so indices can point forward or backward.
    let ids: Vec<TaskId> = (0..planned.len()).map(|_| TaskId::new()).collect();

    planned
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let deps = p
                .depends_on
                .iter()
                .map(|&idx| {
                    if idx >= ids.len() {
                        Err(CollabError::Validation(format!(
                            "planned task {i} has out-of-range dependency index {idx}"
                        )))
                    } else {
                        Ok(ids[idx])
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            let mut task = Task::new(p.description, p.role, deps);
            task.task_id = ids[i];
            Ok(task)
        })
        .collect()
}
