//! Wave-based collaboration scheduling.
//!
//! The scheduler executes a project's task graph wave by wave: every task in
//! a wave is dispatched concurrently to its assigned worker, and the wave
//! boundary is a synchronization barrier — no task in wave N+1 starts before
//! every task in wave N reaches a terminal state. Project state is persisted
//! after each wave, so a process restart resumes from the last fully
//! persisted wave.

pub mod locks;
pub mod policy;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tracing::{info, instrument, warn};

use ensemble_state::{
    ContributionEntry, ProjectId, ProjectStore, Task, TaskId, TaskStatus, UserId,
};

use crate::error::{Result, WorkerError};
use crate::graph;
use crate::invoker::{prompt, WorkerInvoker};
use crate::registry::WorkerRegistry;

pub use locks::{RunGuard, RunLockTable};
pub use policy::SchedulerPolicy;

/// Outcome of one collaboration run.
///
/// Task ids are reported by their final status so the caller can tell the
/// user exactly which parts of the plan could not complete.
#[derive(Debug, Clone)]
pub struct CollaborationResult {
    pub project_id: ProjectId,
    /// Waves that dispatched at least one task this run.
    pub waves_executed: usize,
    pub done: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    pub blocked: Vec<TaskId>,
    /// The run stopped at a wave boundary due to cancellation.
    pub cancelled: bool,
}

#[derive(Debug)]
enum OutcomeKind {
    Done {
        text: String,
        confidence: f64,
        worker_key: String,
        duration_ms: u64,
    },
    Failed,
}

#[derive(Debug)]
struct TaskOutcome {
    task_id: TaskId,
    attempts: u32,
    kind: OutcomeKind,
}

/// Executes task graphs against the worker registry.
pub struct CollaborationScheduler {
    store: Arc<dyn ProjectStore>,
    registry: Arc<WorkerRegistry>,
    invoker: Arc<dyn WorkerInvoker>,
    locks: Arc<RunLockTable>,
    policy: SchedulerPolicy,
}

impl CollaborationScheduler {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        registry: Arc<WorkerRegistry>,
        invoker: Arc<dyn WorkerInvoker>,
        locks: Arc<RunLockTable>,
        policy: SchedulerPolicy,
    ) -> Self {
        Self {
            store,
            registry,
            invoker,
            locks,
            policy,
        }
    }

    /// Run the project's task graph to completion (or permanent failure).
    pub async fn run(&self, owner: UserId, project_id: ProjectId) -> Result<CollaborationResult> {
        self.run_with_cancel(owner, project_id, None).await
    }

    /// Like [`run`](Self::run), with a cooperative cancellation signal
    /// checked at each wave boundary. In-flight invocations in the current
    /// wave finish or time out; they are never hard-killed, so no ledger
    /// entry is ever half-recorded.
    #[instrument(skip(self, cancel), fields(project_id = %project_id))]
    pub async fn run_with_cancel(
        &self,
        owner: UserId,
        project_id: ProjectId,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<CollaborationResult> {
        let _guard = self.locks.acquire(project_id)?;

        let mut project = self.store.load_project(owner, &project_id).await?;
        let waves = graph::topological_waves(&project.tasks)?;

        let mut waves_executed = 0;
        let mut cancelled = false;

        for wave in waves {
            if let Some(rx) = &cancel {
                if *rx.borrow() {
                    info!("run cancelled at wave boundary");
                    cancelled = true;
                    break;
                }
            }

            let mut mutated = false;
            let mut to_dispatch: Vec<(Task, String)> = Vec::new();

            for task_id in &wave {
                let task = project.task(task_id).expect("wave ids come from the task list");
                if task.is_terminal() {
                    continue;
                }

                let dep_failed = task.depends_on.iter().any(|dep| {
                    matches!(
                        project.task(dep).map(|t| t.status),
                        Some(TaskStatus::Failed) | Some(TaskStatus::Blocked)
                    )
                });
                if dep_failed {
                    project.task_mut(task_id).unwrap().mark_blocked();
                    mutated = true;
                    continue;
                }

                // All dependencies are Done: earlier waves are terminal by
                // the barrier, and none of them failed.
                let context = prompt::project_context(&project);
                let task = project.task_mut(task_id).unwrap();
                task.mark_ready();
                task.mark_started();
                mutated = true;
                to_dispatch.push((task.clone(), context));
            }

            if !to_dispatch.is_empty() {
                waves_executed += 1;
                let outcomes = self.dispatch_wave(to_dispatch).await;
                for outcome in outcomes {
                    let Some(task) = project.task_mut(&outcome.task_id) else {
                        continue;
                    };
                    task.attempts = outcome.attempts;
                    match outcome.kind {
                        OutcomeKind::Done {
                            text,
                            confidence,
                            worker_key,
                            duration_ms,
                        } => {
                            task.mark_done(text.clone(), confidence);
                            let entry = ContributionEntry {
                                project_id,
                                task_id: outcome.task_id,
                                worker_key,
                                role: task.role,
                                output_text: text,
                                confidence: task.confidence.unwrap_or(confidence),
                                duration_ms,
                                recorded_at: task.completed_at.unwrap_or_else(Utc::now),
                            };
                            // Ledger first: a completed contribution must
                            // survive a later failed project save.
                            self.store.append_entry(&entry).await?;
                        }
                        OutcomeKind::Failed => task.mark_failed(),
                    }
                }
            }

            if mutated {
                project.touch();
                self.store.save_project(&project).await?;
            }
        }

        let collect = |status: TaskStatus| -> Vec<TaskId> {
            project
                .tasks
                .iter()
                .filter(|t| t.status == status)
                .map(|t| t.task_id)
                .collect()
        };

        Ok(CollaborationResult {
            project_id,
            waves_executed,
            done: collect(TaskStatus::Done),
            failed: collect(TaskStatus::Failed),
            blocked: collect(TaskStatus::Blocked),
            cancelled,
        })
    }

    /// Dispatch one wave concurrently and await the barrier.
    async fn dispatch_wave(&self, tasks: Vec<(Task, String)>) -> Vec<TaskOutcome> {
        let sem = Arc::new(Semaphore::new(self.policy.max_concurrent));
        let mut handles = Vec::new();

        for (task, context) in tasks {
            let sem = Arc::clone(&sem);
            let registry = Arc::clone(&self.registry);
            let invoker = Arc::clone(&self.invoker);
            let policy = self.policy.clone();
            let task_id = task.task_id;

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                execute_task(task, context, registry, invoker, policy).await
            });
            handles.push((task_id, handle));
        }

        let mut outcomes = Vec::new();
        for (task_id, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "dispatched task aborted");
                    outcomes.push(TaskOutcome {
                        task_id,
                        attempts: 0,
                        kind: OutcomeKind::Failed,
                    });
                }
            }
        }
        outcomes
    }
}

/// Execute one task: resolve a worker, invoke under a timeout, retry with
/// exponential backoff. Every [`WorkerError`] variant — including timeout
/// and no-worker-available — is handled uniformly as a retryable failure.
async fn execute_task(
    task: Task,
    context: String,
    registry: Arc<WorkerRegistry>,
    invoker: Arc<dyn WorkerInvoker>,
    policy: SchedulerPolicy,
) -> TaskOutcome {
    let started = Instant::now();
    let total_attempts = policy.max_retries + 1;
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let failure: WorkerError = match registry.resolve(task.role) {
            Ok(worker) => {
                let task_prompt = prompt::task_prompt(&task, &worker, &context);
                let outcome = tokio::time::timeout(
                    policy.invoke_timeout,
                    invoker.invoke(&worker, &task_prompt, &context),
                )
                .await;

                let err = match outcome {
                    Ok(Ok(reply)) => {
                        registry.record_success(&worker.worker_key);
                        return TaskOutcome {
                            task_id: task.task_id,
                            attempts,
                            kind: OutcomeKind::Done {
                                text: reply.text,
                                confidence: reply.confidence,
                                worker_key: worker.worker_key,
                                duration_ms: started.elapsed().as_millis() as u64,
                            },
                        };
                    }
                    Ok(Err(err)) => err,
                    Err(_) => WorkerError::Timeout,
                };

                if registry.record_failure(&worker.worker_key) {
                    warn!(
                        worker = %worker.worker_key,
                        "worker taken out of rotation after repeated failures"
                    );
                }
                err
            }
            Err(err) => err,
        };

        warn!(
            task_id = %task.task_id,
            attempt = attempts,
            error = %failure,
            "task invocation failed"
        );

        if attempts >= total_attempts {
            return TaskOutcome {
                task_id: task.task_id,
                attempts,
                kind: OutcomeKind::Failed,
            };
        }
        tokio::time::sleep(policy.backoff_for(attempts)).await;
    }
}
