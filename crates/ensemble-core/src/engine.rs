//! Top-level collaboration engine facade.
//!
//! Wires the project store, worker registry, decomposer, scheduler, and
//! synthesis together behind the normalized chat-transport contract: one
//! inbound `(user, project?, message)` tuple in, one synthesized response
//! out.

use std::sync::Arc;

use tracing::info;

use ensemble_state::{Project, ProjectId, ProjectStatus, ProjectStore, UserId};

use crate::error::{CollabError, Result};
use crate::graph::{self, Decomposer};
use crate::invoker::WorkerInvoker;
use crate::registry::WorkerRegistry;
use crate::scheduler::{CollaborationScheduler, RunLockTable, SchedulerPolicy};
use crate::stats::ContributionStats;
use crate::synthesis::{synthesize, SynthesisConfig, SynthesizedResponse};

/// Normalized inbound request from the chat-transport layer.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub user_id: UserId,
    /// `None` starts a fresh project named after the message.
    pub project_id: Option<ProjectId>,
    pub message: String,
}

/// The collaboration engine: everything between transport and providers.
pub struct Engine {
    store: Arc<dyn ProjectStore>,
    decomposer: Arc<dyn Decomposer>,
    scheduler: CollaborationScheduler,
    synthesis: SynthesisConfig,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ProjectStore>,
        registry: Arc<WorkerRegistry>,
        invoker: Arc<dyn WorkerInvoker>,
        decomposer: Arc<dyn Decomposer>,
        locks: Arc<RunLockTable>,
        policy: SchedulerPolicy,
        synthesis: SynthesisConfig,
    ) -> Self {
        let scheduler = CollaborationScheduler::new(
            Arc::clone(&store),
            registry,
            invoker,
            locks,
            policy,
        );
        Self {
            store,
            decomposer,
            scheduler,
            synthesis,
        }
    }

    /// Handle one user request end to end: create or load the project,
    /// build the task graph, run it, and synthesize the response.
    pub async fn handle(&self, request: InboundRequest) -> Result<SynthesizedResponse> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(CollabError::Validation(
                "message must not be empty".to_string(),
            ));
        }

        let mut project = match request.project_id {
            Some(id) => self.store.load_project(request.user_id, &id).await?,
            None => {
                let project = self
                    .store
                    .create_project(request.user_id, &derive_name(message), "")
                    .await?;
                info!(project_id = %project.project_id, "created project");
                project
            }
        };

        // A follow-up request reopens a completed project.
        if project.status == ProjectStatus::Completed {
            project.status = ProjectStatus::Active;
        }

        graph::build_graph(&mut project, message, self.decomposer.as_ref()).await?;
        self.store.save_project(&project).await?;

        let result = self
            .scheduler
            .run(request.user_id, project.project_id)
            .await?;
        info!(
            waves = result.waves_executed,
            done = result.done.len(),
            failed = result.failed.len(),
            blocked = result.blocked.len(),
            "collaboration run finished"
        );

        let mut project = self
            .store
            .load_project(request.user_id, &result.project_id)
            .await?;
        if project.status == ProjectStatus::Active && project.all_done() {
            project.status = ProjectStatus::Completed;
            project.touch();
            self.store.save_project(&project).await?;
        }

        let entries = self.store.entries_for(&project.project_id).await?;
        synthesize(&project, &entries, &self.synthesis)
    }

    /// All projects belonging to `user_id`.
    pub async fn projects(&self, user_id: UserId) -> Result<Vec<Project>> {
        Ok(self.store.list_projects(user_id).await?)
    }

    /// Load one project, enforcing ownership.
    pub async fn project(&self, user_id: UserId, project_id: &ProjectId) -> Result<Project> {
        Ok(self.store.load_project(user_id, project_id).await?)
    }

    /// Explicitly archive a project.
    pub async fn archive(&self, user_id: UserId, project_id: &ProjectId) -> Result<Project> {
        let mut project = self.store.load_project(user_id, project_id).await?;
        project.archive();
        self.store.save_project(&project).await?;
        Ok(project)
    }

    /// Ledger statistics for a project, enforcing ownership.
    pub async fn stats(
        &self,
        user_id: UserId,
        project_id: &ProjectId,
    ) -> Result<ContributionStats> {
        self.store.load_project(user_id, project_id).await?;
        let entries = self.store.entries_for(project_id).await?;
        Ok(ContributionStats::from_entries(&entries))
    }
}

/// A fresh project is named after the request that started it.
fn derive_name(message: &str) -> String {
    let name: String = message.chars().take(48).collect();
    name.trim().to_string()
}
