//! In-memory fakes for storage traits (testing only)
//!
//! Provides [`MemoryProjectStore`], which satisfies the [`ProjectStore`]
//! contract without touching the filesystem.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::model::{ContributionEntry, Project, ProjectId, UserId};
use crate::traits::{ProjectStore, StorageResult};

/// In-memory project store backed by `HashMap`s.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: Mutex<HashMap<Uuid, Project>>,
    entries: Mutex<HashMap<Uuid, Vec<ContributionEntry>>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn create_project(
        &self,
        owner: UserId,
        name: &str,
        description: &str,
    ) -> StorageResult<Project> {
        if name.trim().is_empty() {
            return Err(StorageError::InvalidProject {
                reason: "name must not be empty".to_string(),
            });
        }
        let project = Project::new(owner, name.trim(), description);
        let mut projects = self.projects.lock().unwrap();
        projects.insert(project.project_id.0, project.clone());
        Ok(project)
    }

    async fn load_project(
        &self,
        owner: UserId,
        project_id: &ProjectId,
    ) -> StorageResult<Project> {
        let projects = self.projects.lock().unwrap();
        projects
            .get(&project_id.0)
            .filter(|p| p.owner == owner)
            .cloned()
            .ok_or_else(|| StorageError::ProjectNotFound {
                project_id: project_id.to_string(),
            })
    }

    async fn save_project(&self, project: &Project) -> StorageResult<()> {
        let mut projects = self.projects.lock().unwrap();
        projects.insert(project.project_id.0, project.clone());
        Ok(())
    }

    async fn list_projects(&self, owner: UserId) -> StorageResult<Vec<Project>> {
        let projects = self.projects.lock().unwrap();
        Ok(projects
            .values()
            .filter(|p| p.owner == owner)
            .cloned()
            .collect())
    }

    async fn append_entry(&self, entry: &ContributionEntry) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(entry.project_id.0)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn entries_for(&self, project_id: &ProjectId) -> StorageResult<Vec<ContributionEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(&project_id.0).cloned().unwrap_or_default())
    }
}
