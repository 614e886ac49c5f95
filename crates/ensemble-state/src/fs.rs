//! Filesystem-backed project store.
//!
//! Layout:
//! - `<root>/projects/<project_id>.json` — one record per project, replaced
//!   atomically (write to a temp file in the same directory, then rename).
//! - `<root>/ledger/<project_id>.jsonl` — append-only newline-delimited
//!   contribution entries, written independently of project saves.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::StorageError;
use crate::model::{ContributionEntry, Project, ProjectId, UserId};
use crate::traits::{ProjectStore, StorageResult};

/// Filesystem-backed [`ProjectStore`].
pub struct FsProjectStore {
    projects_dir: PathBuf,
    ledger_dir: PathBuf,
}

impl FsProjectStore {
    /// Create a store rooted at `root`. Creates the layout if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let projects_dir = root.as_ref().join("projects");
        let ledger_dir = root.as_ref().join("ledger");
        fs::create_dir_all(&projects_dir)?;
        fs::create_dir_all(&ledger_dir)?;
        Ok(Self {
            projects_dir,
            ledger_dir,
        })
    }

    fn project_path(&self, project_id: &ProjectId) -> PathBuf {
        self.projects_dir.join(format!("{project_id}.json"))
    }

    fn ledger_path(&self, project_id: &ProjectId) -> PathBuf {
        self.ledger_dir.join(format!("{project_id}.jsonl"))
    }

    fn read_project(&self, path: &Path) -> StorageResult<Project> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
            path: path.display().to_string(),
            detail: e.to_string(),
        })
    }

    fn write_project(&self, project: &Project) -> StorageResult<()> {
        let path = self.project_path(&project.project_id);
        let bytes = serde_json::to_vec_pretty(project)?;

        // Atomic replace: temp file in the target directory, then rename.
        let mut tmp = NamedTempFile::new_in(&self.projects_dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for FsProjectStore {
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
        self.write_project(&project)?;
        Ok(project)
    }

    async fn load_project(
        &self,
        owner: UserId,
        project_id: &ProjectId,
    ) -> StorageResult<Project> {
        let path = self.project_path(project_id);
        if !path.exists() {
            return Err(StorageError::ProjectNotFound {
                project_id: project_id.to_string(),
            });
        }
        let project = self.read_project(&path)?;
        if project.owner != owner {
            return Err(StorageError::ProjectNotFound {
                project_id: project_id.to_string(),
            });
        }
        Ok(project)
    }

    async fn save_project(&self, project: &Project) -> StorageResult<()> {
        self.write_project(project)
    }

    async fn list_projects(&self, owner: UserId) -> StorageResult<Vec<Project>> {
        let mut projects = Vec::new();
        for entry in fs::read_dir(&self.projects_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_project(&path) {
                Ok(project) if project.owner == owner => projects.push(project),
                Ok(_) => {}
                Err(e) => {
                    // A single unreadable record must not hide the rest.
                    warn!(path = %path.display(), error = %e, "skipping unreadable project record");
                }
            }
        }
        Ok(projects)
    }

    async fn append_entry(&self, entry: &ContributionEntry) -> StorageResult<()> {
        let path = self.ledger_path(&entry.project_id);
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&line)?;
        Ok(())
    }

    async fn entries_for(&self, project_id: &ProjectId) -> StorageResult<Vec<ContributionEntry>> {
        let path = self.ledger_path(project_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        let mut entries = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let entry =
                serde_json::from_str(line).map_err(|e| StorageError::Corrupt {
                    path: path.display().to_string(),
                    detail: e.to_string(),
                })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
