//! Confidence-weighted synthesis of worker contributions.
//!
//! Merging is deterministic and auditable: per role, the highest-confidence
//! ledger entry is the role's representative; representatives are stitched
//! together as role-labeled sections in a fixed priority order. No free-form
//! rewriting happens here.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use ensemble_state::{
    ContributionEntry, Project, ProjectId, ProjectStatus, TaskId, TaskStatus, WorkerRole,
};

use crate::error::{CollabError, Result};

/// Ordering of role sections in the synthesized response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisConfig {
    pub role_priority: Vec<WorkerRole>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            role_priority: WorkerRole::priority_order().to_vec(),
        }
    }
}

/// The final merged response, as handed to the chat-transport layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesizedResponse {
    pub project_id: ProjectId,
    pub text: String,
    /// Per-role confidence of the contributing entry, exposed for
    /// user-facing transparency.
    pub confidences: BTreeMap<WorkerRole, f64>,
    pub project_status: ProjectStatus,
}

/// Merge the ledger entries of the project's `Done` tasks into one response.
///
/// Per role the representative is the entry with strictly maximal
/// confidence; a tie is broken by earliest `recorded_at`. Fails with
/// [`CollabError::NoContributions`] when nothing usable completed.
pub fn synthesize(
    project: &Project,
    entries: &[ContributionEntry],
    config: &SynthesisConfig,
) -> Result<SynthesizedResponse> {
    let done_tasks: HashSet<TaskId> = project
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .map(|t| t.task_id)
        .collect();

    let mut representatives: HashMap<WorkerRole, &ContributionEntry> = HashMap::new();
    for entry in entries.iter().filter(|e| done_tasks.contains(&e.task_id)) {
        let replace = match representatives.get(&entry.role) {
            Some(best) => {
                entry.confidence > best.confidence
                    || (entry.confidence == best.confidence
                        && entry.recorded_at < best.recorded_at)
            }
            None => true,
        };
        if replace {
            representatives.insert(entry.role, entry);
        }
    }

    if representatives.is_empty() {
        return Err(CollabError::NoContributions {
            project_id: project.project_id,
        });
    }

    let mut sections = Vec::new();
    let mut confidences = BTreeMap::new();
    for role in ordered_roles(config) {
        if let Some(entry) = representatives.get(&role) {
            sections.push(format!(
                "## {} (confidence {:.2})\n{}",
                role.label(),
                entry.confidence,
                entry.output_text
            ));
            confidences.insert(role, entry.confidence);
        }
    }

    Ok(SynthesizedResponse {
        project_id: project.project_id,
        text: sections.join("\n\n"),
        confidences,
        project_status: project.status,
    })
}

/// Configured priority first, then any remaining roles in default order, so
/// a partial configuration still yields a total deterministic ordering.
fn ordered_roles(config: &SynthesisConfig) -> Vec<WorkerRole> {
    let mut roles = config.role_priority.clone();
    for role in WorkerRole::priority_order() {
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    roles
}
