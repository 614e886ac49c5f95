//! Per-project run locks.
//!
//! Concurrent runs for the same project are disallowed; runs for different
//! projects are fully independent. The table is an explicit object passed by
//! reference to the scheduler, with mutation confined to `acquire` and the
//! guard's `Drop`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use ensemble_state::ProjectId;

use crate::error::CollabError;

/// Process-wide table of projects with a run in flight.
#[derive(Debug, Default)]
pub struct RunLockTable {
    active: Mutex<HashSet<Uuid>>,
}

impl RunLockTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire the exclusive run lock for `project_id`.
    ///
    /// Fails with [`CollabError::ProjectBusy`] when a run is already in
    /// progress; the lock is released when the returned guard drops.
    pub fn acquire(
        self: &Arc<Self>,
        project_id: ProjectId,
    ) -> Result<RunGuard, CollabError> {
        let mut active = self.active.lock().unwrap();
        if !active.insert(project_id.0) {
            return Err(CollabError::ProjectBusy { project_id });
        }
        Ok(RunGuard {
            table: Arc::clone(self),
            project_id,
        })
    }

    /// Whether a run is currently in flight for `project_id`.
    pub fn is_locked(&self, project_id: &ProjectId) -> bool {
        self.active.lock().unwrap().contains(&project_id.0)
    }
}

/// RAII guard for one project's run lock.
#[derive(Debug)]
pub struct RunGuard {
    table: Arc<RunLockTable>,
    project_id: ProjectId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.table
            .active
            .lock()
            .unwrap()
            .remove(&self.project_id.0);
    }
}
