//! Worker definitions and the process-wide worker registry.
//!
//! The registry is populated at startup, passed by reference to the
//! components that need it, and mutated only through its methods —
//! availability toggles and the consecutive-failure policy.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use ensemble_state::WorkerRole;

use crate::error::{CollabError, Result, WorkerError};

/// Coarse cost/latency class, used for capability metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostClass {
    Economy,
    Standard,
    Premium,
}

/// Parameters handed to the invocation boundary alongside the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationParams {
    /// Provider-side model identifier.
    pub model: String,
    pub temperature: f32,
    /// System prompt template; `{role}` is substituted at render time.
    pub system_prompt: String,
}

impl Default for InvocationParams {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.7,
            system_prompt: "You are the {role} member of a collaborative team.".to_string(),
        }
    }
}

/// A registered AI worker.
///
/// Immutable after registration except for the availability flag, which the
/// scheduler's failure policy may flip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Unique key, e.g. `"general"`.
    pub worker_key: String,
    pub display_name: String,
    pub role: WorkerRole,
    pub params: InvocationParams,
    pub cost_class: CostClass,
    pub available: bool,
}

impl WorkerSpec {
    /// Create an available worker with default invocation parameters.
    pub fn new(
        worker_key: impl Into<String>,
        display_name: impl Into<String>,
        role: WorkerRole,
    ) -> Self {
        Self {
            worker_key: worker_key.into(),
            display_name: display_name.into(),
            role,
            params: InvocationParams::default(),
            cost_class: CostClass::Standard,
            available: true,
        }
    }

    pub fn with_params(mut self, params: InvocationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_cost_class(mut self, cost_class: CostClass) -> Self {
        self.cost_class = cost_class;
        self
    }
}

#[derive(Debug)]
struct WorkerSlot {
    spec: WorkerSpec,
    consecutive_failures: u32,
}

/// Process-wide registry of available workers.
///
/// Listing order is registration order, so test fixtures and role
/// resolution are deterministic.
#[derive(Debug)]
pub struct WorkerRegistry {
    slots: Mutex<Vec<WorkerSlot>>,
    /// Consecutive failures after which a worker is marked unavailable.
    failure_threshold: u32,
}

impl WorkerRegistry {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            failure_threshold,
        }
    }

    /// Register a worker, or explicitly replace one with the same key and
    /// role. Re-registering a key under a different role is rejected with
    /// [`CollabError::DuplicateWorker`] — silent role changes are how two
    /// configs clobber each other.
    pub fn register(&self, spec: WorkerSpec) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.iter_mut().find(|s| s.spec.worker_key == spec.worker_key) {
            if slot.spec.role != spec.role {
                return Err(CollabError::DuplicateWorker {
                    worker_key: spec.worker_key,
                });
            }
            slot.spec = spec;
            slot.consecutive_failures = 0;
            return Ok(());
        }
        slots.push(WorkerSlot {
            spec,
            consecutive_failures: 0,
        });
        Ok(())
    }

    /// Available workers in registration order, optionally filtered by role.
    pub fn list_available(&self, role_filter: Option<WorkerRole>) -> Vec<WorkerSpec> {
        let slots = self.slots.lock().unwrap();
        slots
            .iter()
            .filter(|s| s.spec.available)
            .filter(|s| role_filter.map_or(true, |r| s.spec.role == r))
            .map(|s| s.spec.clone())
            .collect()
    }

    /// Distinct roles with at least one available worker, in registration
    /// order of first appearance.
    pub fn available_roles(&self) -> Vec<WorkerRole> {
        let slots = self.slots.lock().unwrap();
        let mut roles = Vec::new();
        for slot in slots.iter().filter(|s| s.spec.available) {
            if !roles.contains(&slot.spec.role) {
                roles.push(slot.spec.role);
            }
        }
        roles
    }

    /// First available worker for `role`.
    pub fn resolve(&self, role: WorkerRole) -> std::result::Result<WorkerSpec, WorkerError> {
        let slots = self.slots.lock().unwrap();
        slots
            .iter()
            .find(|s| s.spec.available && s.spec.role == role)
            .map(|s| s.spec.clone())
            .ok_or(WorkerError::NoneAvailable { role })
    }

    /// Returns `true` if the worker was found.
    pub fn mark_unavailable(&self, worker_key: &str) -> bool {
        self.set_available(worker_key, false)
    }

    /// Returns `true` if the worker was found. Re-enabling also resets the
    /// failure counter.
    pub fn mark_available(&self, worker_key: &str) -> bool {
        let mut slots = self.slots.lock().unwrap();
        match slots.iter_mut().find(|s| s.spec.worker_key == worker_key) {
            Some(slot) => {
                slot.spec.available = true;
                slot.consecutive_failures = 0;
                true
            }
            None => false,
        }
    }

    fn set_available(&self, worker_key: &str, available: bool) -> bool {
        let mut slots = self.slots.lock().unwrap();
        match slots.iter_mut().find(|s| s.spec.worker_key == worker_key) {
            Some(slot) => {
                slot.spec.available = available;
                true
            }
            None => false,
        }
    }

    /// Record one failed invocation. Returns `true` when the consecutive
    /// failure count reached the threshold and the worker was taken out of
    /// rotation.
    pub fn record_failure(&self, worker_key: &str) -> bool {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.iter_mut().find(|s| s.spec.worker_key == worker_key) {
            slot.consecutive_failures += 1;
            if slot.consecutive_failures >= self.failure_threshold {
                slot.spec.available = false;
                return true;
            }
        }
        false
    }

    /// Reset the consecutive-failure counter after a successful invocation.
    pub fn record_success(&self, worker_key: &str) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.iter_mut().find(|s| s.spec.worker_key == worker_key) {
            slot.consecutive_failures = 0;
        }
    }
}
