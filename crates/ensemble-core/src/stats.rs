//! Collaboration statistics derived from the contribution ledger.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use ensemble_state::{ContributionEntry, WorkerRole};

/// Aggregates for one worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerStats {
    pub contributions: usize,
    pub mean_confidence: f64,
    pub roles: BTreeSet<WorkerRole>,
}

/// Aggregates over a project's ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContributionStats {
    pub total_entries: usize,
    pub unique_workers: usize,
    pub per_worker: BTreeMap<String, WorkerStats>,
    /// Milliseconds between the first and last recorded entry.
    pub span_ms: i64,
}

impl ContributionStats {
    /// Compute statistics from ledger entries, in any order.
    pub fn from_entries(entries: &[ContributionEntry]) -> Self {
        let mut per_worker: BTreeMap<String, (usize, f64, BTreeSet<WorkerRole>)> = BTreeMap::new();
        for entry in entries {
            let slot = per_worker
                .entry(entry.worker_key.clone())
                .or_insert((0, 0.0, BTreeSet::new()));
            slot.0 += 1;
            slot.1 += entry.confidence;
            slot.2.insert(entry.role);
        }

        let span_ms = match (
            entries.iter().map(|e| e.recorded_at).min(),
            entries.iter().map(|e| e.recorded_at).max(),
        ) {
            (Some(first), Some(last)) => (last - first).num_milliseconds(),
            _ => 0,
        };

        let unique_workers = per_worker.len();
        ContributionStats {
            total_entries: entries.len(),
            unique_workers,
            per_worker: per_worker
                .into_iter()
                .map(|(key, (count, confidence_sum, roles))| {
                    (
                        key,
                        WorkerStats {
                            contributions: count,
                            mean_confidence: confidence_sum / count as f64,
                            roles,
                        },
                    )
                })
                .collect(),
            span_ms,
        }
    }
}
