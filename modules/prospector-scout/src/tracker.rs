//! Single-active-run lock and run summary assembly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;
use uuid::Uuid;

use prospector_common::{RunStatus, RunSummary, SourceId, SourceReport};

use crate::error::RunError;

/// Candidate-side counts a run accumulates after the fetch phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTally {
    pub records_merged: u64,
    pub created: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub rescored: u32,
    pub high_potential: u32,
    pub below_authenticity_floor: u32,
    pub candidate_ids: BTreeSet<Uuid>,
}

/// Owns the exclusive run lock. Cloning shares the same lock, so every
/// clone sees the same active run.
#[derive(Debug, Clone, Default)]
pub struct RunTracker {
    lock: Arc<Mutex<()>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the lock for a new run. Fails immediately rather than queueing
    /// behind an active run.
    pub fn try_start(&self) -> Result<RunGuard, RunError> {
        let held = self.lock.clone().try_lock_owned().map_err(|_| {
            warn!("Discovery run requested while another is in progress");
            RunError::AlreadyRunning
        })?;
        Ok(RunGuard {
            _held: held,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// An active run. Dropping the guard releases the lock on every exit path.
#[derive(Debug)]
pub struct RunGuard {
    _held: OwnedMutexGuard<()>,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl RunGuard {
    /// Assemble the run's externally visible result. Status follows the
    /// source outcomes; the caller flips it to failed if persistence fails.
    pub fn summarize(
        &self,
        sources: BTreeMap<SourceId, SourceReport>,
        tally: RunTally,
        error: Option<String>,
    ) -> RunSummary {
        let status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::from_sources(sources.values())
        };
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            status,
            persisted: false,
            records_fetched: sources.values().map(|r| r.records).sum(),
            sources,
            records_merged: tally.records_merged,
            candidates_created: tally.created,
            candidates_updated: tally.updated,
            candidates_unchanged: tally.unchanged,
            candidates_rescored: tally.rescored,
            high_potential: tally.high_potential,
            below_authenticity_floor: tally.below_authenticity_floor,
            candidate_ids: tally.candidate_ids,
            error,
        }
    }
}

/// Mark a summary as failed with `cause`, keeping its counts for reporting.
/// None of the run's candidate writes landed, so it links no candidates.
pub fn mark_failed(summary: &mut RunSummary, cause: impl ToString) {
    summary.status = RunStatus::Failed;
    summary.persisted = false;
    summary.candidate_ids.clear();
    summary.finished_at = Utc::now();
    summary.error = Some(cause.to_string());
}
