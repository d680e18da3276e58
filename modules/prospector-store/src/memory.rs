//! In-memory `CandidateStore`. Commits build a copy of the whole state and
//! swap it in only on success, so a failed commit leaves nothing behind.
//! Fault injection hooks let tests fail a commit partway through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use prospector_common::{Candidate, DiscoveryRun, RunStats};

use crate::error::StoreError;
use crate::query::{CandidatePage, CandidateQuery};
use crate::CandidateStore;

#[derive(Debug, Clone, Default)]
struct State {
    candidates: HashMap<Uuid, Candidate>,
    runs: HashMap<Uuid, DiscoveryRun>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Fail the next commit after this many candidate writes.
    fail_commit_after: Option<usize>,
    unavailable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCandidateStore {
    state: Arc<RwLock<State>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit_run` fail after `writes` candidate upserts.
    pub fn fail_next_commit_after(&self, writes: usize) {
        self.faults_mut().fail_commit_after = Some(writes);
    }

    /// Make every operation fail with `StoreError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults_mut().unavailable = unavailable;
    }

    /// Snapshot of all stored candidates, sorted by id.
    pub fn candidates(&self) -> Vec<Candidate> {
        let mut all: Vec<_> = self.read().candidates.values().cloned().collect();
        all.sort_by_key(|c| c.id);
        all
    }

    pub fn runs(&self) -> Vec<DiscoveryRun> {
        let mut all: Vec<_> = self.read().runs.values().cloned().collect();
        all.sort_by_key(|r| (r.started_at, r.id));
        all
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn faults_mut(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.faults_mut().unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }
}

/// Apply one optimistic write to `state`.
fn apply(state: &mut State, candidate: &Candidate) -> Result<Candidate, StoreError> {
    let created_at = match state.candidates.get(&candidate.id) {
        Some(existing) => {
            if existing.content_hash() == candidate.content_hash() {
                return Ok(existing.clone());
            }
            if existing.version != candidate.version {
                return Err(StoreError::Conflict {
                    id: candidate.id,
                    expected: candidate.version,
                    found: existing.version,
                });
            }
            existing.created_at
        }
        None if candidate.version != 0 => {
            return Err(StoreError::Conflict {
                id: candidate.id,
                expected: candidate.version,
                found: 0,
            });
        }
        None => candidate.created_at,
    };

    if let Some(domain) = &candidate.domain {
        let taken = state
            .candidates
            .values()
            .any(|c| c.id != candidate.id && c.domain.as_deref() == Some(domain));
        if taken {
            return Err(StoreError::Constraint(format!(
                "domain {domain} already belongs to another candidate"
            )));
        }
    }

    let mut stored = candidate.clone();
    stored.version = candidate.version + 1;
    stored.created_at = created_at;
    state.candidates.insert(stored.id, stored.clone());
    Ok(stored)
}

#[async_trait]
impl CandidateStore for MemoryCandidateStore {
    async fn resolution_candidates(
        &self,
        domains: &[String],
        include_domainless: bool,
    ) -> Result<Vec<Candidate>, StoreError> {
        self.check_available()?;
        let state = self.read();
        let mut found: Vec<_> = state
            .candidates
            .values()
            .filter(|c| match &c.domain {
                Some(d) => domains.contains(d),
                None => include_domainless,
            })
            .cloned()
            .collect();
        found.sort_by_key(|c| c.id);
        Ok(found)
    }

    async fn upsert_candidate(&self, candidate: &Candidate) -> Result<Candidate, StoreError> {
        self.check_available()?;
        let mut state = self.write();
        apply(&mut state, candidate)
    }

    async fn record_run(&self, run: &DiscoveryRun) -> Result<(), StoreError> {
        self.check_available()?;
        self.write().runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn commit_run(
        &self,
        candidates: &[Candidate],
        run: &DiscoveryRun,
    ) -> Result<Vec<Candidate>, StoreError> {
        self.check_available()?;
        let fail_after = self.faults_mut().fail_commit_after.take();

        let mut state = self.write();
        let mut staged = state.clone();
        let mut stored = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            if fail_after == Some(i) {
                return Err(StoreError::Injected(format!("commit aborted after {i} writes")));
            }
            stored.push(apply(&mut staged, candidate)?);
        }
        if fail_after.is_some_and(|n| n >= candidates.len()) {
            return Err(StoreError::Injected("commit aborted before run record".into()));
        }
        staged.runs.insert(run.id, run.clone());

        *state = staged;
        Ok(stored)
    }

    async fn query_candidates(&self, query: &CandidateQuery) -> Result<CandidatePage, StoreError> {
        self.check_available()?;
        let state = self.read();
        let mut hits: Vec<&Candidate> = state.candidates.values().filter(|c| query.matches(c)).collect();
        hits.sort_by(|a, b| query.compare(a, b));

        let total = hits.len() as u64;
        let page = hits
            .into_iter()
            .skip(query.offset as usize)
            .take(query.effective_limit() as usize)
            .cloned()
            .collect();
        Ok(CandidatePage::new(page, total, query))
    }

    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>, StoreError> {
        self.check_available()?;
        Ok(self.read().candidates.get(&id).cloned())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<DiscoveryRun>, StoreError> {
        self.check_available()?;
        Ok(self.read().runs.get(&id).cloned())
    }

    async fn run_stats(&self, since: DateTime<Utc>) -> Result<RunStats, StoreError> {
        self.check_available()?;
        let state = self.read();
        let runs = state.runs.values().filter(|r| r.finished_at >= since);
        Ok(RunStats::from_runs(Some(since), runs))
    }

    async fn prune_runs(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut state = self.write();
        let before = state.runs.len();
        state.runs.retain(|_, r| r.finished_at >= older_than);
        Ok((before - state.runs.len()) as u64)
    }
}
