//! Persistence gateway for discovery: candidates, runs and their atomic commit.

pub mod error;
pub mod memory;
pub mod migrate;
pub mod postgres;
pub mod query;

pub use error::StoreError;
pub use memory::MemoryCandidateStore;
pub use postgres::PgCandidateStore;
pub use query::{CandidatePage, CandidateQuery, SortKey};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use prospector_common::{Candidate, DiscoveryRun, RunStats};

/// Storage boundary for the discovery pipeline.
///
/// Writes use optimistic versioning: a candidate carries the version it was
/// read at, and the store rejects the write with [`StoreError::Conflict`] if
/// the stored row moved on. Writing content identical to what is stored is a
/// no-op that returns the stored row, so repeated upserts are idempotent.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Existing candidates a batch of records could resolve against: every
    /// candidate whose domain is in `domains`, plus all domainless candidates
    /// when `include_domainless` is set.
    async fn resolution_candidates(
        &self,
        domains: &[String],
        include_domainless: bool,
    ) -> Result<Vec<Candidate>, StoreError>;

    async fn upsert_candidate(&self, candidate: &Candidate) -> Result<Candidate, StoreError>;

    /// Insert or replace a run record on its own.
    async fn record_run(&self, run: &DiscoveryRun) -> Result<(), StoreError>;

    /// Upsert every candidate and record the run as one atomic unit. On error
    /// nothing from this call is visible.
    async fn commit_run(
        &self,
        candidates: &[Candidate],
        run: &DiscoveryRun,
    ) -> Result<Vec<Candidate>, StoreError>;

    async fn query_candidates(&self, query: &CandidateQuery) -> Result<CandidatePage, StoreError>;

    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>, StoreError>;

    async fn get_run(&self, id: Uuid) -> Result<Option<DiscoveryRun>, StoreError>;

    /// Counts and averages over runs that finished at or after `since`.
    async fn run_stats(&self, since: DateTime<Utc>) -> Result<RunStats, StoreError>;

    /// Delete runs that finished before `older_than`. Candidates are untouched.
    async fn prune_runs(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;
}
