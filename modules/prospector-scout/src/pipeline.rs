//! fetch → resolve → score → persist, as one atomic discovery run.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use prospector_common::config::{DiscoveryConfig, RetentionConfig, ScoringConfig};
use prospector_common::{Candidate, DiscoveryRun, RawRecord, RunStats, RunSummary};
use prospector_store::{CandidatePage, CandidateQuery, CandidateStore, StoreError};

use crate::error::RunError;
use crate::orchestrator::{Harvest, Orchestrator};
use crate::resolver::{EntityResolver, ResolvedCandidate};
use crate::scoring::{signals, AuthenticityScorer, FitScorer};
use crate::source::SourceAdapter;
use crate::sources;
use crate::tracker::{mark_failed, RunGuard, RunTally, RunTracker};

/// Attempts at a write that lost an optimistic-version race. Each retry
/// re-reads the stored candidates and merges again.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Candidate writes for one commit, with the counts they produce.
struct Staged {
    writes: Vec<Candidate>,
    tally: RunTally,
}

pub struct Discovery {
    store: Arc<dyn CandidateStore>,
    orchestrator: Orchestrator,
    resolver: EntityResolver,
    authenticity: AuthenticityScorer,
    fit: FitScorer,
    scoring: ScoringConfig,
    retention: RetentionConfig,
    tracker: RunTracker,
}

impl Discovery {
    pub fn new(
        store: Arc<dyn CandidateStore>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        config: &DiscoveryConfig,
    ) -> Self {
        let scoring = config.scoring.clone();
        Self {
            store,
            orchestrator: Orchestrator::new(adapters, config.orchestrator.clone()),
            resolver: EntityResolver::new(&config.resolver),
            authenticity: AuthenticityScorer::new(scoring.authenticity, scoring.mode),
            fit: FitScorer::new(scoring.fit, scoring.mode, config.targets.clone()),
            scoring,
            retention: config.retention.clone(),
            tracker: RunTracker::new(),
        }
    }

    /// Build with the adapters registered in `config.sources`.
    pub fn from_config(store: Arc<dyn CandidateStore>, config: &DiscoveryConfig) -> Result<Self> {
        let adapters = sources::build_adapters(&config.sources)?;
        Ok(Self::new(store, adapters, config))
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    pub async fn run_discovery(&self) -> Result<RunSummary, RunError> {
        self.run_since(None).await
    }

    /// Run the full pipeline, asking sources for records newer than `since`.
    pub async fn run_since(&self, since: Option<DateTime<Utc>>) -> Result<RunSummary, RunError> {
        let guard = self.tracker.try_start()?;
        info!(
            run_id = %guard.run_id,
            sources = self.orchestrator.source_ids().len(),
            "Discovery run starting"
        );

        let harvest = self.orchestrator.harvest(since).await;
        let result = self.commit(&guard, harvest).await;

        match &result {
            Ok(summary) => {
                info!(
                    run_id = %summary.run_id,
                    status = %summary.status,
                    created = summary.candidates_created,
                    updated = summary.candidates_updated,
                    unchanged = summary.candidates_unchanged,
                    high_potential = summary.high_potential,
                    below_authenticity_floor = summary.below_authenticity_floor,
                    "Discovery run committed"
                );
                for report in summary.degraded_sources() {
                    warn!(
                        run_id = %summary.run_id,
                        source = %report.source,
                        outcome = ?report.outcome,
                        error = report.last_error.as_deref().unwrap_or_default(),
                        "Source did not complete"
                    );
                }
            }
            Err(e) => error!(run_id = %guard.run_id, error = %e, "Discovery run failed"),
        }
        result
    }

    async fn commit(&self, guard: &RunGuard, harvest: Harvest) -> Result<RunSummary, RunError> {
        let Harvest { records, reports } = harvest;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let staged = match self.stage(&records).await {
                Ok(staged) => staged,
                Err(e) => {
                    let summary = guard.summarize(reports, RunTally::default(), None);
                    return Err(self.fail(summary, e).await);
                }
            };

            let mut summary = guard.summarize(reports.clone(), staged.tally, None);
            summary.persisted = true;
            let run = DiscoveryRun::from(&summary);
            match self.store.commit_run(&staged.writes, &run).await {
                Ok(stored) => {
                    debug!(run_id = %summary.run_id, written = stored.len(), "Run commit applied");
                    return Ok(summary);
                }
                Err(StoreError::Conflict { id, .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(
                        run_id = %summary.run_id,
                        candidate_id = %id,
                        attempt,
                        "Candidate changed during run, merging again"
                    );
                }
                Err(e) => return Err(self.fail(summary, e).await),
            }
        }
    }

    /// Resolve the joined records against stored candidates and score every
    /// candidate they touch.
    async fn stage(&self, records: &[RawRecord]) -> Result<Staged, StoreError> {
        let (domains, domainless) = EntityResolver::lookup_keys(records);
        let existing = self.store.resolution_candidates(&domains, domainless).await?;
        let loaded = existing.len();

        let now = Utc::now();
        let resolution = self.resolver.resolve(existing, records.to_vec(), now);
        info!(
            records = records.len(),
            loaded,
            merged = resolution.merged,
            duplicates = resolution.duplicates,
            unresolvable = resolution.unresolvable,
            "Records resolved"
        );
        if resolution.unresolvable > 0 {
            warn!(count = resolution.unresolvable, "Records without name or domain skipped");
        }

        let mut tally = RunTally {
            records_merged: resolution.merged,
            ..Default::default()
        };
        let mut writes = Vec::new();
        for resolved in resolution.candidates {
            let ResolvedCandidate {
                mut candidate,
                is_new,
                changed,
                ..
            } = resolved;

            let rescored = self.apply_scores(&mut candidate);
            tally.candidate_ids.insert(candidate.id);
            if rescored {
                tally.rescored += 1;
            }
            if self.is_high_potential(&candidate) {
                tally.high_potential += 1;
            }
            if self.is_below_authenticity_floor(&candidate) {
                tally.below_authenticity_floor += 1;
            }

            if is_new {
                tally.created += 1;
            } else if changed || rescored {
                tally.updated += 1;
                candidate.updated_at = now;
            } else {
                tally.unchanged += 1;
                continue;
            }
            writes.push(candidate);
        }
        Ok(Staged { writes, tally })
    }

    /// Score `candidate` with the current config and write the scores back.
    /// Returns whether either score moved.
    fn apply_scores(&self, candidate: &mut Candidate) -> bool {
        let authenticity = self.authenticity.score(candidate);
        let fit = self.fit.score(candidate);
        debug!(
            candidate_id = %candidate.id,
            name = candidate.display_name(),
            authenticity = ?authenticity.score,
            fit = ?fit.score,
            substituted_authenticity = ?authenticity.substituted,
            substituted_fit = ?fit.substituted,
            "Candidate scored"
        );

        let moved =
            candidate.authenticity_score != authenticity.score || candidate.fit_score != fit.score;
        candidate.authenticity_score = authenticity.score;
        candidate.fit_score = fit.score;
        moved
    }

    fn is_high_potential(&self, c: &Candidate) -> bool {
        c.authenticity_score
            .is_some_and(|s| s >= self.scoring.high_potential_min_authenticity)
            && c.fit_score.is_some_and(|s| s >= self.scoring.high_potential_min_fit)
    }

    /// Scored, but not authentic enough to be a target. Unscored candidates
    /// are not counted.
    fn is_below_authenticity_floor(&self, c: &Candidate) -> bool {
        c.authenticity_score
            .is_some_and(|s| s < self.scoring.high_potential_min_authenticity)
    }

    /// Report the run as failed, recording it on a best-effort basis.
    async fn fail(&self, mut summary: RunSummary, cause: StoreError) -> RunError {
        mark_failed(&mut summary, &cause);
        if let Err(e) = self.store.record_run(&DiscoveryRun::from(&summary)).await {
            warn!(run_id = %summary.run_id, error = %e, "Failed to record failed run");
        }
        RunError::Persistence {
            summary: Box::new(summary),
            source: cause,
        }
    }

    pub async fn query_candidates(&self, query: &CandidateQuery) -> Result<CandidatePage, RunError> {
        Ok(self.store.query_candidates(query).await?)
    }

    /// Rescore a stored candidate with the current scoring config.
    pub async fn reanalyze(&self, id: Uuid) -> Result<Candidate, RunError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let stored = self
                .store
                .get_candidate(id)
                .await?
                .ok_or(RunError::NotFound(id))?;

            let mut candidate = stored.clone();
            candidate.healthcare_relevant = signals::healthcare_relevance(&candidate.evidence);
            self.apply_scores(&mut candidate);
            if candidate == stored {
                debug!(candidate_id = %id, "Re-analysis left candidate unchanged");
                return Ok(stored);
            }
            candidate.updated_at = Utc::now();

            match self.store.upsert_candidate(&candidate).await {
                Ok(saved) => {
                    info!(
                        candidate_id = %id,
                        authenticity = ?saved.authenticity_score,
                        fit = ?saved.fit_score,
                        "Candidate re-analyzed"
                    );
                    return Ok(saved);
                }
                Err(StoreError::Conflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(candidate_id = %id, attempt, "Candidate changed during re-analysis, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Aggregate statistics over runs that finished in the last `days` days.
    pub async fn run_stats(&self, days: u32) -> Result<RunStats, RunError> {
        let since = TimeDelta::try_days(i64::from(days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or(RunError::RetentionOutOfRange(i64::from(days)))?;
        Ok(self.store.run_stats(since).await?)
    }

    /// Delete run records older than the retention window.
    pub async fn prune(&self) -> Result<u64, RunError> {
        let days = self.retention.run_retention_days;
        if days < 1 {
            return Err(RunError::RetentionOutOfRange(days));
        }
        let cutoff = TimeDelta::try_days(days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or(RunError::RetentionOutOfRange(days))?;
        let removed = self.store.prune_runs(cutoff).await?;
        info!(removed, cutoff = %cutoff, "Old discovery runs pruned");
        Ok(removed)
    }
}
