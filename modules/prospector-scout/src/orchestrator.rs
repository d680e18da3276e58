//! Concurrent multi-source fetch.
//!
//! Every adapter runs as its own unit of work: per-attempt timeout, retry with
//! exponential backoff on transient failures, and cooperative cancellation at
//! the global run deadline. Units share nothing; their results are joined
//! before anything downstream sees a record.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use prospector_common::config::OrchestratorConfig;
use prospector_common::{RawRecord, SourceId, SourceOutcome, SourceReport};

use crate::source::{SourceAdapter, SourceError};

/// Everything the fetch phase produced, joined across sources.
#[derive(Debug, Default)]
pub struct Harvest {
    pub records: Vec<RawRecord>,
    pub reports: BTreeMap<SourceId, SourceReport>,
}

impl Harvest {
    pub fn records_from(&self, source: &SourceId) -> usize {
        self.records.iter().filter(|r| &r.source == source).count()
    }
}

enum Attempt {
    Completed,
    Exhausted(String),
    Failed(SourceError),
    Cancelled,
}

/// Records and counters one unit accumulates across its attempts.
#[derive(Default)]
struct UnitBuffer {
    records: Vec<RawRecord>,
    fingerprints: HashSet<String>,
    /// Highest skip count seen in a single attempt. Retries re-read the same
    /// items, so counts are not summed.
    skipped: u64,
}

impl UnitBuffer {
    fn push(&mut self, source: &SourceId, mut record: RawRecord) {
        record.source = source.clone();
        if self.fingerprints.insert(record.fingerprint()) {
            self.records.push(record);
        }
    }
}

pub struct Orchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    policy: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, policy: OrchestratorConfig) -> Self {
        Self { adapters, policy }
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.adapters.iter().map(|a| a.id().clone()).collect()
    }

    /// Run every adapter and wait for all of them to finish, give up, or be
    /// cancelled at the run deadline.
    pub async fn harvest(&self, since: Option<DateTime<Utc>>) -> Harvest {
        let deadline = CancellationToken::new();
        let watchdog = {
            let deadline = deadline.clone();
            let after = self.policy.run_deadline();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                warn!(deadline_secs = after.as_secs(), "Run deadline reached, cancelling sources");
                deadline.cancel();
            })
        };

        info!(
            sources = self.adapters.len(),
            max_concurrency = self.policy.max_concurrency,
            "Starting source fetch"
        );
        let results: Vec<(Vec<RawRecord>, SourceReport)> =
            stream::iter(self.adapters.iter().map(|adapter| {
                let cancel = deadline.child_token();
                async move { self.run_unit(adapter.as_ref(), since, cancel).await }
            }))
            .buffer_unordered(self.policy.max_concurrency.max(1))
            .collect()
            .await;
        watchdog.abort();

        let mut harvest = Harvest::default();
        for (records, report) in results {
            harvest.records.extend(records);
            harvest.reports.insert(report.source.clone(), report);
        }
        harvest
    }

    async fn run_unit(
        &self,
        adapter: &dyn SourceAdapter,
        since: Option<DateTime<Utc>>,
        cancel: CancellationToken,
    ) -> (Vec<RawRecord>, SourceReport) {
        let source = adapter.id().clone();
        let started = Instant::now();
        let mut buffer = UnitBuffer::default();
        let mut attempts = 0u32;
        let mut errors = 0u32;
        let mut last_error = None;

        let outcome = loop {
            if cancel.is_cancelled() {
                errors += 1;
                last_error = Some(deadline_error().to_string());
                break SourceOutcome::Cancelled;
            }
            attempts += 1;

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => Attempt::Cancelled,
                result = tokio::time::timeout(
                    self.policy.source_timeout(),
                    attempt_once(adapter, since, &mut buffer),
                ) => result.unwrap_or_else(|_| {
                    Attempt::Failed(SourceError::Unavailable(format!(
                        "timed out after {}s",
                        self.policy.source_timeout().as_secs()
                    )))
                }),
            };

            match attempt {
                Attempt::Completed => break SourceOutcome::Completed,
                Attempt::Exhausted(reason) => {
                    info!(source = %source, reason = reason.as_str(), "Source exhausted");
                    break SourceOutcome::Exhausted;
                }
                Attempt::Cancelled => {
                    errors += 1;
                    last_error = Some(deadline_error().to_string());
                    break SourceOutcome::Cancelled;
                }
                Attempt::Failed(err) => {
                    errors += 1;
                    last_error = Some(err.to_string());
                    if !err.is_retryable() || attempts >= self.policy.retry_attempts {
                        warn!(
                            source = %source,
                            attempts,
                            retryable = err.is_retryable(),
                            error = %err,
                            "Source degraded, no retries left"
                        );
                        break SourceOutcome::Degraded;
                    }

                    let backoff = self.backoff(attempts - 1, err.retry_after());
                    warn!(
                        source = %source,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Source attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            errors += 1;
                            last_error = Some(deadline_error().to_string());
                            break SourceOutcome::Cancelled;
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        };

        let report = SourceReport {
            source: source.clone(),
            outcome,
            records: buffer.records.len() as u64,
            skipped: buffer.skipped,
            attempts,
            errors,
            last_error,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        if buffer.skipped > 0 {
            warn!(source = %source, skipped = buffer.skipped, "Malformed records skipped");
        }
        info!(
            source = %source,
            outcome = ?report.outcome,
            records = report.records,
            attempts,
            "Source finished"
        );
        (buffer.records, report)
    }

    /// `base * 2^attempt` plus up to 25% jitter, never shorter than the
    /// source's retry-after hint.
    fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.policy.retry_base();
        let exp = base.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_cap = (base.as_millis() as u64 / 4).max(1);
        let jitter = Duration::from_millis(rand::rng().random_range(0..jitter_cap));
        exp.saturating_add(jitter).max(retry_after.unwrap_or_default())
    }
}

fn deadline_error() -> SourceError {
    SourceError::Unavailable("cancelled at run deadline".into())
}

/// One pass over the adapter. Records land in `buffer` as they arrive, so a
/// pass dropped mid-stream keeps what it already delivered.
async fn attempt_once(
    adapter: &dyn SourceAdapter,
    since: Option<DateTime<Utc>>,
    buffer: &mut UnitBuffer,
) -> Attempt {
    let fetch = match adapter.fetch(since).await {
        Ok(fetch) => fetch,
        Err(SourceError::Exhausted(reason)) => return Attempt::Exhausted(reason),
        Err(e) => return Attempt::Failed(e),
    };
    let skipped = fetch.skipped.clone();
    let mut records = fetch.records;

    let result = loop {
        match records.next().await {
            Some(Ok(record)) => buffer.push(adapter.id(), record),
            Some(Err(SourceError::Exhausted(reason))) => break Attempt::Exhausted(reason),
            Some(Err(e)) => break Attempt::Failed(e),
            None => break Attempt::Completed,
        }
        buffer.skipped = buffer.skipped.max(skipped.get());
    };
    buffer.skipped = buffer.skipped.max(skipped.get());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator(retry_base_ms: u64) -> Orchestrator {
        Orchestrator::new(
            Vec::new(),
            OrchestratorConfig {
                retry_base_ms,
                ..Default::default()
            },
        )
    }

    #[test]
    fn backoff_grows_exponentially() {
        let o = orchestrator(1_000);
        let first = o.backoff(0, None);
        let third = o.backoff(2, None);
        assert!(first >= Duration::from_millis(1_000) && first < Duration::from_millis(1_250));
        assert!(third >= Duration::from_millis(4_000) && third < Duration::from_millis(4_250));
    }

    #[test]
    fn backoff_honors_retry_after() {
        let o = orchestrator(100);
        let wait = o.backoff(0, Some(Duration::from_secs(60)));
        assert_eq!(wait, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn no_adapters_is_an_empty_harvest() {
        let harvest = orchestrator(100).harvest(None).await;
        assert!(harvest.records.is_empty());
        assert!(harvest.reports.is_empty());
    }
}
