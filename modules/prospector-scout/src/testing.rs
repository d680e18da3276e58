// Test doubles for the discovery pipeline.
//
// - ScriptedSource (SourceAdapter): replays a fixed script per fetch attempt
// - record / config builders for RawRecord and DiscoveryConfig
//
// The in-memory store lives in prospector-store (MemoryCandidateStore).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};

use prospector_common::config::{DiscoveryConfig, OrchestratorConfig, ResolverConfig};
use prospector_common::{RawRecord, RecordEvidence, SourceId};

use crate::source::{Fetch, SkipCounter, SourceAdapter, SourceError};

// ---------------------------------------------------------------------------
// ScriptedSource
// ---------------------------------------------------------------------------

/// One step of a scripted fetch attempt.
#[derive(Debug, Clone)]
pub enum Step {
    /// Yield a record.
    Yield(RawRecord),
    /// Skip a malformed item (bumps the skip counter).
    Skip,
    /// Fail the attempt mid-stream with this error.
    Fail(SourceError),
    /// Pause before the next step.
    Sleep(Duration),
    /// Never make progress again.
    Hang,
}

/// Adapter that replays one script per `fetch` call. Once the scripts run
/// out, the last one repeats.
pub struct ScriptedSource {
    id: SourceId,
    scripts: Mutex<VecDeque<Vec<Step>>>,
    last: Mutex<Vec<Step>>,
    calls: AtomicU32,
}

impl ScriptedSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: SourceId::from(id),
            scripts: Mutex::new(VecDeque::new()),
            last: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Source that yields `records` on every attempt.
    pub fn with_records(id: &str, records: Vec<RawRecord>) -> Self {
        Self::new(id).attempt(records.into_iter().map(Step::Yield).collect())
    }

    /// Source whose every attempt fails with `error`.
    pub fn failing(id: &str, error: SourceError) -> Self {
        Self::new(id).attempt(vec![Step::Fail(error)])
    }

    pub fn attempt(self, steps: Vec<Step>) -> Self {
        self.lock_scripts().push_back(steps);
        self
    }

    /// Number of `fetch` calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock_scripts(&self) -> std::sync::MutexGuard<'_, VecDeque<Vec<Step>>> {
        self.scripts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_script(&self) -> Vec<Step> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(script) = self.lock_scripts().pop_front() {
            *last = script;
        }
        last.clone()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<Fetch, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let skipped = SkipCounter::default();
        let state = (self.next_script().into_iter(), skipped.clone(), false);

        let records = stream::unfold(state, |(mut steps, skipped, done)| async move {
            if done {
                return None;
            }
            loop {
                match steps.next()? {
                    Step::Yield(record) => return Some((Ok(record), (steps, skipped, false))),
                    Step::Fail(e) => return Some((Err(e), (steps, skipped, true))),
                    Step::Skip => skipped.incr(),
                    Step::Sleep(d) => tokio::time::sleep(d).await,
                    Step::Hang => std::future::pending::<()>().await,
                }
            }
        })
        .boxed();
        Ok(Fetch::new(records, skipped))
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Fixed fetch time for deterministic tests.
pub fn fetched_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Minimal record: a name, an optional website, nothing else.
pub fn record(source: &str, name: &str, url: Option<&str>) -> RawRecord {
    RawRecord {
        source: SourceId::from(source),
        external_id: format!("{source}:{name}"),
        fetched_at: fetched_at(),
        name: name.to_string(),
        url: url.map(String::from),
        location: None,
        employee_count: None,
        funding_stage: None,
        evidence: RecordEvidence::default(),
        payload: serde_json::json!({ "source": source, "name": name }),
    }
}

/// A Seattle Series A healthcare ML company with strong evidence on every
/// sub-signal. Scores roughly 8.7 authenticity and 10 fit with default config.
pub fn strong_record(source: &str, name: &str, url: &str) -> RawRecord {
    let mut r = record(source, name, Some(url));
    r.location = Some("Seattle, WA".into());
    r.employee_count = Some("11-50".into());
    r.funding_stage = Some("Series A".into());
    r.evidence = RecordEvidence {
        description: Some("Machine learning for clinical diagnostics in healthcare".into()),
        keywords: vec!["Healthcare".into(), "Machine Learning".into()],
        blog_posts: vec![
            "Our model training stack: a neural network with feature engineering and \
             hyperparameter tuning. Model evaluation tracks precision and recall and training \
             loss; we cut inference latency before model deployment. Optimized with gradient \
             descent. ```python\nmodel.fit(x)\n```"
                .into(),
        ],
        job_titles: vec![
            "Machine Learning Engineer".into(),
            "ML Engineer".into(),
            "Research Scientist".into(),
        ],
        repositories: vec![prospector_common::RepoSummary {
            name: "clinical-model".into(),
            description: Some("PyTorch training pipeline".into()),
            language: Some("Python".into()),
        }],
        marketing_copy: Some(
            "Our proprietary model achieves 94% accuracy on peer-reviewed benchmarks".into(),
        ),
        healthcare: Some(true),
        funding_events: Vec::new(),
    };
    r
}

/// Config with fast retries and short deadlines, sources registered in code.
pub fn test_config(trust_rank: &[&str]) -> DiscoveryConfig {
    DiscoveryConfig {
        resolver: ResolverConfig {
            trust_rank: trust_rank.iter().map(|s| SourceId::from(*s)).collect(),
            name_similarity_threshold: 0.92,
        },
        orchestrator: OrchestratorConfig {
            max_concurrency: 4,
            run_deadline_secs: 60,
            source_timeout_secs: 10,
            retry_attempts: 3,
            retry_base_ms: 100,
        },
        scoring: Default::default(),
        targets: Default::default(),
        sources: Vec::new(),
        retention: Default::default(),
    }
}
