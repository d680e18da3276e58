use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::SourceId;

/// How a source's unit of work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    /// The sequence ran to its end.
    Completed,
    /// The adapter stopped at a safe hard limit (e.g. pagination cap).
    Exhausted,
    /// Retries ran out on unavailable / rate-limited failures.
    Degraded,
    /// Stopped at the global run deadline; buffered records were kept.
    Cancelled,
}

impl SourceOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, SourceOutcome::Completed | SourceOutcome::Exhausted)
    }
}

/// Per-source statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: SourceId,
    pub outcome: SourceOutcome,
    pub records: u64,
    pub skipped: u64,
    pub attempts: u32,
    pub errors: u32,
    pub last_error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(RunStatus::Succeeded),
            "partial" => Some(RunStatus::Partial),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    /// Fold per-source outcomes into a run status: every source healthy is a
    /// success, none healthy is a failure, anything in between is partial.
    pub fn from_sources<'a>(reports: impl IntoIterator<Item = &'a SourceReport>) -> Self {
        let (mut ok, mut bad) = (0usize, 0usize);
        for r in reports {
            if r.outcome.is_success() {
                ok += 1;
            } else {
                bad += 1;
            }
        }
        match (ok, bad) {
            (_, 0) => RunStatus::Succeeded,
            (0, _) => RunStatus::Failed,
            _ => RunStatus::Partial,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible result of a discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Whether the run's candidate writes were committed.
    pub persisted: bool,
    pub sources: BTreeMap<SourceId, SourceReport>,
    pub records_fetched: u64,
    pub records_merged: u64,
    pub candidates_created: u32,
    pub candidates_updated: u32,
    pub candidates_unchanged: u32,
    pub candidates_rescored: u32,
    pub high_potential: u32,
    /// Scored candidates whose authenticity fell below the high-potential
    /// minimum.
    pub below_authenticity_floor: u32,
    pub candidate_ids: BTreeSet<Uuid>,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn degraded_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.values().filter(|r| !r.outcome.is_success())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Discovery Run {} ===", self.run_id)?;
        writeln!(f, "Status:             {}", self.status)?;
        writeln!(f, "Persisted:          {}", self.persisted)?;
        writeln!(f, "Duration:           {:.1}s", self.duration_secs())?;
        writeln!(f, "Records fetched:    {}", self.records_fetched)?;
        writeln!(f, "Records merged:     {}", self.records_merged)?;
        writeln!(f, "Candidates created: {}", self.candidates_created)?;
        writeln!(f, "Candidates updated: {}", self.candidates_updated)?;
        writeln!(f, "Unchanged:          {}", self.candidates_unchanged)?;
        writeln!(f, "Rescored:           {}", self.candidates_rescored)?;
        writeln!(f, "High potential:     {}", self.high_potential)?;
        writeln!(f, "Below authenticity: {}", self.below_authenticity_floor)?;
        writeln!(f, "\nSources:")?;
        for r in self.sources.values() {
            write!(
                f,
                "  {:<16} {:?}: {} records, {} skipped, {} attempts, {} errors",
                r.source.as_str(),
                r.outcome,
                r.records,
                r.skipped,
                r.attempts,
                r.errors
            )?;
            match &r.last_error {
                Some(e) => writeln!(f, " ({e})")?,
                None => writeln!(f)?,
            }
        }
        let degraded: Vec<&str> = self.degraded_sources().map(|r| r.source.as_str()).collect();
        if !degraded.is_empty() {
            writeln!(f, "Not completed:      {}", degraded.join(", "))?;
        }
        if let Some(e) = &self.error {
            writeln!(f, "\nError: {e}")?;
        }
        Ok(())
    }
}

/// Persisted record of one pipeline execution. Holds candidate ids only;
/// pruning a run never touches candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub source_records: BTreeMap<SourceId, u64>,
    pub source_errors: BTreeMap<SourceId, u32>,
    pub sources: BTreeMap<SourceId, SourceReport>,
    pub candidate_ids: BTreeSet<Uuid>,
    pub candidates_created: u32,
    pub candidates_updated: u32,
    #[serde(default)]
    pub high_potential: u32,
    #[serde(default)]
    pub below_authenticity_floor: u32,
    pub error: Option<String>,
}

impl DiscoveryRun {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

impl From<&RunSummary> for DiscoveryRun {
    fn from(s: &RunSummary) -> Self {
        Self {
            id: s.run_id,
            started_at: s.started_at,
            finished_at: s.finished_at,
            status: s.status,
            source_records: s
                .sources
                .iter()
                .map(|(id, r)| (id.clone(), r.records))
                .collect(),
            source_errors: s
                .sources
                .iter()
                .map(|(id, r)| (id.clone(), r.errors))
                .collect(),
            sources: s.sources.clone(),
            candidate_ids: s.candidate_ids.clone(),
            candidates_created: s.candidates_created,
            candidates_updated: s.candidates_updated,
            high_potential: s.high_potential,
            below_authenticity_floor: s.below_authenticity_floor,
            error: s.error.clone(),
        }
    }
}

/// Aggregate over the runs recorded in a time window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub since: Option<DateTime<Utc>>,
    pub total_runs: u32,
    pub succeeded: u32,
    pub partial: u32,
    pub failed: u32,
    pub avg_created: f64,
    pub avg_updated: f64,
    pub avg_high_potential: f64,
    pub avg_below_authenticity_floor: f64,
    pub avg_duration_secs: f64,
}

impl RunStats {
    /// Fold runs into counts and per-run averages. Averages are zero when
    /// there are no runs.
    pub fn from_runs<'a>(since: Option<DateTime<Utc>>, runs: impl IntoIterator<Item = &'a DiscoveryRun>) -> Self {
        let mut stats = RunStats {
            since,
            ..Default::default()
        };
        let (mut created, mut updated, mut high, mut below, mut secs) = (0u64, 0u64, 0u64, 0u64, 0.0);
        for run in runs {
            stats.total_runs += 1;
            match run.status {
                RunStatus::Succeeded => stats.succeeded += 1,
                RunStatus::Partial => stats.partial += 1,
                RunStatus::Failed => stats.failed += 1,
            }
            created += run.candidates_created as u64;
            updated += run.candidates_updated as u64;
            high += run.high_potential as u64;
            below += run.below_authenticity_floor as u64;
            secs += run.duration_secs();
        }
        if stats.total_runs > 0 {
            let n = stats.total_runs as f64;
            stats.avg_created = created as f64 / n;
            stats.avg_updated = updated as f64 / n;
            stats.avg_high_potential = high as f64 / n;
            stats.avg_below_authenticity_floor = below as f64 / n;
            stats.avg_duration_secs = secs / n;
        }
        stats
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.since {
            Some(since) => writeln!(f, "\n=== Discovery Runs since {} ===", since.format("%Y-%m-%d"))?,
            None => writeln!(f, "\n=== Discovery Runs ===")?,
        }
        writeln!(f, "Runs:               {}", self.total_runs)?;
        writeln!(
            f,
            "Succeeded/partial/failed: {}/{}/{}",
            self.succeeded, self.partial, self.failed
        )?;
        writeln!(f, "Avg created:        {:.1}", self.avg_created)?;
        writeln!(f, "Avg updated:        {:.1}", self.avg_updated)?;
        writeln!(f, "Avg high potential: {:.1}", self.avg_high_potential)?;
        writeln!(f, "Avg below auth.:    {:.1}", self.avg_below_authenticity_floor)?;
        writeln!(f, "Avg duration:       {:.1}s", self.avg_duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: &str, outcome: SourceOutcome) -> SourceReport {
        SourceReport {
            source: SourceId::from(id),
            outcome,
            records: 0,
            skipped: 0,
            attempts: 1,
            errors: 0,
            last_error: None,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn status_folds_source_outcomes() {
        let all_ok = [
            report("a", SourceOutcome::Completed),
            report("b", SourceOutcome::Exhausted),
        ];
        assert_eq!(RunStatus::from_sources(&all_ok), RunStatus::Succeeded);

        let mixed = [
            report("a", SourceOutcome::Completed),
            report("b", SourceOutcome::Degraded),
        ];
        assert_eq!(RunStatus::from_sources(&mixed), RunStatus::Partial);

        let none_ok = [
            report("a", SourceOutcome::Cancelled),
            report("b", SourceOutcome::Degraded),
        ];
        assert_eq!(RunStatus::from_sources(&none_ok), RunStatus::Failed);
    }

    #[test]
    fn no_sources_is_a_success() {
        assert_eq!(RunStatus::from_sources(Vec::<SourceReport>::new().iter()), RunStatus::Succeeded);
    }

    fn summary(sources: &[SourceReport]) -> RunSummary {
        let started_at = DateTime::<Utc>::UNIX_EPOCH;
        RunSummary {
            run_id: Uuid::nil(),
            started_at,
            finished_at: started_at + chrono::Duration::seconds(4),
            status: RunStatus::from_sources(sources),
            persisted: true,
            sources: sources.iter().map(|r| (r.source.clone(), r.clone())).collect(),
            records_fetched: 0,
            records_merged: 0,
            candidates_created: 2,
            candidates_updated: 0,
            candidates_unchanged: 0,
            candidates_rescored: 2,
            high_potential: 1,
            below_authenticity_floor: 1,
            candidate_ids: BTreeSet::new(),
            error: None,
        }
    }

    #[test]
    fn report_lists_sources_that_did_not_complete() {
        let s = summary(&[
            report("yc", SourceOutcome::Completed),
            report("crunchbase", SourceOutcome::Degraded),
        ]);
        let text = s.to_string();
        assert!(text.contains("Not completed:      crunchbase"));
        assert!(text.contains("Below authenticity: 1"));
    }

    #[test]
    fn stats_average_over_runs() {
        let ok = DiscoveryRun::from(&summary(&[report("yc", SourceOutcome::Completed)]));
        let mut partial = DiscoveryRun::from(&summary(&[
            report("yc", SourceOutcome::Completed),
            report("crunchbase", SourceOutcome::Degraded),
        ]));
        partial.candidates_created = 4;
        partial.high_potential = 0;

        let stats = RunStats::from_runs(None, [&ok, &partial]);
        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.partial, 1);
        assert_eq!(stats.avg_created, 3.0);
        assert_eq!(stats.avg_high_potential, 0.5);
        assert_eq!(stats.avg_duration_secs, 4.0);
    }

    #[test]
    fn stats_over_no_runs_are_zero() {
        let stats = RunStats::from_runs(None, []);
        assert_eq!(stats, RunStats::default());
    }
}
