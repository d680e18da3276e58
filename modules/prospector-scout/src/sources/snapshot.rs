//! JSON-lines snapshot of previously collected records.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use prospector_common::SourceId;

use super::item::{is_since, parse_item};
use crate::source::{Fetch, SkipCounter, SourceAdapter, SourceError};
use crate::throttle::Throttle;

/// Reads one JSON object per line. Blank lines are ignored; lines that do not
/// parse into a record are skipped and counted.
pub struct SnapshotSource {
    id: SourceId,
    path: PathBuf,
    throttle: Throttle,
}

impl SnapshotSource {
    pub fn new(id: SourceId, path: impl Into<PathBuf>, throttle: Throttle) -> Self {
        Self {
            id,
            path: path.into(),
            throttle,
        }
    }
}

#[async_trait]
impl SourceAdapter for SnapshotSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Fetch, SourceError> {
        self.throttle.acquire().await;

        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::Unavailable(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let read_at = Utc::now();
        debug!(source = %self.id, path = %self.path.display(), bytes = text.len(), "Snapshot loaded");

        let lines: Vec<String> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(String::from)
            .collect();

        let skipped = SkipCounter::default();
        let counter = skipped.clone();
        let source = self.id.clone();
        let records = stream::iter(lines.into_iter().enumerate())
            .filter_map(move |(line_no, line)| {
                let record = serde_json::from_str(&line)
                    .ok()
                    .and_then(|value| parse_item(&source, value, read_at));
                if record.is_none() {
                    warn!(source = %source, line = line_no + 1, "Skipping malformed snapshot line");
                    counter.incr();
                }
                let record = record.filter(|r| is_since(r, since)).map(Ok::<_, SourceError>);
                futures::future::ready(record)
            })
            .boxed();

        Ok(Fetch::new(records, skipped))
    }
}
