use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;

use prospector_common::{RawRecord, SourceId};

/// Failure kinds an adapter can signal. Per-item parse problems are not
/// errors: the adapter skips the item and bumps its [`SkipCounter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Safe adapter-specific stop (e.g. pagination cap). Not a failure.
    #[error("source exhausted: {0}")]
    Exhausted(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Unavailable(_) | SourceError::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Count of malformed items an adapter skipped during one `fetch` call.
#[derive(Debug, Clone, Default)]
pub struct SkipCounter(Arc<AtomicU64>);

impl SkipCounter {
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

pub type RecordStream = BoxStream<'static, Result<RawRecord, SourceError>>;

/// Result of one `fetch` call: a lazy, single-pass record sequence plus the
/// skip counter the adapter bumps as it goes.
pub struct Fetch {
    pub records: RecordStream,
    pub skipped: SkipCounter,
}

impl Fetch {
    pub fn new(records: RecordStream, skipped: SkipCounter) -> Self {
        Self { records, skipped }
    }

    pub fn empty() -> Self {
        Self::new(Box::pin(futures::stream::empty()), SkipCounter::default())
    }
}

/// Uniform capability every data source implements. Each call starts a fresh
/// pass over the source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> &SourceId;

    /// Start a pass. `since` asks for records newer than a point in time;
    /// adapters that cannot filter may ignore it.
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Fetch, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_retry() {
        assert!(SourceError::Unavailable("down".into()).is_retryable());
        assert!(SourceError::RateLimited { retry_after: None }.is_retryable());
        assert!(!SourceError::Exhausted("page limit".into()).is_retryable());
    }

    #[test]
    fn rate_limit_message_includes_hint() {
        let e = SourceError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(e.to_string(), "rate limited (retry after 30s)");
        assert_eq!(SourceError::RateLimited { retry_after: None }.to_string(), "rate limited");
    }
}
