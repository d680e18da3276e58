use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use prospector_common::SourceId;

use crate::source::{Fetch, SourceAdapter, SourceError};

/// A registered source that deliberately yields nothing, e.g. one whose terms
/// of service forbid automated collection.
pub struct DisabledSource {
    id: SourceId,
}

impl DisabledSource {
    pub fn new(id: SourceId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl SourceAdapter for DisabledSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<Fetch, SourceError> {
        debug!(source = %self.id, "Source disabled, returning empty sequence");
        Ok(Fetch::empty())
    }
}
