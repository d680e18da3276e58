use thiserror::Error;
use uuid::Uuid;

use prospector_common::RunSummary;
use prospector_store::StoreError;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("a discovery run is already in progress")]
    AlreadyRunning,

    /// The run's commit was rolled back. `summary` is the failed run as it was
    /// reported; no candidate change from it is visible.
    #[error("run {} failed to persist: {source}", .summary.run_id)]
    Persistence {
        summary: Box<RunSummary>,
        #[source]
        source: StoreError,
    },

    #[error("candidate {0} not found")]
    NotFound(Uuid),

    #[error("retention window of {0} days is out of range")]
    RetentionOutOfRange(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}
