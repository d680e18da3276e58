use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("candidate {id} changed concurrently (expected version {expected}, found {found})")]
    Conflict { id: Uuid, expected: i64, found: i64 },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Test-only failure raised by `MemoryCandidateStore` fault injection.
    #[error("injected failure: {0}")]
    Injected(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation() =>
            {
                StoreError::Constraint(db.message().to_string())
            }
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}
