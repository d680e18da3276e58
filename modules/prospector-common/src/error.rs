use thiserror::Error;

/// Invalid configuration values.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid weight {name} = {value}: weights must be finite and non-negative")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("Name similarity threshold {0} must lie within [0, 1]")]
    InvalidThreshold(f64),

    #[error("Duplicate source {0} in trust rank")]
    DuplicateTrustRank(String),

    #[error("Duplicate source id {0}")]
    DuplicateSource(String),

    #[error("Source {id} of kind {kind} requires `{field}`")]
    MissingSourceField {
        id: String,
        kind: &'static str,
        field: &'static str,
    },

    #[error("Run retention of {0} days must lie within [1, 36500]")]
    InvalidRetention(i64),

    #[error("Invalid orchestrator setting: {0}")]
    Orchestrator(String),

    #[error("Missing environment variable {0}")]
    MissingEnv(&'static str),
}
