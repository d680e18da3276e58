pub mod config;
pub mod error;
pub mod normalize;
pub mod run;
pub mod types;

pub use config::{AppConfig, DiscoveryConfig};
pub use error::ConfigError;
pub use normalize::{normalize_domain, normalize_name};
pub use run::*;
pub use types::*;
