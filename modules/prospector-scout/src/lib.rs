pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod resolver;
pub mod scoring;
pub mod source;
pub mod sources;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod throttle;
pub mod tracker;

pub use error::RunError;
pub use pipeline::Discovery;
pub use source::{Fetch, SourceAdapter, SourceError};
