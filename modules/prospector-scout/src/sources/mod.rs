//! Bundled source adapters and the registry that builds them from config.

pub mod disabled;
pub mod http_json;
pub mod item;
pub mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use prospector_common::config::{SourceConfig, SourceKind};

use crate::source::SourceAdapter;
use crate::throttle::Throttle;

pub use disabled::DisabledSource;
pub use http_json::HttpJsonSource;
pub use snapshot::SnapshotSource;

const USER_AGENT: &str = concat!("prospector/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Instantiate one adapter per configured source, in config order. Each gets
/// its own throttle and client.
pub fn build_adapters(configs: &[SourceConfig]) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(configs.len());
    for cfg in configs {
        let throttle = Throttle::per_minute(cfg.requests_per_minute);
        let adapter: Arc<dyn SourceAdapter> = match cfg.kind {
            SourceKind::Snapshot => {
                let path = cfg
                    .path
                    .clone()
                    .with_context(|| format!("source {} needs a path", cfg.id))?;
                Arc::new(SnapshotSource::new(cfg.id.clone(), path, throttle))
            }
            SourceKind::HttpJson => {
                let raw = cfg
                    .url
                    .as_deref()
                    .with_context(|| format!("source {} needs a url", cfg.id))?;
                let url = url::Url::parse(raw)
                    .with_context(|| format!("source {} has an invalid url: {raw}", cfg.id))?;
                let client = reqwest::Client::builder()
                    .user_agent(USER_AGENT)
                    .timeout(HTTP_TIMEOUT)
                    .build()
                    .context("Failed to build HTTP client")?;
                Arc::new(HttpJsonSource::new(
                    cfg.id.clone(),
                    client,
                    url,
                    cfg.page_limit,
                    throttle,
                ))
            }
            SourceKind::Disabled => Arc::new(DisabledSource::new(cfg.id.clone())),
        };
        info!(
            source = %cfg.id,
            kind = cfg.kind.as_str(),
            requests_per_minute = cfg.requests_per_minute,
            "Source registered"
        );
        adapters.push(adapter);
    }
    Ok(adapters)
}
