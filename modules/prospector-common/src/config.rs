use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{FundingStage, SourceId};

// ---------------------------------------------------------------------------
// AppConfig: env-specific values
// ---------------------------------------------------------------------------

/// Secrets and environment-specific values. Everything tunable lives in the
/// TOML `DiscoveryConfig`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
}

impl AppConfig {
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?,
        };
        config.log_redacted();
        Ok(config)
    }

    fn log_redacted(&self) {
        // Show scheme and host only; credentials stay out of logs.
        let preview = match self.database_url.split_once('@') {
            Some((_, host)) => format!("postgres://***@{host}"),
            None => format!("<{} chars>", self.database_url.len()),
        };
        tracing::info!(database_url = %preview, "Config loaded");
    }
}

// ---------------------------------------------------------------------------
// DiscoveryConfig: TOML file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub targets: TargetCriteria,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Entity-resolution parameters. Neither field has a built-in default: both
/// are tuned per deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Most trusted source first. Unlisted sources rank below every listed one.
    pub trust_rank: Vec<SourceId>,
    /// Minimum name similarity (0..=1) for a domainless fuzzy match.
    pub name_similarity_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OrchestratorConfig {
    pub max_concurrency: usize,
    pub run_deadline_secs: u64,
    pub source_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            run_deadline_secs: 900,
            source_timeout_secs: 120,
            retry_attempts: 3,
            retry_base_ms: 2_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Missing sub-signals count as the neutral midpoint 5.
    #[default]
    Lenient,
    /// Any missing sub-signal leaves the overall score absent.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AuthenticityWeights {
    pub blog: f64,
    pub ml_ratio: f64,
    pub github: f64,
    pub marketing: f64,
}

impl Default for AuthenticityWeights {
    fn default() -> Self {
        Self {
            blog: 0.30,
            ml_ratio: 0.30,
            github: 0.25,
            marketing: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FitWeights {
    pub healthcare: f64,
    pub location: f64,
    pub stage: f64,
    pub industry: f64,
    pub size: f64,
}

impl Default for FitWeights {
    fn default() -> Self {
        Self {
            healthcare: 0.35,
            location: 0.25,
            stage: 0.20,
            industry: 0.15,
            size: 0.05,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScoringConfig {
    pub mode: ScoringMode,
    pub authenticity: AuthenticityWeights,
    pub fit: FitWeights,
    /// Authenticity floor for the run report's "high potential" count.
    pub high_potential_min_authenticity: f64,
    pub high_potential_min_fit: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            mode: ScoringMode::Lenient,
            authenticity: AuthenticityWeights::default(),
            fit: FitWeights::default(),
            high_potential_min_authenticity: 6.0,
            high_potential_min_fit: 7.0,
        }
    }
}

/// Externally supplied targeting criteria for the fit axis.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TargetCriteria {
    pub locations: Vec<String>,
    pub nearby_locations: Vec<String>,
    pub funding_stages: Vec<FundingStage>,
    pub industries: Vec<String>,
    pub min_employees: u32,
    pub max_employees: u32,
}

impl Default for TargetCriteria {
    fn default() -> Self {
        Self {
            locations: ["Seattle", "Bellevue", "Redmond", "Kirkland"]
                .map(String::from)
                .to_vec(),
            nearby_locations: [
                "Tacoma",
                "Everett",
                "Bothell",
                "Renton",
                "Issaquah",
                "Washington",
            ]
            .map(String::from)
            .to_vec(),
            funding_stages: vec![
                FundingStage::EarlyStage,
                FundingStage::SeriesA,
                FundingStage::SeriesB,
            ],
            industries: [
                "Healthcare",
                "Health Tech",
                "Medical Devices",
                "E-commerce",
                "Enterprise Software",
                "SaaS",
                "Real-time Communications",
                "Video Conferencing",
                "AI/ML Infrastructure",
                "Data Analytics",
            ]
            .map(String::from)
            .to_vec(),
            min_employees: 10,
            max_employees: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// JSON-lines file of records (cached or offline data).
    Snapshot,
    /// Paginated JSON endpoint.
    HttpJson,
    /// Registered but intentionally inert (e.g. terms-of-service restricted).
    Disabled,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Snapshot => "snapshot",
            SourceKind::HttpJson => "http_json",
            SourceKind::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub id: SourceId,
    pub kind: SourceKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    #[serde(default)]
    pub page_limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetentionConfig {
    pub run_retention_days: i64,
}

/// Upper bound on `run_retention_days`, about a century.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            run_retention_days: 90,
        }
    }
}

impl DiscoveryConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let t = self.resolver.name_similarity_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(ConfigError::InvalidThreshold(t));
        }

        let mut seen = HashSet::new();
        for id in &self.resolver.trust_rank {
            if !seen.insert(id) {
                return Err(ConfigError::DuplicateTrustRank(id.to_string()));
            }
        }

        let a = &self.scoring.authenticity;
        let f = &self.scoring.fit;
        for (name, value) in [
            ("authenticity.blog", a.blog),
            ("authenticity.ml_ratio", a.ml_ratio),
            ("authenticity.github", a.github),
            ("authenticity.marketing", a.marketing),
            ("fit.healthcare", f.healthcare),
            ("fit.location", f.location),
            ("fit.stage", f.stage),
            ("fit.industry", f.industry),
            ("fit.size", f.size),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }

        let o = &self.orchestrator;
        if o.max_concurrency == 0 {
            return Err(ConfigError::Orchestrator("max_concurrency must be >= 1".into()));
        }
        if o.retry_attempts == 0 {
            return Err(ConfigError::Orchestrator("retry_attempts must be >= 1".into()));
        }
        if o.source_timeout_secs == 0 || o.run_deadline_secs == 0 {
            return Err(ConfigError::Orchestrator("timeouts must be non-zero".into()));
        }

        let days = self.retention.run_retention_days;
        if !(1..=MAX_RETENTION_DAYS).contains(&days) {
            return Err(ConfigError::InvalidRetention(days));
        }

        let mut ids = HashSet::new();
        for s in &self.sources {
            if !ids.insert(&s.id) {
                return Err(ConfigError::DuplicateSource(s.id.to_string()));
            }
            let missing = match s.kind {
                SourceKind::Snapshot if s.path.is_none() => Some("path"),
                SourceKind::HttpJson if s.url.is_none() => Some("url"),
                _ => None,
            };
            if let Some(field) = missing {
                return Err(ConfigError::MissingSourceField {
                    id: s.id.to_string(),
                    kind: s.kind.as_str(),
                    field,
                });
            }
        }
        Ok(())
    }
}

/// Load, parse and validate a TOML discovery config.
pub fn load_config(path: &Path) -> Result<DiscoveryConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: DiscoveryConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [resolver]
        trust_rank = ["yc", "geekwire"]
        name_similarity_threshold = 0.92
    "#;

    #[test]
    fn minimal_config_takes_defaults() {
        let config: DiscoveryConfig = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.resolver.trust_rank.len(), 2);
        assert_eq!(config.orchestrator.max_concurrency, 4);
        assert_eq!(config.scoring.mode, ScoringMode::Lenient);
        assert_eq!(config.scoring.authenticity, AuthenticityWeights::default());
        assert!(config.sources.is_empty());
    }

    #[test]
    fn resolver_section_is_required() {
        let err = toml::from_str::<DiscoveryConfig>("[orchestrator]\nmax_concurrency = 2\n");
        assert!(err.is_err());
    }

    #[test]
    fn threshold_is_required() {
        let err = toml::from_str::<DiscoveryConfig>("[resolver]\ntrust_rank = []\n");
        assert!(err.is_err());
    }

    #[test]
    fn full_config_parses() {
        let text = r#"
            [resolver]
            trust_rank = ["yc"]
            name_similarity_threshold = 0.9

            [orchestrator]
            max_concurrency = 2
            retry_attempts = 5

            [scoring]
            mode = "strict"

            [scoring.fit]
            healthcare = 0.5

            [targets]
            locations = ["Portland"]
            funding_stages = ["seed", "series_a"]

            [[sources]]
            id = "yc"
            kind = "snapshot"
            path = "data/yc.jsonl"

            [[sources]]
            id = "linkedin"
            kind = "disabled"
        "#;
        let config: DiscoveryConfig = toml::from_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(config.scoring.mode, ScoringMode::Strict);
        assert_eq!(config.scoring.fit.healthcare, 0.5);
        assert_eq!(config.scoring.fit.location, 0.25);
        assert_eq!(config.orchestrator.retry_attempts, 5);
        assert_eq!(config.orchestrator.source_timeout_secs, 120);
        assert_eq!(
            config.targets.funding_stages,
            vec![FundingStage::Seed, FundingStage::SeriesA]
        );
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].kind, SourceKind::Disabled);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config: DiscoveryConfig = toml::from_str(MINIMAL).unwrap();
        config.resolver.name_similarity_threshold = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidThreshold(_))));

        let mut config: DiscoveryConfig = toml::from_str(MINIMAL).unwrap();
        config.scoring.authenticity.blog = -0.1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWeight { .. })));

        let mut config: DiscoveryConfig = toml::from_str(MINIMAL).unwrap();
        config.resolver.trust_rank.push(SourceId::from("yc"));
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateTrustRank(_))));

        let mut config: DiscoveryConfig = toml::from_str(MINIMAL).unwrap();
        config.orchestrator.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Orchestrator(_))));
    }

    #[test]
    fn http_source_requires_url() {
        let text = r#"
            [resolver]
            trust_rank = []
            name_similarity_threshold = 0.9

            [[sources]]
            id = "feed"
            kind = "http_json"
        "#;
        let config: DiscoveryConfig = toml::from_str(text).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSourceField { field: "url", .. })
        ));
    }

    #[test]
    fn retention_must_be_a_sane_positive_window() {
        let text = format!("{MINIMAL}\n[retention]\nrun_retention_days = 200000000000\n");
        let config: DiscoveryConfig = toml::from_str(&text).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRetention(200_000_000_000))
        ));

        let mut config: DiscoveryConfig = toml::from_str(MINIMAL).unwrap();
        config.retention.run_retention_days = -5;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetention(-5))));

        config.retention.run_retention_days = MAX_RETENTION_DAYS;
        config.validate().unwrap();
    }
}
