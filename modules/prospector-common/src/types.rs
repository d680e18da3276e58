use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// --- SourceId ---

/// Stable identifier of a data source (e.g. `"yc"`, `"geekwire"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// --- Funding ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingStage {
    PreSeed,
    Seed,
    EarlyStage,
    SeriesA,
    SeriesB,
    SeriesC,
    SeriesD,
    Growth,
    Public,
    Acquired,
}

impl FundingStage {
    pub const ALL: [FundingStage; 10] = [
        FundingStage::PreSeed,
        FundingStage::Seed,
        FundingStage::EarlyStage,
        FundingStage::SeriesA,
        FundingStage::SeriesB,
        FundingStage::SeriesC,
        FundingStage::SeriesD,
        FundingStage::Growth,
        FundingStage::Public,
        FundingStage::Acquired,
    ];

    /// Lenient parse of free-text stage labels ("Series A", "Early Stage VC", "pre-seed").
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_lowercase().replace(['-', '_'], " ");
        if s.is_empty() {
            return None;
        }
        let stage = if s.contains("pre seed") || s.contains("preseed") {
            FundingStage::PreSeed
        } else if s.contains("series a") {
            FundingStage::SeriesA
        } else if s.contains("series b") {
            FundingStage::SeriesB
        } else if s.contains("series c") {
            FundingStage::SeriesC
        } else if s.contains("series d") || s.contains("series e") || s.contains("series f") {
            FundingStage::SeriesD
        } else if s.contains("seed") {
            FundingStage::Seed
        } else if s.contains("early stage") || s.contains("early") {
            FundingStage::EarlyStage
        } else if s.contains("growth") || s.contains("late stage") || s.contains("private equity") {
            FundingStage::Growth
        } else if s.contains("ipo") || s.contains("public") {
            FundingStage::Public
        } else if s.contains("acquired") || s.contains("acquisition") {
            FundingStage::Acquired
        } else {
            return None;
        };
        Some(stage)
    }

    /// Position in the funding lifecycle, used for adjacency checks.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FundingStage::PreSeed => "pre_seed",
            FundingStage::Seed => "seed",
            FundingStage::EarlyStage => "early_stage",
            FundingStage::SeriesA => "series_a",
            FundingStage::SeriesB => "series_b",
            FundingStage::SeriesC => "series_c",
            FundingStage::SeriesD => "series_d",
            FundingStage::Growth => "growth",
            FundingStage::Public => "public",
            FundingStage::Acquired => "acquired",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == s)
    }
}

impl fmt::Display for FundingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A funding round observed for a candidate. Append-only once attached.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FundingEvent {
    pub announced_on: Option<NaiveDate>,
    pub round_type: String,
    pub amount_usd: Option<i64>,
    #[serde(default)]
    pub investors: Vec<String>,
}

// --- Team size ---

/// Inclusive employee-count range. `max: None` means open-ended ("200+").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EmployeeRange {
    pub min: u32,
    pub max: Option<u32>,
}

impl EmployeeRange {
    /// Parse "11-50", "11–50", "200+", "1,001-5,000" or a bare count.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .map(|c| if c == '–' || c == '—' { '-' } else { c })
            .collect();
        if cleaned.is_empty() {
            return None;
        }
        if let Some(open) = cleaned.strip_suffix('+') {
            let min = open.parse().ok()?;
            return Some(Self { min, max: None });
        }
        if let Some((lo, hi)) = cleaned.split_once('-') {
            let min: u32 = lo.parse().ok()?;
            let max: u32 = hi.parse().ok()?;
            if max < min {
                return None;
            }
            return Some(Self { min, max: Some(max) });
        }
        let n: u32 = cleaned.parse().ok()?;
        Some(Self { min: n, max: Some(n) })
    }

    pub fn upper(&self) -> u32 {
        self.max.unwrap_or(u32::MAX)
    }
}

impl fmt::Display for EmployeeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", self.min),
            Some(max) => write!(f, "{}-{}", self.min, max),
            None => write!(f, "{}+", self.min),
        }
    }
}

// --- RawRecord ---

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoSummary {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Structured evidence a source may attach to a sighting. All optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordEvidence {
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub blog_posts: Vec<String>,
    pub job_titles: Vec<String>,
    pub repositories: Vec<RepoSummary>,
    pub marketing_copy: Option<String>,
    pub healthcare: Option<bool>,
    pub funding_events: Vec<FundingEvent>,
}

/// One sighting of an organization from one source. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: SourceId,
    /// Source-specific identity of the sighting (listing id, article URL, ...).
    pub external_id: String,
    pub fetched_at: DateTime<Utc>,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub employee_count: Option<String>,
    #[serde(default)]
    pub funding_stage: Option<String>,
    #[serde(default)]
    pub evidence: RecordEvidence,
    /// Opaque source payload retained for audit.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawRecord {
    /// Content identity of this sighting: SHA-256 over everything except the
    /// fetch timestamp. Re-fetching identical content yields the same value.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::json!({
            "source": self.source,
            "external_id": self.external_id,
            "name": self.name,
            "url": self.url,
            "location": self.location,
            "employee_count": self.employee_count,
            "funding_stage": self.funding_stage,
            "evidence": self.evidence,
            "payload": self.payload,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

// --- Candidate ---

/// A scalar attribute together with the observation that won it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributed<T> {
    pub value: T,
    pub source: SourceId,
    pub observed_at: DateTime<Utc>,
}

impl<T> Attributed<T> {
    pub fn new(value: T, source: SourceId, observed_at: DateTime<Utc>) -> Self {
        Self {
            value,
            source,
            observed_at,
        }
    }
}

/// Evidence accumulated across all contributing sightings. Every collection
/// merges by union (or per-key max), so merge order never matters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateEvidence {
    pub descriptions: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
    pub blog_posts: BTreeSet<String>,
    /// Lowercased job title → highest posting count seen in a single sighting.
    pub job_titles: BTreeMap<String, u32>,
    /// Lowercased repository name → summary.
    pub repositories: BTreeMap<String, RepoSummary>,
    pub marketing_copy: BTreeSet<String>,
    pub healthcare_flags: BTreeSet<bool>,
}

impl CandidateEvidence {
    /// Fold a sighting's evidence in. Returns whether anything changed.
    pub fn absorb(&mut self, record: &RecordEvidence) -> bool {
        let before = self.clone();

        if let Some(d) = non_empty(record.description.as_deref()) {
            self.descriptions.insert(d.to_string());
        }
        for k in &record.keywords {
            if let Some(k) = non_empty(Some(k)) {
                self.keywords.insert(k.to_lowercase());
            }
        }
        for post in &record.blog_posts {
            if let Some(p) = non_empty(Some(post)) {
                self.blog_posts.insert(p.to_string());
            }
        }

        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for title in &record.job_titles {
            if let Some(t) = non_empty(Some(title)) {
                *counts.entry(t.to_lowercase()).or_insert(0) += 1;
            }
        }
        for (title, n) in counts {
            let slot = self.job_titles.entry(title).or_insert(0);
            *slot = (*slot).max(n);
        }

        for repo in &record.repositories {
            let key = repo.name.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            match self.repositories.get(&key) {
                Some(existing) if existing >= repo => {}
                _ => {
                    self.repositories.insert(key, repo.clone());
                }
            }
        }

        if let Some(m) = non_empty(record.marketing_copy.as_deref()) {
            self.marketing_copy.insert(m.to_string());
        }
        if let Some(flag) = record.healthcare {
            self.healthcare_flags.insert(flag);
        }

        *self != before
    }

    /// All free text attached to the candidate, in a stable order.
    pub fn text_corpus(&self) -> String {
        self.descriptions
            .iter()
            .chain(self.keywords.iter())
            .chain(self.marketing_copy.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Canonical, deduplicated organization record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    /// Normalized domain. `None` when no domain was ever observed.
    pub domain: Option<String>,
    pub name: Attributed<String>,
    pub normalized_name: String,
    pub aliases: BTreeSet<String>,
    pub sources: BTreeSet<SourceId>,
    pub location: Option<Attributed<String>>,
    pub employees: Option<Attributed<EmployeeRange>>,
    pub funding_stage: Option<Attributed<FundingStage>>,
    pub healthcare_relevant: Option<bool>,
    pub evidence: CandidateEvidence,
    pub funding_events: Vec<FundingEvent>,
    pub authenticity_score: Option<f64>,
    pub fit_score: Option<f64>,
    /// source → record fingerprint → raw payload.
    pub raw_payloads: BTreeMap<SourceId, BTreeMap<String, serde_json::Value>>,
    /// Optimistic-concurrency version; bumped by the store on every write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    pub fn display_name(&self) -> &str {
        &self.name.value
    }

    /// Whether a sighting with this fingerprint already contributed.
    pub fn has_contribution(&self, source: &SourceId, fingerprint: &str) -> bool {
        self.raw_payloads
            .get(source)
            .is_some_and(|m| m.contains_key(fingerprint))
    }

    /// Append a funding event unless an identical one is already attached.
    /// Events are kept sorted so that merge order never shows.
    pub fn add_funding_event(&mut self, event: FundingEvent) -> bool {
        match self.funding_events.binary_search(&event) {
            Ok(_) => false,
            Err(pos) => {
                self.funding_events.insert(pos, event);
                true
            }
        }
    }

    /// Hash over the stored content, excluding version and timestamps. Two
    /// writes with equal hashes are the same logical state.
    pub fn content_hash(&self) -> String {
        let mut view = self.clone();
        view.version = 0;
        view.created_at = DateTime::<Utc>::UNIX_EPOCH;
        view.updated_at = DateTime::<Utc>::UNIX_EPOCH;
        let mut hasher = Sha256::new();
        // Serializing plain data into a Value cannot fail.
        hasher.update(serde_json::to_value(&view).unwrap_or_default().to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Lowercased text the free-text filter searches: display name,
    /// normalized name, every alias and every description, one per line.
    pub fn search_text(&self) -> String {
        std::iter::once(self.name.value.as_str())
            .chain(std::iter::once(self.normalized_name.as_str()))
            .chain(self.aliases.iter().map(String::as_str))
            .chain(self.evidence.descriptions.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase()
    }
}
