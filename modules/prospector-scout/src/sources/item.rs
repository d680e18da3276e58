//! Shared JSON item shape for the bundled adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use prospector_common::{RawRecord, RecordEvidence, SourceId};

#[derive(Debug, Deserialize)]
struct SourceItem {
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    fetched_at: Option<DateTime<Utc>>,
    name: String,
    // Sources disagree on field names and some send several. The first
    // present key in each group wins: url, website, domain.
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    employee_count: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    employees: Option<String>,
    #[serde(default)]
    funding_stage: Option<String>,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    evidence: RecordEvidence,
}

/// Team sizes arrive as "11-50" from some sources and as bare numbers from others.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }
    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}

/// Turn one JSON item into a RawRecord. `None` means the item is malformed
/// and the caller should count it as skipped.
pub fn parse_item(
    source: &SourceId,
    value: serde_json::Value,
    fetched_at: DateTime<Utc>,
) -> Option<RawRecord> {
    let item = SourceItem::deserialize(&value).ok()?;
    let name = item.name.trim().to_string();
    if name.is_empty() {
        return None;
    }
    let url = item.url.or(item.website).or(item.domain);
    let external_id = item
        .external_id
        .or_else(|| url.clone())
        .unwrap_or_else(|| name.clone());

    Some(RawRecord {
        source: source.clone(),
        external_id,
        fetched_at: item.fetched_at.unwrap_or(fetched_at),
        name,
        url,
        location: item.location,
        employee_count: item.employee_count.or(item.employees),
        funding_stage: item.funding_stage.or(item.stage),
        evidence: item.evidence,
        payload: value,
    })
}

/// Whether a record falls inside the requested window.
pub fn is_since(record: &RawRecord, since: Option<DateTime<Utc>>) -> bool {
    since.map_or(true, |s| record.fetched_at >= s)
}
