use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use prospector_common::{Candidate, FundingStage};

/// Hard cap on page size.
pub const MAX_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Authenticity,
    Fit,
}

/// Compound candidate filter. All predicates are conjunctive; unset ones
/// match everything. Results sort by the chosen score descending (unscored
/// last), then by normalized name ascending.
#[derive(Debug, Clone, PartialEq, TypedBuilder, Serialize, Deserialize)]
pub struct CandidateQuery {
    #[builder(default, setter(strip_option))]
    pub min_authenticity: Option<f64>,
    #[builder(default, setter(strip_option))]
    pub min_fit: Option<f64>,
    #[builder(default)]
    pub healthcare_only: bool,
    /// Case-insensitive substring of the candidate's location.
    #[builder(default, setter(strip_option, into))]
    pub location_contains: Option<String>,
    /// Case-insensitive substring of the name, any alias or any description.
    #[builder(default, setter(strip_option, into))]
    pub text_contains: Option<String>,
    /// Empty means any stage (including unknown).
    #[builder(default)]
    pub funding_stages: BTreeSet<FundingStage>,
    #[builder(default)]
    pub sort: SortKey,
    #[builder(default)]
    pub offset: u32,
    #[builder(default = 50)]
    pub limit: u32,
}

impl Default for CandidateQuery {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CandidateQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit.min(MAX_LIMIT)
    }

    pub fn matches(&self, c: &Candidate) -> bool {
        if let Some(min) = self.min_authenticity {
            if !c.authenticity_score.is_some_and(|s| s >= min) {
                return false;
            }
        }
        if let Some(min) = self.min_fit {
            if !c.fit_score.is_some_and(|s| s >= min) {
                return false;
            }
        }
        if self.healthcare_only && c.healthcare_relevant != Some(true) {
            return false;
        }
        if let Some(needle) = &self.location_contains {
            let needle = needle.to_lowercase();
            let hit = c
                .location
                .as_ref()
                .is_some_and(|l| l.value.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(needle) = &self.text_contains {
            if !c.search_text().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if !self.funding_stages.is_empty() {
            let hit = c
                .funding_stage
                .as_ref()
                .is_some_and(|s| self.funding_stages.contains(&s.value));
            if !hit {
                return false;
            }
        }
        true
    }

    /// Total order used by every store implementation.
    pub fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        let (sa, sb) = match self.sort {
            SortKey::Authenticity => (a.authenticity_score, b.authenticity_score),
            SortKey::Fit => (a.fit_score, b.fit_score),
        };
        desc_nulls_last(sa, sb)
            .then_with(|| a.normalized_name.cmp(&b.normalized_name))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// `%needle%` for a SQL `LIKE ... ESCAPE '\'`, with the needle's own
/// wildcards escaped.
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePage {
    pub candidates: Vec<Candidate>,
    /// Matches before pagination.
    pub total: u64,
    /// Offset of the next page, if there is one.
    pub next_offset: Option<u32>,
}

impl CandidatePage {
    pub fn new(candidates: Vec<Candidate>, total: u64, query: &CandidateQuery) -> Self {
        let end = query.offset as u64 + candidates.len() as u64;
        let next_offset = (end < total).then_some(end as u32);
        Self {
            candidates,
            total,
            next_offset,
        }
    }
}
