//! Entity resolution: fold raw sightings into canonical candidates.
//!
//! Matching is exact on normalized domain. When neither side has a domain, a
//! record may match by normalized-name similarity, provided the locations do
//! not conflict. Records are applied in a fixed order and all set-valued
//! fields merge by union, so the outcome does not depend on fetch order.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use prospector_common::config::ResolverConfig;
use prospector_common::{
    normalize_domain, normalize_name, Attributed, Candidate, CandidateEvidence, EmployeeRange,
    FundingStage, RawRecord, SourceId,
};

use crate::scoring::signals;

/// Configurable total order over sources for scalar conflicts. Lower rank
/// wins; unlisted sources rank below every listed one.
#[derive(Debug, Clone, Default)]
pub struct TrustRank {
    ranks: HashMap<SourceId, usize>,
}

impl TrustRank {
    pub fn new(order: &[SourceId]) -> Self {
        let ranks = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self { ranks }
    }

    pub fn rank(&self, source: &SourceId) -> usize {
        self.ranks.get(source).copied().unwrap_or(usize::MAX)
    }

    /// Whether `incoming` should replace `current`: better trust rank, then
    /// later observation, then the greater value and source so that every
    /// pair of observations has a fixed winner.
    pub fn prefers<T: Ord>(&self, incoming: &Attributed<T>, current: &Attributed<T>) -> bool {
        let key = |a: &Attributed<T>| (Reverse(self.rank(&a.source)), a.observed_at);
        match key(incoming).cmp(&key(current)) {
            std::cmp::Ordering::Equal => {
                (&incoming.value, &incoming.source) > (&current.value, &current.source)
            }
            ord => ord.is_gt(),
        }
    }
}

/// A candidate touched by this batch, with the sightings that fed it.
#[derive(Debug, Clone)]
pub struct ResolvedCandidate {
    pub candidate: Candidate,
    pub is_new: bool,
    /// Whether any field changed relative to the stored version.
    pub changed: bool,
    /// (source, record fingerprint) of every record matched here, including
    /// ones that had already contributed.
    pub fed_by: BTreeSet<(SourceId, String)>,
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub candidates: Vec<ResolvedCandidate>,
    /// Records that changed a candidate.
    pub merged: u64,
    /// Records that had already contributed to their candidate.
    pub duplicates: u64,
    /// Records with neither a usable name nor a domain.
    pub unresolvable: u64,
}

impl Resolution {
    pub fn created(&self) -> u32 {
        self.candidates.iter().filter(|c| c.is_new).count() as u32
    }

    pub fn updated(&self) -> u32 {
        self.candidates
            .iter()
            .filter(|c| !c.is_new && c.changed)
            .count() as u32
    }

    pub fn unchanged(&self) -> u32 {
        self.candidates
            .iter()
            .filter(|c| !c.is_new && !c.changed)
            .count() as u32
    }
}

pub struct EntityResolver {
    trust: TrustRank,
    name_threshold: f64,
}

impl EntityResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            trust: TrustRank::new(&config.trust_rank),
            name_threshold: config.name_similarity_threshold,
        }
    }

    /// Domains a batch of records could match on, for loading existing
    /// candidates from the store.
    pub fn lookup_keys(records: &[RawRecord]) -> (Vec<String>, bool) {
        let mut domains = BTreeSet::new();
        let mut any_domainless = false;
        for record in records {
            match record.url.as_deref().and_then(normalize_domain) {
                Some(d) => {
                    domains.insert(d);
                }
                None => any_domainless = true,
            }
        }
        (domains.into_iter().collect(), any_domainless)
    }

    /// Merge `records` into `existing` candidates, creating new candidates for
    /// unmatched records. Only candidates that at least one record matched
    /// are returned.
    pub fn resolve(
        &self,
        existing: Vec<Candidate>,
        mut records: Vec<RawRecord>,
        now: DateTime<Utc>,
    ) -> Resolution {
        records.sort_by(|a, b| {
            (a.fetched_at, &a.source, &a.external_id)
                .cmp(&(b.fetched_at, &b.source, &b.external_id))
                .then_with(|| a.fingerprint().cmp(&b.fingerprint()))
        });

        let mut entries: Vec<Entry> = existing.into_iter().map(Entry::existing).collect();
        entries.sort_by_key(|e| (e.candidate.created_at, e.candidate.id));
        let mut by_domain: HashMap<String, usize> = HashMap::new();
        for (i, e) in entries.iter().enumerate() {
            if let Some(d) = &e.candidate.domain {
                by_domain.insert(d.clone(), i);
            }
        }

        let mut resolution = Resolution::default();
        for record in &records {
            let domain = record.url.as_deref().and_then(normalize_domain);
            let name = normalize_name(&record.name);
            if domain.is_none() && name.is_empty() {
                debug!(source = %record.source, external_id = record.external_id.as_str(), "Record has no identity, skipping");
                resolution.unresolvable += 1;
                continue;
            }

            let matched = match &domain {
                Some(d) => by_domain.get(d).copied(),
                None => self.fuzzy_match(&entries, &name, record.location.as_deref()),
            };
            let idx = match matched {
                Some(idx) => idx,
                None => {
                    entries.push(Entry::new(record, domain.clone(), now));
                    let idx = entries.len() - 1;
                    if let Some(d) = domain {
                        by_domain.insert(d, idx);
                    }
                    idx
                }
            };

            let entry = &mut entries[idx];
            entry.touched = true;
            let fingerprint = record.fingerprint();
            entry.fed_by.insert((record.source.clone(), fingerprint.clone()));
            if self.merge(&mut entry.candidate, record, fingerprint) {
                entry.remember_alias(&record.name);
                entry.changed = true;
                resolution.merged += 1;
            } else {
                resolution.duplicates += 1;
            }
        }

        for entry in entries.into_iter().filter(|e| e.touched) {
            resolution.candidates.push(entry.finish(now));
        }
        resolution
    }

    /// Best domainless candidate whose name clears the similarity threshold
    /// and whose location does not conflict. Earlier candidates win ties.
    fn fuzzy_match(&self, entries: &[Entry], name: &str, location: Option<&str>) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, entry) in entries.iter().enumerate() {
            let c = &entry.candidate;
            if c.domain.is_some() {
                continue;
            }
            if !locations_compatible(location, c.location.as_ref().map(|l| l.value.as_str())) {
                continue;
            }
            let similarity = std::iter::once(c.normalized_name.as_str())
                .chain(entry.alias_names.iter().map(String::as_str))
                .map(|known| strsim::jaro_winkler(name, known))
                .fold(0.0, f64::max);
            if similarity >= self.name_threshold && best.map_or(true, |(_, s)| similarity > s) {
                best = Some((i, similarity));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Fold one record into a candidate. Returns false when the record had
    /// already contributed.
    fn merge(&self, c: &mut Candidate, record: &RawRecord, fingerprint: String) -> bool {
        if c.has_contribution(&record.source, &fingerprint) {
            return false;
        }
        let observed = |v| Attributed::new(v, record.source.clone(), record.fetched_at);

        c.sources.insert(record.source.clone());
        c.raw_payloads
            .entry(record.source.clone())
            .or_default()
            .insert(fingerprint, record.payload.clone());

        let name = record.name.trim();
        if !name.is_empty() {
            c.aliases.insert(name.to_string());
            let incoming = observed(name.to_string());
            if self.trust.prefers(&incoming, &c.name) {
                debug!(candidate_id = %c.id, from = c.name.value.as_str(), to = name, "Name conflict resolved");
                c.name = incoming;
                c.normalized_name = normalize_name(&c.name.value);
            }
        }

        if let Some(loc) = record.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            self.prefer(&mut c.location, observed(loc.to_string()), c.id, "location");
        }
        if let Some(range) = record.employee_count.as_deref().and_then(EmployeeRange::parse) {
            let incoming = Attributed::new(range, record.source.clone(), record.fetched_at);
            self.prefer(&mut c.employees, incoming, c.id, "employees");
        }
        if let Some(stage) = record.funding_stage.as_deref().and_then(FundingStage::parse) {
            let incoming = Attributed::new(stage, record.source.clone(), record.fetched_at);
            self.prefer(&mut c.funding_stage, incoming, c.id, "funding_stage");
        }

        c.evidence.absorb(&record.evidence);
        for event in &record.evidence.funding_events {
            c.add_funding_event(event.clone());
        }
        true
    }

    fn prefer<T: Ord + std::fmt::Debug>(
        &self,
        slot: &mut Option<Attributed<T>>,
        incoming: Attributed<T>,
        candidate_id: Uuid,
        field: &'static str,
    ) {
        match slot {
            None => *slot = Some(incoming),
            Some(current) if self.trust.prefers(&incoming, current) => {
                debug!(
                    candidate_id = %candidate_id,
                    field,
                    from = ?current.value,
                    to = ?incoming.value,
                    winner = %incoming.source,
                    "Merge conflict resolved"
                );
                *slot = Some(incoming);
            }
            Some(_) => {}
        }
    }
}

/// Locations conflict only when both are known and name different places.
/// Compares the leading component ("Seattle" in "Seattle, WA").
fn locations_compatible(a: Option<&str>, b: Option<&str>) -> bool {
    let city = |s: &str| {
        s.split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase()
    };
    match (a, b) {
        (Some(a), Some(b)) => {
            let (a, b) = (city(a), city(b));
            a.is_empty() || b.is_empty() || a == b
        }
        _ => true,
    }
}

/// Working state for one candidate during a resolve pass.
struct Entry {
    candidate: Candidate,
    is_new: bool,
    touched: bool,
    changed: bool,
    fed_by: BTreeSet<(SourceId, String)>,
    /// Normalized aliases, for fuzzy matching.
    alias_names: Vec<String>,
}

impl Entry {
    fn existing(candidate: Candidate) -> Self {
        let alias_names = candidate.aliases.iter().map(|a| normalize_name(a)).collect();
        Self {
            candidate,
            is_new: false,
            touched: false,
            changed: false,
            fed_by: BTreeSet::new(),
            alias_names,
        }
    }

    fn new(record: &RawRecord, domain: Option<String>, now: DateTime<Utc>) -> Self {
        let name = record.name.trim().to_string();
        let candidate = Candidate {
            id: Uuid::new_v4(),
            domain,
            normalized_name: normalize_name(&name),
            name: Attributed::new(name, record.source.clone(), record.fetched_at),
            aliases: BTreeSet::new(),
            sources: BTreeSet::new(),
            location: None,
            employees: None,
            funding_stage: None,
            healthcare_relevant: None,
            evidence: CandidateEvidence::default(),
            funding_events: Vec::new(),
            authenticity_score: None,
            fit_score: None,
            raw_payloads: Default::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        Self {
            candidate,
            is_new: true,
            touched: false,
            changed: false,
            fed_by: BTreeSet::new(),
            alias_names: Vec::new(),
        }
    }

    /// Keep later records in the same batch matching against every name
    /// this candidate has been seen under.
    fn remember_alias(&mut self, name: &str) {
        let normalized = normalize_name(name);
        if !normalized.is_empty() && !self.alias_names.contains(&normalized) {
            self.alias_names.push(normalized);
        }
    }

    fn finish(mut self, now: DateTime<Utc>) -> ResolvedCandidate {
        if self.changed {
            let c = &mut self.candidate;
            c.healthcare_relevant = signals::healthcare_relevance(&c.evidence);
            c.updated_at = now;
        }
        ResolvedCandidate {
            candidate: self.candidate,
            is_new: self.is_new,
            changed: self.changed,
            fed_by: self.fed_by,
        }
    }
}
