//! Deduplication of lead candidates against existing clients and within a batch.

use crate::classify::State;
use crate::models::{ClientRecord, LeadCandidate};
use crate::normalize::company_key;
use serde::Serialize;
use std::collections::HashSet;

/// How strictly two records must agree to count as the same business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdentityMode {
    /// Same normalized company key.
    Name,
    /// Same normalized company key in the same state.
    NameAndState,
}

/// Computes the identity key of a business under the given mode.
pub(crate) fn identity_key(company_name: &str, state: State, mode: IdentityMode) -> String {
    let key = company_key(company_name);
    match mode {
        IdentityMode::Name => key,
        IdentityMode::NameAndState => format!("{}|{}", key, state.label().to_lowercase()),
    }
}

/// Counts of what a dedup pass removed.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DedupStats {
    pub existing: usize,
    pub within_batch: usize,
}

impl DedupStats {
    pub(crate) fn total(&self) -> usize {
        self.existing + self.within_batch
    }
}

/// Stateful filter that keeps the first candidate seen for each identity.
#[derive(Debug, Clone)]
pub(crate) struct Deduplicator {
    mode: IdentityMode,
    existing: HashSet<String>,
    seen: HashSet<String>,
}

impl Deduplicator {
    pub(crate) fn new(mode: IdentityMode) -> Self {
        Self {
            mode,
            existing: HashSet::new(),
            seen: HashSet::new(),
        }
    }

    /// Seeds a name-only deduplicator with existing company names.
    pub(crate) fn with_existing_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dedup = Self::new(IdentityMode::Name);
        dedup.existing = names
            .into_iter()
            .map(|n| identity_key(n.as_ref(), State::Unknown, IdentityMode::Name))
            .collect();
        dedup
    }

    /// Seeds a deduplicator with persisted clients.
    pub(crate) fn with_existing_clients<'a, I>(mode: IdentityMode, clients: I) -> Self
    where
        I: IntoIterator<Item = &'a ClientRecord>,
    {
        let mut dedup = Self::new(mode);
        dedup.existing = clients
            .into_iter()
            .map(|c| identity_key(&c.company_name, c.state, mode))
            .collect();
        dedup
    }

    pub(crate) fn key_for(&self, company_name: &str, state: State) -> String {
        identity_key(company_name, state, self.mode)
    }

    /// Whether the key belongs to an existing client or was already admitted.
    pub(crate) fn is_taken(&self, key: &str) -> bool {
        self.existing.contains(key) || self.seen.contains(key)
    }

    /// Marks a key as taken so later candidates with it are rejected.
    pub(crate) fn remember(&mut self, key: String) {
        self.seen.insert(key);
    }

    /// Decides whether a candidate is new. A kept candidate's key is recorded.
    fn admit(&mut self, candidate: &LeadCandidate, stats: &mut DedupStats) -> bool {
        let key = self.key_for(&candidate.company_name, candidate.state);
        if self.existing.contains(&key) {
            tracing::debug!(target: "dedup_task", "Dropping '{}': already a client", candidate.company_name);
            stats.existing += 1;
            return false;
        }
        if !self.seen.insert(key) {
            tracing::debug!(target: "dedup_task", "Dropping '{}': duplicate within batch", candidate.company_name);
            stats.within_batch += 1;
            return false;
        }
        true
    }

    /// Filters candidates in input order, keeping the first of each identity.
    pub(crate) fn dedupe(&mut self, candidates: Vec<LeadCandidate>) -> (Vec<LeadCandidate>, DedupStats) {
        let mut stats = DedupStats::default();
        let kept: Vec<LeadCandidate> = candidates
            .into_iter()
            .filter(|c| self.admit(c, &mut stats))
            .collect();
        (kept, stats)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::CandidateSource;

    pub(crate) fn candidate(name: &str, state: State) -> LeadCandidate {
        LeadCandidate {
            company_name: name.to_string(),
            industry: "Industrial".to_string(),
            state,
            region: state.region(),
            location: state.label().to_string(),
            contact_phone: None,
            contact_email: None,
            address: None,
            latitude: None,
            longitude: None,
            estimated_usage: 7000,
            quality_score: 55,
            quality_factors: vec![],
            source: CandidateSource::Rules,
            source_url: None,
            snippet: String::new(),
            reasoning: None,
            search_intent: None,
            maps_verified: false,
        }
    }

    fn names(candidates: &[LeadCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.company_name.as_str()).collect()
    }

    #[test]
    fn test_first_encountered_wins() {
        let batch = vec![
            candidate("ABC Sdn Bhd", State::Pahang),
            candidate("XYZ Logistics", State::Johor),
            candidate("ABC Sdn. Bhd.", State::Pahang),
            candidate("abc enterprise", State::Kelantan),
        ];
        let (kept, stats) = Deduplicator::new(IdentityMode::Name).dedupe(batch);
        assert_eq!(names(&kept), vec!["ABC Sdn Bhd", "XYZ Logistics"]);
        assert_eq!(stats.within_batch, 2);
        assert_eq!(stats.existing, 0);
    }

    #[test]
    fn test_existing_clients_are_removed() {
        let batch = vec![
            candidate("Kilang Sawit Kemaman Sdn Bhd", State::Terengganu),
            candidate("Maju Quarry Berhad", State::Pahang),
        ];
        let mut dedup = Deduplicator::with_existing_names(["Kemaman Kilang Sawit"]);
        let (kept, stats) = dedup.dedupe(batch);
        assert_eq!(names(&kept), vec!["Maju Quarry Berhad"]);
        assert_eq!(stats.existing, 1);
        assert_eq!(stats.total(), 1);
    }

    #[test]
    fn test_name_and_state_is_stricter() {
        let batch = vec![
            candidate("ABC Sdn Bhd", State::Pahang),
            candidate("ABC Sdn Bhd", State::Johor),
        ];
        let (kept, _) = Deduplicator::new(IdentityMode::NameAndState).dedupe(batch.clone());
        assert_eq!(kept.len(), 2);
        let (kept, _) = Deduplicator::new(IdentityMode::Name).dedupe(batch);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let batch = vec![
            candidate("ABC Sdn Bhd", State::Pahang),
            candidate("ABC Berhad", State::Pahang),
            candidate("Delta Marine", State::Sabah),
            candidate("Marine Delta Sdn Bhd", State::Sabah),
            candidate("Omega Timber", State::Sarawak),
        ];
        let (once, _) = Deduplicator::new(IdentityMode::Name).dedupe(batch);
        let (twice, stats) = Deduplicator::new(IdentityMode::Name).dedupe(once.clone());
        assert_eq!(once, twice);
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_identity_key_with_state() {
        assert_eq!(
            identity_key("ABC Sdn Bhd", State::PulauPinang, IdentityMode::NameAndState),
            "abc|pulau pinang"
        );
        assert_eq!(
            identity_key("ABC Sdn Bhd", State::PulauPinang, IdentityMode::Name),
            "abc"
        );
    }
}
