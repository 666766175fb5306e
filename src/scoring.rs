//! Usage estimation, quality scoring and the qualification gate.

use crate::classify::Industry;
use crate::models::{CandidateSource, LeadCandidate};

/// Smallest monthly volume (litres) worth a delivery.
pub(crate) const MIN_ORDER_LITERS: u32 = 5460;

const BASE_SCORE: u32 = 30;
const BUSINESS_WEIGHT: u32 = 25;
const DIESEL_WEIGHT: u32 = 20;
const PHONE_WEIGHT: u32 = 15;
const EMAIL_WEIGHT: u32 = 10;
const INDUSTRY_WEIGHT: u32 = 15;
const STATE_WEIGHT: u32 = 10;

/// Estimated monthly diesel consumption in litres for an industry.
pub(crate) fn estimate_usage(industry: Industry) -> u32 {
    match industry {
        Industry::PalmOil => 18_000,
        Industry::OilAndGas => 25_000,
        Industry::Mining => 22_000,
        Industry::Marine => 20_000,
        Industry::Manufacturing => 15_000,
        Industry::Timber => 14_000,
        Industry::Construction => 12_000,
        Industry::Transportation => 10_000,
        Industry::Agriculture => 8_000,
        Industry::Fishery => 6_000,
        Industry::PowerGeneration => 15_000,
        Industry::Industrial => 7_000,
    }
}

/// Content features the quality score is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ScoreSignals {
    pub registered_business: bool,
    pub diesel_keyword: bool,
    pub has_phone: bool,
    pub has_email: bool,
    pub industry_recognized: bool,
    pub state_recognized: bool,
}

/// Computes the 0-100 heuristic quality score.
pub(crate) fn quality_score(signals: &ScoreSignals) -> u8 {
    let weighted = [
        (signals.registered_business, BUSINESS_WEIGHT),
        (signals.diesel_keyword, DIESEL_WEIGHT),
        (signals.has_phone, PHONE_WEIGHT),
        (signals.has_email, EMAIL_WEIGHT),
        (signals.industry_recognized, INDUSTRY_WEIGHT),
        (signals.state_recognized, STATE_WEIGHT),
    ];
    let total = weighted
        .iter()
        .filter(|(present, _)| *present)
        .fold(BASE_SCORE, |acc, (_, weight)| acc + weight);
    total.min(100) as u8
}

/// Minimum scores per classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Thresholds {
    pub rules: u8,
    pub ai: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { rules: 40, ai: 60 }
    }
}

impl Thresholds {
    pub(crate) fn for_source(&self, source: CandidateSource) -> u8 {
        match source {
            CandidateSource::Rules => self.rules,
            CandidateSource::Ai => self.ai,
        }
    }
}

/// The qualification gate: enough volume and a high enough score for the
/// classifier that produced the candidate.
pub(crate) fn qualifies(candidate: &LeadCandidate, min_usage: u32, thresholds: &Thresholds) -> bool {
    candidate.estimated_usage >= min_usage
        && candidate.quality_score >= thresholds.for_source(candidate.source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::State;
    use crate::dedup::tests::candidate;

    #[test]
    fn test_usage_table_clears_minimum() {
        assert_eq!(estimate_usage(Industry::PowerGeneration), 15_000);
        assert_eq!(estimate_usage(Industry::Industrial), 7_000);
        assert!(estimate_usage(Industry::Fishery) >= MIN_ORDER_LITERS);
        assert!(estimate_usage(Industry::Construction) >= 12_000);
    }

    #[test]
    fn test_quality_score_base_and_clamp() {
        assert_eq!(quality_score(&ScoreSignals::default()), 30);
        let all = ScoreSignals {
            registered_business: true,
            diesel_keyword: true,
            has_phone: true,
            has_email: true,
            industry_recognized: true,
            state_recognized: true,
        };
        assert_eq!(quality_score(&all), 100);
        let partial = ScoreSignals {
            registered_business: true,
            has_phone: true,
            ..Default::default()
        };
        assert_eq!(quality_score(&partial), 70);
    }

    #[test]
    fn test_gate_boundaries() {
        let thresholds = Thresholds::default();
        let mut lead = candidate("ABC Sdn Bhd", State::Pahang);

        lead.estimated_usage = 5459;
        lead.quality_score = 100;
        assert!(!qualifies(&lead, MIN_ORDER_LITERS, &thresholds));

        lead.estimated_usage = 5460;
        lead.quality_score = 40;
        assert!(qualifies(&lead, MIN_ORDER_LITERS, &thresholds));

        lead.quality_score = 39;
        assert!(!qualifies(&lead, MIN_ORDER_LITERS, &thresholds));
    }

    #[test]
    fn test_ai_candidates_need_higher_score() {
        let thresholds = Thresholds::default();
        let mut lead = candidate("ABC Sdn Bhd", State::Pahang);
        lead.source = CandidateSource::Ai;
        lead.estimated_usage = 20_000;
        lead.quality_score = 59;
        assert!(!qualifies(&lead, MIN_ORDER_LITERS, &thresholds));
        lead.quality_score = 60;
        assert!(qualifies(&lead, MIN_ORDER_LITERS, &thresholds));
    }
}
