//! Turns a single raw search result into a scored lead candidate (rule path).

use crate::classify::{State, classify_industry, find_location};
use crate::models::{CandidateSource, LeadCandidate, SearchResult};
use crate::patterns::{
    extract_company_name, extract_email, extract_phone, has_business_marker, has_diesel_need,
    is_excluded_source, is_registered_business, mentions_diesel, quality_factors, rule_content, snippet,
};
use crate::scoring::{ScoreSignals, estimate_usage, quality_score};

/// Why a result did not become a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    Empty,
    ExcludedSource,
    NoBusinessMarker,
    NoDieselNeed,
    NoCompanyName,
}

/// Title-cases a lower-case place fragment ("kota bharu" -> "Kota Bharu").
pub(crate) fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classifies and scores one result. Pure and deterministic.
pub(crate) fn process_result(result: &SearchResult) -> Result<LeadCandidate, Rejection> {
    let title = result.title();
    if !result.has_content() {
        return Err(Rejection::Empty);
    }
    if is_excluded_source(result) {
        return Err(Rejection::ExcludedSource);
    }

    let content = rule_content(result);
    if !has_business_marker(&content) {
        return Err(Rejection::NoBusinessMarker);
    }
    if !has_diesel_need(&content) {
        return Err(Rejection::NoDieselNeed);
    }
    let company_name = extract_company_name(title).ok_or(Rejection::NoCompanyName)?;

    let industry = classify_industry(&content);
    let location = find_location(&content);
    let state = location.map(|m| m.state).unwrap_or(State::Unknown);
    let place = location
        .and_then(|m| m.city)
        .map(title_case)
        .unwrap_or_else(|| state.label().to_string());

    let contact_phone = extract_phone(&content);
    let contact_email = extract_email(&content);

    let signals = ScoreSignals {
        registered_business: is_registered_business(&content),
        diesel_keyword: mentions_diesel(&content),
        has_phone: contact_phone.is_some(),
        has_email: contact_email.is_some(),
        industry_recognized: industry.is_recognized(),
        state_recognized: state.is_known(),
    };

    tracing::debug!(target: "classify_task",
        "Rule match '{}': industry={}, state={}", company_name, industry, state
    );

    Ok(LeadCandidate {
        company_name,
        industry: industry.label().to_string(),
        state,
        region: state.region(),
        location: place,
        contact_phone,
        contact_email,
        address: None,
        latitude: None,
        longitude: None,
        estimated_usage: estimate_usage(industry),
        quality_score: quality_score(&signals),
        quality_factors: quality_factors(&content),
        source: CandidateSource::Rules,
        source_url: result.url.clone().filter(|u| !u.is_empty()),
        snippet: snippet(result.description()),
        reasoning: None,
        search_intent: None,
        maps_verified: false,
    })
}

/// Runs the rule path over a batch, keeping input order.
pub(crate) fn process_results(results: &[SearchResult]) -> Vec<LeadCandidate> {
    results
        .iter()
        .filter_map(|r| match process_result(r) {
            Ok(candidate) => Some(candidate),
            Err(reason) => {
                tracing::trace!(target: "classify_task", "Skipping '{}': {:?}", r.title(), reason);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Region;

    fn result(title: &str, description: &str) -> SearchResult {
        SearchResult {
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            url: Some("https://abc.com.my".to_string()),
            markdown: None,
        }
    }

    #[test]
    fn test_generator_user_in_kuantan() {
        let lead = process_result(&result(
            "ABC Sdn Bhd diesel generator Kuantan",
            "Standby genset supplier contact 09-573 1234 info@abc.com.my",
        ))
        .unwrap();
        assert_eq!(lead.company_name, "ABC Sdn Bhd");
        assert_eq!(lead.state, State::Pahang);
        assert_eq!(lead.region, Region::PantaiTimur);
        assert_eq!(lead.location, "Kuantan");
        assert_eq!(lead.industry, "Power Generation");
        assert_eq!(lead.estimated_usage, 15_000);
        assert_eq!(lead.quality_score, 100);
        assert_eq!(lead.contact_phone.as_deref(), Some("09-573 1234"));
        assert_eq!(lead.contact_email.as_deref(), Some("info@abc.com.my"));
        assert_eq!(lead.source, CandidateSource::Rules);
    }

    #[test]
    fn test_missing_business_marker_is_rejected() {
        assert_eq!(
            process_result(&result("ABC Resort Kuantan", "diesel generator on site")),
            Err(Rejection::NoBusinessMarker)
        );
    }

    #[test]
    fn test_missing_diesel_need_is_rejected() {
        assert_eq!(
            process_result(&result("ABC Sdn Bhd", "boutique bakery in Kuantan")),
            Err(Rejection::NoDieselNeed)
        );
    }

    #[test]
    fn test_empty_and_excluded() {
        assert_eq!(
            process_result(&SearchResult::default()),
            Err(Rejection::Empty)
        );
        let mut social = result("ABC Sdn Bhd lori", "fleet");
        social.url = Some("https://facebook.com/abc".to_string());
        assert_eq!(process_result(&social), Err(Rejection::ExcludedSource));
    }

    #[test]
    fn test_minimal_lead_score() {
        let lead = process_result(&result("Maju Sdn Bhd", "lori")).unwrap();
        assert_eq!(lead.state, State::Unknown);
        assert_eq!(lead.location, "Malaysia");
        assert_eq!(lead.industry, "Transportation");
        // base + business + recognised industry
        assert_eq!(lead.quality_score, 70);
    }

    #[test]
    fn test_enterprise_is_not_scored_as_registered() {
        let lead = process_result(&result("Maju Enterprise", "lori")).unwrap();
        assert_eq!(lead.company_name, "Maju Enterprise");
        // base + recognised industry
        assert_eq!(lead.quality_score, 45);
        assert!(!lead.quality_factors.contains(&"Registered business".to_string()));
    }

    #[test]
    fn test_batch_keeps_order() {
        let batch = vec![
            result("Zeta Sdn Bhd", "fleet Kuantan"),
            result("Spa Kuantan", "massage"),
            result("Alpha Berhad", "palm oil mill Kemaman"),
        ];
        let names: Vec<String> = process_results(&batch)
            .into_iter()
            .map(|c| c.company_name)
            .collect();
        assert_eq!(names, vec!["Zeta Sdn Bhd", "Alpha Berhad"]);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("kota bharu"), "Kota Bharu");
        assert_eq!(title_case(""), "");
    }
}
