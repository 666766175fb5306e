//! Text patterns for filtering search results and pulling contact details out of them.

use crate::domain::is_social_host;
use crate::models::SearchResult;
use once_cell::sync::Lazy;
use regex::Regex;

static BUSINESS_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)sdn\.?\s*bhd|berhad|enterprise|industries")
        .expect("Failed to compile business marker regex")
});

static DIESEL_NEED_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)diesel|generator|genset|machinery|kilang|mill|fleet|truck|lori")
        .expect("Failed to compile diesel need regex")
});

static DIESEL_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)diesel|generator|genset").expect("Failed to compile diesel keyword regex")
});

static REGISTERED_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)sdn\.?\s*bhd|berhad").expect("Failed to compile registration regex")
});

static COMPANY_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[A-Za-z0-9\s&'-]+(?:sdn\.?\s*bhd\.?|berhad|enterprise|industries)")
        .expect("Failed to compile company name regex")
});

static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\+?6?0\d{1,2}[-\s]?\d{3,4}[-\s]?\d{4}").expect("Failed to compile phone regex")
});

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
        .expect("Failed to compile email regex")
});

const MIN_COMPANY_NAME_LEN: usize = 5;
const MAX_COMPANY_NAME_LEN: usize = 100;
const SNIPPET_LEN: usize = 250;

/// Lower-cased title and description, the text the rule path works on.
pub(crate) fn rule_content(result: &SearchResult) -> String {
    format!("{} {}", result.title(), result.description()).to_lowercase()
}

/// Directory listings and social profiles never describe a single business.
pub(crate) fn is_excluded_source(result: &SearchResult) -> bool {
    let url = result.url();
    if url.to_lowercase().contains("directory") || rule_content(result).contains("directory") {
        return true;
    }
    !url.is_empty() && is_social_host(url)
}

pub(crate) fn has_business_marker(text: &str) -> bool {
    BUSINESS_MARKER.is_match(text)
}

/// Only "Sdn Bhd" and "Berhad" count as a registration; "Enterprise" and
/// "Industries" qualify a result but earn no registration weight.
pub(crate) fn is_registered_business(text: &str) -> bool {
    REGISTERED_MARKER.is_match(text)
}

/// Signals that the business burns diesel (machinery, fleets, mills ...).
pub(crate) fn has_diesel_need(text: &str) -> bool {
    DIESEL_NEED_MARKER.is_match(text)
}

/// Narrower than `has_diesel_need`: diesel or generators named outright.
pub(crate) fn mentions_diesel(text: &str) -> bool {
    DIESEL_KEYWORD.is_match(text)
}

/// Pulls a company name out of a result title.
///
/// Prefers a name ending in a registration suffix; otherwise takes the
/// title up to the first " - " or " | " separator. Names that are too short
/// to be meaningful yield `None`.
pub(crate) fn extract_company_name(title: &str) -> Option<String> {
    let raw = match COMPANY_NAME.find(title) {
        Some(m) => m.as_str(),
        None => title
            .split(" - ")
            .next()
            .and_then(|s| s.split(" | ").next())
            .unwrap_or(title),
    };
    let name = raw.trim();
    if name.chars().count() < MIN_COMPANY_NAME_LEN {
        return None;
    }
    Some(truncate_chars(name, MAX_COMPANY_NAME_LEN).trim_end().to_string())
}

pub(crate) fn extract_phone(text: &str) -> Option<String> {
    PHONE.find(text).map(|m| m.as_str().to_string())
}

pub(crate) fn extract_email(text: &str) -> Option<String> {
    EMAIL.find(text).map(|m| m.as_str().to_lowercase())
}

/// Provenance snippet shown next to a lead.
pub(crate) fn snippet(description: &str) -> String {
    truncate_chars(description, SNIPPET_LEN).to_string()
}

/// Human-readable reasons a lead looks promising.
pub(crate) fn quality_factors(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut factors = Vec::new();
    if is_registered_business(&lowered) {
        factors.push("Registered business".to_string());
    }
    if lowered.contains("diesel") {
        factors.push("Diesel mentioned".to_string());
    }
    if lowered.contains("generator") || lowered.contains("genset") {
        factors.push("Generator usage".to_string());
    }
    if lowered.contains("kilang") || lowered.contains("factory") {
        factors.push("Industrial facility".to_string());
    }
    factors
}

/// Cuts a string to at most `max` characters without splitting a code point.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
