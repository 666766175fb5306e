//! Canonical identity keys for company names.
//!
//! "ABC Sdn Bhd", "ABC Sdn. Bhd." and "abc enterprise" all reduce to `abc`,
//! and word order does not matter once the key is token-sorted.

use once_cell::sync::Lazy;
use regex::Regex;

static MALAYSIA_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(m\)").expect("Failed to compile (m) marker regex"));

static CORPORATE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(sdn\.?\s*bhd\.?|sendirian\s+berhad|berhad|bhd\.?|enterprise|industries|industry|trading|resources|holdings|group|services|service|sdn)\b",
    )
    .expect("Failed to compile corporate suffix regex")
});

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9\s]").expect("Failed to compile non-alphanumeric regex"));

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"));

/// Tokens this short are initials or noise and never part of the key.
const MIN_TOKEN_LEN: usize = 3;

/// Lower-cases a company name and strips corporate suffixes and punctuation.
pub(crate) fn normalize_company_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let with_country = MALAYSIA_MARKER.replace_all(&lowered, " malaysia ");
    let without_suffix = CORPORATE_SUFFIX.replace_all(&with_country, " ");
    let alphanumeric = NON_ALPHANUMERIC.replace_all(&without_suffix, " ");
    WHITESPACE_RUN
        .replace_all(&alphanumeric, " ")
        .trim()
        .to_string()
}

/// Builds the token-sorted identity key used for deduplication.
pub(crate) fn company_key(name: &str) -> String {
    let normalized = normalize_company_name(name);
    let mut tokens: Vec<&str> = normalized
        .split(' ')
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
