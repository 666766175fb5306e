//! Defines the core data structures used in the diesel-leads application.

use crate::classify::{Region, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single raw web-search hit. Every field is optional because the search
/// provider omits whatever it could not extract.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub(crate) struct SearchResult {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    /// Page content rendered as markdown, when the search scraped the page.
    #[serde(alias = "content")]
    pub markdown: Option<String>,
}

impl SearchResult {
    pub(crate) fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub(crate) fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    pub(crate) fn url(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }

    pub(crate) fn markdown(&self) -> &str {
        self.markdown.as_deref().unwrap_or("")
    }

    /// True if there is any text at all to analyse.
    pub(crate) fn has_content(&self) -> bool {
        [self.title(), self.description(), self.markdown()]
            .iter()
            .any(|s| !s.trim().is_empty())
    }
}

/// Which classifier produced a candidate. The qualification threshold
/// depends on it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub(crate) enum CandidateSource {
    Rules,
    Ai,
}

/// A transient lead produced by one discovery run. Never persisted until the
/// user imports it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LeadCandidate {
    pub company_name: String,
    pub industry: String,
    pub state: State,
    pub region: Region,
    /// City if one was recognised, otherwise the state label.
    pub location: String,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Estimated monthly diesel consumption in litres.
    pub estimated_usage: u32,
    /// 0-100. Heuristic score on the rule path, model confidence on the AI path.
    pub quality_score: u8,
    #[serde(default)]
    pub quality_factors: Vec<String>,
    pub source: CandidateSource,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Buyer intent detected in the content ("cari pembekal diesel", ...).
    #[serde(default)]
    pub search_intent: Option<String>,
    #[serde(default)]
    pub maps_verified: bool,
}

impl LeadCandidate {
    pub(crate) fn priority(&self) -> Priority {
        Priority::from_score(self.quality_score)
    }
}

/// Sales priority of a lead or client.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub(crate) fn from_score(score: u8) -> Self {
        match score {
            70.. => Priority::High,
            50..=69 => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

/// Pipeline stage of a persisted client.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ClientStatus {
    #[default]
    New,
    Potential,
    Active,
}

/// A long-lived business record; what a lead becomes once imported.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct ClientRecord {
    pub id: Uuid,
    /// The user who owns the record.
    #[serde(default)]
    pub owner: Option<String>,
    pub company_name: String,
    #[serde(default)]
    pub contact_person: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub industry: String,
    pub state: State,
    pub region: Region,
    pub estimated_usage: u32,
    #[serde(default)]
    pub status: ClientStatus,
    pub priority: Priority,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Archived records are kept until permanently deleted.
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl ClientRecord {
    pub(crate) fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Fields supplied when inserting a client; ids and timestamps are assigned
/// by the store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct NewClient {
    pub owner: Option<String>,
    pub company_name: String,
    pub contact_person: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub industry: String,
    pub state: State,
    pub region: Region,
    pub estimated_usage: u32,
    pub status: ClientStatus,
    pub priority: Priority,
    pub notes: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Outcome counts of committing selected candidates to the client store.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ImportSummary {
    pub imported: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} imported, {} duplicates skipped",
            self.imported, self.duplicates
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}
