//! Persisted client records and the import of selected candidates.

use crate::classify::State;
use crate::dedup::{Deduplicator, IdentityMode, identity_key};
use crate::error::Result;
use crate::models::{
    CandidateSource, ClientRecord, ClientStatus, ImportSummary, LeadCandidate, NewClient,
};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Result of inserting one client.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InsertOutcome {
    Inserted(Box<ClientRecord>),
    /// Same owner, company identity and state as an existing record.
    Duplicate,
}

/// Which records a listing returns. `None` fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ClientFilter {
    pub archived: Option<bool>,
    pub owner: Option<String>,
}

impl ClientFilter {
    pub(crate) fn active(owner: Option<&str>) -> Self {
        Self {
            archived: Some(false),
            owner: owner.map(str::to_string),
        }
    }

    fn matches(&self, record: &ClientRecord) -> bool {
        self.archived.is_none_or(|a| a == record.is_archived())
            && self
                .owner
                .as_ref()
                .is_none_or(|o| record.owner.as_ref() == Some(o))
    }
}

/// Client store trait
#[async_trait]
pub(crate) trait ClientStore: Send + Sync {
    async fn insert(&self, client: NewClient) -> Result<InsertOutcome>;

    async fn list(&self, filter: &ClientFilter) -> Result<Vec<ClientRecord>>;

    /// Soft-deletes records. Returns how many changed.
    async fn archive(&self, ids: &[Uuid]) -> Result<usize>;

    async fn restore(&self, ids: &[Uuid]) -> Result<usize>;

    async fn update_status(&self, ids: &[Uuid], status: ClientStatus) -> Result<usize>;

    /// Permanently removes records.
    async fn delete(&self, ids: &[Uuid]) -> Result<usize>;

    /// Names of the owner's active clients, for excluding them from discovery.
    async fn existing_company_names(&self, owner: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .list(&ClientFilter::active(owner))
            .await?
            .into_iter()
            .map(|c| c.company_name)
            .collect())
    }
}

fn unique_key(owner: Option<&str>, company_name: &str, state: State) -> String {
    format!(
        "{}#{}",
        owner.unwrap_or(""),
        identity_key(company_name, state, IdentityMode::NameAndState)
    )
}

/// Client records kept in a single JSON file. Every mutation rewrites the
/// file through a temp file and a rename.
pub(crate) struct JsonClientStore {
    path: PathBuf,
    records: Mutex<Vec<ClientRecord>>,
}

impl JsonClientStore {
    /// Opens the store, starting empty if the file does not exist yet.
    pub(crate) async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(target: "store_task", "Loaded {} clients from {}", records.len(), path.display());
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    async fn persist(&self, records: &[ClientRecord]) -> Result<()> {
        let content = serde_json::to_string_pretty(records)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Applies `change` to each matching record on a copy and commits it only
    /// if the file write succeeds.
    async fn update_where<F>(&self, ids: &[Uuid], mut change: F) -> Result<usize>
    where
        F: FnMut(&mut ClientRecord) -> bool + Send,
    {
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        let mut changed = 0;
        for record in next.iter_mut().filter(|r| ids.contains(&r.id)) {
            if change(record) {
                record.updated_at = Utc::now();
                changed += 1;
            }
        }
        if changed > 0 {
            self.persist(&next).await?;
            *records = next;
        }
        Ok(changed)
    }
}

#[async_trait]
impl ClientStore for JsonClientStore {
    async fn insert(&self, client: NewClient) -> Result<InsertOutcome> {
        let mut records = self.records.lock().await;
        let key = unique_key(client.owner.as_deref(), &client.company_name, client.state);
        if records
            .iter()
            .any(|r| unique_key(r.owner.as_deref(), &r.company_name, r.state) == key)
        {
            tracing::debug!(target: "store_task", "Duplicate client '{}'", client.company_name);
            return Ok(InsertOutcome::Duplicate);
        }

        let now = Utc::now();
        let record = ClientRecord {
            id: Uuid::new_v4(),
            owner: client.owner,
            company_name: client.company_name,
            contact_person: client.contact_person,
            phone: client.phone,
            email: client.email,
            address: client.address,
            industry: client.industry,
            state: client.state,
            region: client.region,
            estimated_usage: client.estimated_usage,
            status: client.status,
            priority: client.priority,
            notes: client.notes,
            latitude: client.latitude,
            longitude: client.longitude,
            created_at: now,
            updated_at: now,
            archived_at: None,
        };

        let mut next = records.clone();
        next.push(record.clone());
        self.persist(&next).await?;
        *records = next;
        tracing::info!(target: "store_task", "Inserted client '{}' ({})", record.company_name, record.id);
        Ok(InsertOutcome::Inserted(Box::new(record)))
    }

    async fn list(&self, filter: &ClientFilter) -> Result<Vec<ClientRecord>> {
        let records = self.records.lock().await;
        let mut listed: Vec<ClientRecord> =
            records.iter().filter(|r| filter.matches(r)).cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    async fn archive(&self, ids: &[Uuid]) -> Result<usize> {
        let now = Utc::now();
        let changed = self
            .update_where(ids, |r| {
                if r.is_archived() {
                    return false;
                }
                r.archived_at = Some(now);
                true
            })
            .await?;
        tracing::info!(target: "store_task", "Archived {} clients", changed);
        Ok(changed)
    }

    async fn restore(&self, ids: &[Uuid]) -> Result<usize> {
        let changed = self.update_where(ids, |r| r.archived_at.take().is_some()).await?;
        tracing::info!(target: "store_task", "Restored {} clients", changed);
        Ok(changed)
    }

    async fn update_status(&self, ids: &[Uuid], status: ClientStatus) -> Result<usize> {
        self.update_where(ids, |r| {
            if r.status == status {
                return false;
            }
            r.status = status;
            true
        })
        .await
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<usize> {
        let mut records = self.records.lock().await;
        let next: Vec<ClientRecord> = records
            .iter()
            .filter(|r| !ids.contains(&r.id))
            .cloned()
            .collect();
        let removed = records.len() - next.len();
        if removed == 0 {
            return Ok(0);
        }
        self.persist(&next).await?;
        *records = next;
        tracing::info!(target: "store_task", "Permanently deleted {} clients", removed);
        Ok(removed)
    }
}

/// Free-text notes recorded on an imported client.
pub(crate) fn import_notes(candidate: &LeadCandidate) -> String {
    let mut notes = String::new();
    if candidate.source == CandidateSource::Ai {
        notes.push_str("AI Analyzed\n");
    }
    notes.push_str(&format!(
        "Quality Score: {}/100\nFactors: {}",
        candidate.quality_score,
        candidate.quality_factors.join(", ")
    ));
    if let Some(intent) = &candidate.search_intent {
        notes.push_str(&format!("\n\nSearch Intent: {}", intent));
    }
    if let Some(reasoning) = &candidate.reasoning {
        notes.push_str(&format!("\n\nReasoning: {}", reasoning));
    }
    if let Some(url) = &candidate.source_url {
        notes.push_str(&format!("\n\nSource: {}", url));
    }
    if !candidate.snippet.is_empty() {
        notes.push_str("\n\n");
        notes.push_str(&candidate.snippet);
    }
    notes
}

fn to_new_client(owner: Option<&str>, candidate: &LeadCandidate) -> NewClient {
    NewClient {
        owner: owner.map(str::to_string),
        company_name: candidate.company_name.clone(),
        contact_person: "To be contacted".to_string(),
        phone: candidate.contact_phone.clone().unwrap_or_default(),
        email: candidate.contact_email.clone().unwrap_or_default(),
        address: candidate.address.clone().unwrap_or_default(),
        industry: candidate.industry.clone(),
        state: candidate.state,
        region: candidate.region,
        estimated_usage: candidate.estimated_usage,
        status: ClientStatus::New,
        priority: candidate.priority(),
        notes: import_notes(candidate),
        latitude: candidate.latitude,
        longitude: candidate.longitude,
    }
}

/// Commits selected candidates. Duplicates of active clients or of earlier
/// candidates in the selection are skipped and counted; a failed insert is
/// counted and does not stop the rest.
pub(crate) async fn import_candidates(
    store: &dyn ClientStore,
    owner: Option<&str>,
    candidates: &[LeadCandidate],
) -> Result<ImportSummary> {
    let existing = store.list(&ClientFilter::active(owner)).await?;
    let mut dedup = Deduplicator::with_existing_clients(IdentityMode::NameAndState, &existing);
    let mut summary = ImportSummary::default();

    for candidate in candidates {
        let key = dedup.key_for(&candidate.company_name, candidate.state);
        if dedup.is_taken(&key) {
            summary.duplicates += 1;
            continue;
        }
        match store.insert(to_new_client(owner, candidate)).await {
            Ok(InsertOutcome::Inserted(_)) => {
                summary.imported += 1;
                dedup.remember(key);
            }
            Ok(InsertOutcome::Duplicate) => summary.duplicates += 1,
            Err(e) => {
                tracing::error!(target: "store_task",
                    "Failed to import '{}': {}", candidate.company_name, e
                );
                summary.failed += 1;
            }
        }
    }

    tracing::info!(target: "store_task", "Import finished: {}", summary);
    Ok(summary)
}
