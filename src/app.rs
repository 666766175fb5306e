//! The application as both surfaces see it: a pipeline, a client store, the
//! query history and the optional notifier, plus the flows that tie them
//! together.

use crate::classify::TargetArea;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{ImportSummary, LeadCandidate};
use crate::notify::{LeadNotifier, MANUAL_DISCOVERY, SCHEDULED_DISCOVERY, notify_if_warranted};
use crate::pipeline::{DiscoveryOutcome, DiscoveryRequest, LeadPipeline};
use crate::queries::{QueryHistoryBook, plan_queries, scheduled_query};
use crate::sheets::{SheetsClient, SyncReport};
use crate::store::{ClientFilter, ClientStore, JsonClientStore, import_candidates};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Parameters of a manual discovery run. Unset fields fall back to config.
#[derive(Debug, Clone, Default)]
pub(crate) struct DiscoverParams {
    pub area: Option<TargetArea>,
    pub custom_query: Option<String>,
    pub min_usage: Option<u32>,
    pub use_ai: Option<bool>,
    pub owner: Option<String>,
}

pub(crate) struct AppState {
    pub config: Arc<Config>,
    /// `None` when no search key is configured; discovery is then refused.
    pipeline: Option<LeadPipeline>,
    pub store: Arc<dyn ClientStore>,
    history: Mutex<QueryHistoryBook>,
    history_path: Option<PathBuf>,
    notifier: Option<LeadNotifier>,
}

impl AppState {
    /// Opens the store and history files and wires every configured
    /// capability. A missing search key or mail credential disables only
    /// that capability.
    pub(crate) async fn from_config(config: Arc<Config>, show_progress: bool) -> Result<Self> {
        let pipeline = match LeadPipeline::from_config(&config) {
            Ok(pipeline) => Some(pipeline.with_progress(show_progress)),
            Err(AppError::MissingCredential(key)) => {
                tracing::warn!(target: "pipeline_task", "{} not set, discovery is disabled", key);
                None
            }
            Err(e) => return Err(e),
        };
        let notifier = match LeadNotifier::from_config(&config) {
            Ok(notifier) => notifier,
            Err(e) => {
                tracing::warn!(target: "notify_task", "Email notifications disabled: {}", e);
                None
            }
        };
        let store = JsonClientStore::open(&config.store_file).await?;
        let book = QueryHistoryBook::load(&config.history_file).await?;

        Ok(Self {
            history_path: Some(config.history_file.clone()),
            config,
            pipeline,
            store: Arc::new(store),
            history: Mutex::new(book),
            notifier,
        })
    }

    fn pipeline(&self) -> Result<&LeadPipeline> {
        self.pipeline
            .as_ref()
            .ok_or(AppError::MissingCredential("FIRECRAWL_API_KEY"))
    }

    fn owner<'a>(&'a self, owner: Option<&'a str>) -> Option<&'a str> {
        owner.or(self.config.owner.as_deref())
    }

    /// Picks queries for `area`, records them and persists the history.
    async fn next_queries(&self, area: TargetArea, custom: Option<&str>) -> Vec<String> {
        let mut book = self.history.lock().await;
        let mut rng = StdRng::from_entropy();
        let queries = plan_queries(
            custom,
            area,
            book.for_area(area, self.config.history_length),
            self.config.max_queries,
            &mut rng,
        );
        tracing::debug!(target: "pipeline_task",
            "Query history for {} holds {} entries", area, book.for_area(area, self.config.history_length).len()
        );
        if let Some(path) = &self.history_path {
            if let Err(e) = book.save(path).await {
                tracing::warn!(target: "pipeline_task", "Could not save query history to {}: {}", path.display(), e);
            }
        }
        queries
    }

    async fn run(
        &self,
        queries: Vec<String>,
        area: TargetArea,
        min_usage: u32,
        use_ai: bool,
        owner: Option<&str>,
        discovery_type: &str,
    ) -> Result<DiscoveryOutcome> {
        let pipeline = self.pipeline()?;
        let existing_names = self.store.existing_company_names(owner).await?;
        let request = DiscoveryRequest {
            queries,
            area,
            min_usage,
            thresholds: self.config.thresholds,
            existing_names,
            use_ai,
        };
        let outcome = pipeline.discover(&request).await;
        tracing::info!(target: "pipeline_task", "{}: {}", discovery_type, outcome.message());

        notify_if_warranted(
            self.notifier.as_ref(),
            outcome.candidates(),
            self.config.notify_threshold,
            discovery_type,
        )
        .await;
        Ok(outcome)
    }

    pub(crate) async fn discover(&self, params: DiscoverParams) -> Result<DiscoveryOutcome> {
        self.pipeline()?;
        let area = params.area.unwrap_or(TargetArea::PantaiTimur);
        let queries = self
            .next_queries(area, params.custom_query.as_deref())
            .await;
        self.run(
            queries,
            area,
            params.min_usage.unwrap_or(self.config.min_usage),
            params.use_ai.unwrap_or(self.config.use_ai),
            self.owner(params.owner.as_deref()),
            MANUAL_DISCOVERY,
        )
        .await
    }

    /// The unattended run: one random nationwide query, default settings.
    pub(crate) async fn scheduled(&self) -> Result<DiscoveryOutcome> {
        let query = {
            let mut rng = StdRng::from_entropy();
            scheduled_query(&mut rng).to_string()
        };
        self.run(
            vec![query],
            TargetArea::All,
            self.config.min_usage,
            self.config.use_ai,
            self.owner(None),
            SCHEDULED_DISCOVERY,
        )
        .await
    }

    pub(crate) async fn import(
        &self,
        owner: Option<&str>,
        candidates: &[LeadCandidate],
    ) -> Result<ImportSummary> {
        import_candidates(self.store.as_ref(), self.owner(owner), candidates).await
    }

    /// Exports the owner's active clients to the configured spreadsheet.
    pub(crate) async fn sync_sheets(&self, owner: Option<&str>) -> Result<SyncReport> {
        let spreadsheet_id = self.config.spreadsheet_id.as_deref().ok_or_else(|| {
            AppError::Config("No spreadsheet id configured (--spreadsheet-id)".to_string())
        })?;
        let client = SheetsClient::from_config(&self.config)?;
        let clients = self
            .store
            .list(&ClientFilter::active(self.owner(owner)))
            .await?;
        client.sync_clients(spreadsheet_id, &clients).await
    }
}
