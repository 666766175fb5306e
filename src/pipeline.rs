//! Drives one discovery run: search, filter, classify, dedupe, validate
//! location, qualify and rank.

use crate::classifier::{LeadClassifier, LlmClassifier, RuleBasedClassifier, classify_with_fallback};
use crate::classify::TargetArea;
use crate::config::Config;
use crate::dedup::{DedupStats, Deduplicator};
use crate::error::{AppError, Result};
use crate::geo::{GeocodeCache, Geocoder, GoogleGeocoder, apply_text_validation, geocode_candidates};
use crate::llm::{AnalysisRequest, LlmGateway};
use crate::models::{LeadCandidate, SearchResult};
use crate::patterns::is_excluded_source;
use crate::scoring::{Thresholds, qualifies};
use crate::search::{FirecrawlClient, SearchOptions, WebSearch};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// What to look for in one run.
#[derive(Debug, Clone)]
pub(crate) struct DiscoveryRequest {
    pub queries: Vec<String>,
    pub area: TargetArea,
    pub min_usage: u32,
    pub thresholds: Thresholds,
    /// Names of the user's active clients; matching candidates are dropped.
    pub existing_names: Vec<String>,
    /// Try the LLM classifier before the keyword rules.
    pub use_ai: bool,
}

/// Everything a completed run produced, plus counts for each filter.
#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiscoveryReport {
    pub candidates: Vec<LeadCandidate>,
    pub classifier: &'static str,
    pub summary: Option<String>,
    pub queries: Vec<String>,
    pub failed_queries: usize,
    pub raw_results: usize,
    pub analysed_results: usize,
    pub duplicates: DedupStats,
    pub out_of_area: usize,
    pub unqualified: usize,
    pub active_searchers: u32,
}

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "status", rename_all = "camelCase")]
pub(crate) enum DiscoveryOutcome {
    /// No query returned anything. Not an error.
    NoResults {
        queries: Vec<String>,
        #[serde(rename = "failedQueries")]
        failed_queries: usize,
    },
    Completed(DiscoveryReport),
}

impl DiscoveryOutcome {
    pub(crate) fn candidates(&self) -> &[LeadCandidate] {
        match self {
            DiscoveryOutcome::NoResults { .. } => &[],
            DiscoveryOutcome::Completed(report) => &report.candidates,
        }
    }

    /// User-facing summary, with guidance when nothing was found.
    pub(crate) fn message(&self) -> String {
        match self {
            DiscoveryOutcome::NoResults { .. } => {
                "No results found. Try another area or a custom query.".to_string()
            }
            DiscoveryOutcome::Completed(report) if report.candidates.is_empty() => {
                "No qualified leads found. Try another area or lower the minimum usage.".to_string()
            }
            DiscoveryOutcome::Completed(report) => {
                format!("Found {} qualified leads", report.candidates.len())
            }
        }
    }
}

/// The capabilities a run needs. Shared across runs; each run's working set
/// is local to `discover`.
pub(crate) struct LeadPipeline {
    search: Arc<dyn WebSearch>,
    ai: Option<Box<dyn LeadClassifier>>,
    geocoder: Option<Arc<dyn Geocoder>>,
    options: SearchOptions,
    query_delay: Duration,
    show_progress: bool,
}

impl LeadPipeline {
    pub(crate) fn new(search: Arc<dyn WebSearch>) -> Self {
        Self {
            search,
            ai: None,
            geocoder: None,
            options: SearchOptions::default(),
            query_delay: Duration::from_secs(1),
            show_progress: false,
        }
    }

    /// Wires up the configured capabilities. Search is mandatory; the LLM
    /// and the geocoder are skipped when their keys are missing.
    pub(crate) fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .secrets
            .firecrawl_api_key
            .as_deref()
            .ok_or(AppError::MissingCredential("FIRECRAWL_API_KEY"))?;
        let search = FirecrawlClient::new(&config.search_base_url, api_key, config.request_timeout)?;

        let mut pipeline = Self::new(Arc::new(search))
            .with_search_options(config.search_options.clone())
            .with_query_delay(config.query_delay);

        match (&config.secrets.llm_api_key, config.use_ai) {
            (Some(key), true) => {
                let gateway =
                    LlmGateway::new(&config.llm_endpoint, key, &config.llm_model, config.llm_timeout)?;
                pipeline = pipeline.with_classifier(Box::new(LlmClassifier::new(
                    gateway,
                    config.llm_timeout,
                )));
            }
            (None, true) => {
                tracing::info!(target: "pipeline_task",
                    "LLM_GATEWAY_API_KEY not set, using rule-based classification only"
                );
            }
            _ => {}
        }

        match (&config.secrets.google_maps_api_key, config.use_geocoder) {
            (Some(key), true) => {
                let geocoder =
                    GoogleGeocoder::new(&config.geocoder_endpoint, key, config.request_timeout)?;
                pipeline = pipeline.with_geocoder(Arc::new(geocoder));
            }
            (None, true) => {
                tracing::info!(target: "pipeline_task",
                    "GOOGLE_MAPS_API_KEY not set, locations come from text only"
                );
            }
            _ => {}
        }

        Ok(pipeline)
    }

    pub(crate) fn with_classifier(mut self, classifier: Box<dyn LeadClassifier>) -> Self {
        self.ai = Some(classifier);
        self
    }

    pub(crate) fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub(crate) fn with_search_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Show a progress bar while searching (CLI only).
    pub(crate) fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn classifiers(&self, use_ai: bool) -> Vec<&dyn LeadClassifier> {
        let mut chain: Vec<&dyn LeadClassifier> = Vec::new();
        if use_ai {
            if let Some(ai) = &self.ai {
                chain.push(ai.as_ref());
            }
        }
        chain.push(&RuleBasedClassifier);
        chain
    }

    /// Issues the queries one at a time. A failed query is logged and skipped.
    async fn collect_results(&self, queries: &[String]) -> (Vec<SearchResult>, usize) {
        let progress = if self.show_progress {
            ProgressBar::new(queries.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            progress.set_style(style.progress_chars("##-"));
        }

        let mut results = Vec::new();
        let mut failed = 0;
        for (i, query) in queries.iter().enumerate() {
            if i > 0 && !self.query_delay.is_zero() {
                sleep(self.query_delay).await;
            }
            progress.set_message(query.clone());
            match self.search.search(query, &self.options).await {
                Ok(found) => {
                    tracing::info!(target: "pipeline_task", "'{}': {} results", query, found.len());
                    results.extend(found);
                }
                Err(e) if e.is_transient() => {
                    failed += 1;
                    tracing::warn!(target: "pipeline_task", "Query '{}' failed, skipping: {}", query, e);
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(target: "pipeline_task", "Query '{}' failed: {}", query, e);
                }
            }
            progress.inc(1);
        }
        progress.finish_with_message("Search complete");
        (results, failed)
    }

    pub(crate) async fn discover(&self, request: &DiscoveryRequest) -> DiscoveryOutcome {
        tracing::info!(target: "pipeline_task",
            "Discovery for area {} with {} queries (min usage {} L)",
            request.area,
            request.queries.len(),
            request.min_usage
        );

        let (raw, failed_queries) = self.collect_results(&request.queries).await;
        if raw.is_empty() {
            tracing::info!(target: "pipeline_task", "No search results across {} queries", request.queries.len());
            return DiscoveryOutcome::NoResults {
                queries: request.queries.clone(),
                failed_queries,
            };
        }
        let raw_results = raw.len();

        let analysable: Vec<SearchResult> = raw
            .into_iter()
            .filter(|r| r.has_content() && !is_excluded_source(r))
            .collect();
        tracing::debug!(target: "pipeline_task",
            "{} of {} results are analysable", analysable.len(), raw_results
        );

        let analysis = AnalysisRequest {
            results: &analysable,
            area: request.area,
            min_usage: request.min_usage,
            existing_names: &request.existing_names,
        };
        let classification = classify_with_fallback(&self.classifiers(request.use_ai), &analysis).await;

        let mut dedup = Deduplicator::with_existing_names(&request.existing_names);
        let (mut candidates, duplicates) = dedup.dedupe(classification.candidates);

        for candidate in candidates.iter_mut() {
            apply_text_validation(candidate);
        }
        if let Some(geocoder) = &self.geocoder {
            let mut cache = GeocodeCache::new();
            geocode_candidates(geocoder.as_ref(), &mut candidates, &mut cache).await;
        }

        let before_area = candidates.len();
        candidates.retain(|c| request.area.covers(c.state));
        let out_of_area = before_area - candidates.len();

        let before_gate = candidates.len();
        candidates.retain(|c| qualifies(c, request.min_usage, &request.thresholds));
        let unqualified = before_gate - candidates.len();

        candidates.sort_by(|a, b| b.quality_score.cmp(&a.quality_score));

        tracing::info!(target: "pipeline_task",
            "{} qualified leads via {} ({} duplicates, {} out of area, {} below threshold)",
            candidates.len(),
            classification.classifier,
            duplicates.total(),
            out_of_area,
            unqualified
        );

        DiscoveryOutcome::Completed(DiscoveryReport {
            candidates,
            classifier: classification.classifier,
            summary: classification.summary,
            queries: request.queries.clone(),
            failed_queries,
            raw_results,
            analysed_results: analysable.len(),
            duplicates,
            out_of_area,
            unqualified,
            active_searchers: classification.active_searchers,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classifier::tests::FixedClassifier;
    use crate::classify::{Region, State};
    use crate::dedup::tests::candidate;
    use crate::geo::GeocodeHit;
    use crate::models::CandidateSource;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers known queries with fixed results and fails the rest.
    #[derive(Default)]
    pub(crate) struct ScriptedSearch {
        pages: HashMap<String, Vec<SearchResult>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSearch {
        pub(crate) fn with(mut self, query: &str, results: Vec<SearchResult>) -> Self {
            self.pages.insert(query.to_string(), results);
            self
        }
    }

    #[async_trait]
    impl WebSearch for ScriptedSearch {
        async fn search(&self, query: &str, _options: &SearchOptions) -> Result<Vec<SearchResult>> {
            self.calls.lock().unwrap().push(query.to_string());
            self.pages.get(query).cloned().ok_or(AppError::Upstream {
                service: "search",
                status: 500,
                message: "boom".to_string(),
            })
        }
    }

    struct FixedGeocoder;

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, _query: &str) -> Result<Option<GeocodeHit>> {
            Ok(Some(GeocodeHit {
                latitude: 3.8077,
                longitude: 103.326,
                formatted_address: Some("Jalan Gebeng, Kuantan, Pahang".to_string()),
                state: Some("Pahang".to_string()),
                city: Some("Kuantan".to_string()),
            }))
        }
    }

    pub(crate) fn hit(title: &str, description: &str) -> SearchResult {
        SearchResult {
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            url: Some("https://example.com.my".to_string()),
            markdown: None,
        }
    }

    fn abc_kuantan() -> SearchResult {
        hit("ABC Sdn Bhd diesel generator Kuantan", "Standby genset hire for plants")
    }

    fn request(queries: &[&str]) -> DiscoveryRequest {
        DiscoveryRequest {
            queries: queries.iter().map(|q| q.to_string()).collect(),
            area: TargetArea::All,
            min_usage: 5460,
            thresholds: Thresholds::default(),
            existing_names: vec![],
            use_ai: true,
        }
    }

    fn pipeline(search: ScriptedSearch) -> LeadPipeline {
        LeadPipeline::new(Arc::new(search)).with_query_delay(Duration::ZERO)
    }

    fn report(outcome: DiscoveryOutcome) -> DiscoveryReport {
        match outcome {
            DiscoveryOutcome::Completed(report) => report,
            other => panic!("expected a completed run, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generator_user_in_kuantan_end_to_end() {
        let search = ScriptedSearch::default().with("q1", vec![abc_kuantan()]);
        let report = report(pipeline(search).discover(&request(&["q1"])).await);

        assert_eq!(report.candidates.len(), 1);
        let lead = &report.candidates[0];
        assert!(lead.company_name.contains("ABC"));
        assert_eq!(lead.state, State::Pahang);
        assert_eq!(lead.region, Region::PantaiTimur);
        assert!(lead.estimated_usage >= 12_000);
        assert!(lead.quality_score >= 40);
        assert_eq!(report.classifier, "rules");
    }

    #[tokio::test]
    async fn test_result_without_business_marker_is_dropped() {
        let search = ScriptedSearch::default().with(
            "q1",
            vec![hit("ABC Resort Kuantan", "diesel generator on site")],
        );
        let outcome = pipeline(search).discover(&request(&["q1"])).await;
        assert!(outcome.candidates().is_empty());
        assert!(outcome.message().starts_with("No qualified leads"));
    }

    #[tokio::test]
    async fn test_failed_query_does_not_abort_batch() {
        let search = ScriptedSearch::default().with("good", vec![abc_kuantan()]);
        let report = report(pipeline(search).discover(&request(&["bad", "good"])).await);
        assert_eq!(report.failed_queries, 1);
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].company_name, "ABC Sdn Bhd");
    }

    #[tokio::test]
    async fn test_queries_run_in_order() {
        let search = Arc::new(ScriptedSearch::default().with("a", vec![]).with("b", vec![]));
        let pipeline = LeadPipeline::new(search.clone()).with_query_delay(Duration::ZERO);
        pipeline.discover(&request(&["a", "b", "c"])).await;
        assert_eq!(*search.calls.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_no_results_is_explicit() {
        let search = ScriptedSearch::default().with("q1", vec![]);
        let outcome = pipeline(search).discover(&request(&["q1", "q2"])).await;
        match outcome {
            DiscoveryOutcome::NoResults {
                queries,
                failed_queries,
            } => {
                assert_eq!(queries.len(), 2);
                assert_eq!(failed_queries, 1);
            }
            other => panic!("expected no results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_committed_lead_is_filtered_on_next_run() {
        let search = ScriptedSearch::default().with("q1", vec![abc_kuantan()]);
        let pipeline = pipeline(search);
        let mut req = request(&["q1"]);

        let first = report(pipeline.discover(&req).await);
        assert_eq!(first.candidates.len(), 1);

        req.existing_names = first.candidates.iter().map(|c| c.company_name.clone()).collect();
        let second = report(pipeline.discover(&req).await);
        assert!(second.candidates.is_empty());
        assert_eq!(second.duplicates.existing, 1);
    }

    #[tokio::test]
    async fn test_same_inputs_same_output() {
        let results = vec![
            abc_kuantan(),
            hit("ABC Sdn. Bhd. - diesel supply", "genset Kuantan"),
            hit("Maju Quarry Berhad", "quarry machinery Kuantan"),
        ];
        let search = ScriptedSearch::default().with("q1", results);
        let pipeline = pipeline(search);
        let first = report(pipeline.discover(&request(&["q1"])).await);
        let second = report(pipeline.discover(&request(&["q1"])).await);
        assert_eq!(first.candidates, second.candidates);
        assert_eq!(first.duplicates.within_batch, 1);
    }

    #[tokio::test]
    async fn test_sorted_by_descending_score() {
        let results = vec![
            hit("Maju Sdn Bhd", "lori"),
            hit("Delta Sdn Bhd diesel Kuantan", "fleet 09-573 1234 ops@delta.com.my"),
        ];
        let search = ScriptedSearch::default().with("q1", results);
        let report = report(pipeline(search).discover(&request(&["q1"])).await);
        let scores: Vec<u8> = report.candidates.iter().map(|c| c.quality_score).collect();
        assert_eq!(report.candidates[0].company_name, "Delta Sdn Bhd");
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_rules() {
        let search = ScriptedSearch::default().with("q1", vec![abc_kuantan()]);
        let pipeline = pipeline(search).with_classifier(Box::new(FixedClassifier {
            name: "llm",
            answer: Err("payment required"),
        }));
        let report = report(pipeline.discover(&request(&["q1"])).await);
        assert_eq!(report.classifier, "rules");
        assert_eq!(report.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_ai_leads_use_ai_threshold_and_area_filter() {
        let mut strong = candidate("Pelabuhan Kuantan Marine Sdn Bhd", State::Pahang);
        strong.source = CandidateSource::Ai;
        strong.quality_score = 85;
        strong.estimated_usage = 20_000;
        let mut weak = candidate("Kemaman Lori Sdn Bhd", State::Terengganu);
        weak.source = CandidateSource::Ai;
        weak.quality_score = 55;
        let mut far = candidate("Johor Port Services Sdn Bhd", State::Johor);
        far.source = CandidateSource::Ai;
        far.quality_score = 90;

        let search = ScriptedSearch::default().with("q1", vec![abc_kuantan()]);
        let pipeline = pipeline(search).with_classifier(Box::new(FixedClassifier {
            name: "llm",
            answer: Ok(vec![strong, weak, far]),
        }));
        let mut req = request(&["q1"]);
        req.area = TargetArea::PantaiTimur;
        let report = report(pipeline.discover(&req).await);

        assert_eq!(report.classifier, "llm");
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].company_name, "Pelabuhan Kuantan Marine Sdn Bhd");
        assert_eq!(report.out_of_area, 1);
        assert_eq!(report.unqualified, 1);
    }

    #[tokio::test]
    async fn test_rules_only_when_ai_disabled() {
        let search = ScriptedSearch::default().with("q1", vec![abc_kuantan()]);
        let pipeline = pipeline(search).with_classifier(Box::new(FixedClassifier {
            name: "llm",
            answer: Ok(vec![candidate("Other Sdn Bhd", State::Pahang)]),
        }));
        let mut req = request(&["q1"]);
        req.use_ai = false;
        let report = report(pipeline.discover(&req).await);
        assert_eq!(report.classifier, "rules");
    }

    #[tokio::test]
    async fn test_geocoder_marks_candidates_verified() {
        let search = ScriptedSearch::default().with("q1", vec![abc_kuantan()]);
        let pipeline = pipeline(search).with_geocoder(Arc::new(FixedGeocoder));
        let report = report(pipeline.discover(&request(&["q1"])).await);
        let lead = &report.candidates[0];
        assert!(lead.maps_verified);
        assert_eq!(lead.latitude, Some(3.8077));
        assert_eq!(lead.address.as_deref(), Some("Jalan Gebeng, Kuantan, Pahang"));
    }

    #[tokio::test]
    async fn test_directory_and_social_results_are_not_analysed() {
        let mut social = abc_kuantan();
        social.url = Some("https://www.facebook.com/abc".to_string());
        let listing = hit("Diesel Sdn Bhd directory", "generator suppliers");
        let search = ScriptedSearch::default().with("q1", vec![social, listing]);
        let report = report(pipeline(search).discover(&request(&["q1"])).await);
        assert_eq!(report.raw_results, 2);
        assert_eq!(report.analysed_results, 0);
        assert!(report.candidates.is_empty());
    }

    #[test]
    fn test_missing_search_key_is_reported() {
        let err = LeadPipeline::from_config(&Config::default()).err().unwrap();
        assert!(matches!(err, AppError::MissingCredential("FIRECRAWL_API_KEY")));
    }
}
