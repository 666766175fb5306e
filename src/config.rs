//! Defines the configuration settings for the diesel-leads application.

use crate::queries::{DEFAULT_HISTORY_LEN, QUERIES_PER_RUN};
use crate::scoring::{MIN_ORDER_LITERS, Thresholds};
use crate::search::SearchOptions;
use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options shared by every subcommand.
#[derive(Args, Debug, Default, Clone)]
pub(crate) struct AppArgs {
    /// Path to configuration file (TOML format)
    #[arg(long = "config", global = true, env = "DIESEL_LEADS_CONFIG")]
    pub config_file: Option<String>,

    /// JSON file holding the client records
    #[arg(long, global = true, env = "DIESEL_LEADS_STORE")]
    pub store_file: Option<PathBuf>,

    /// JSON file holding recently used search queries
    #[arg(long, global = true, env = "DIESEL_LEADS_HISTORY")]
    pub history_file: Option<PathBuf>,

    /// Owner recorded on imported clients and used to scope listings
    #[arg(long, global = true, env = "DIESEL_LEADS_OWNER")]
    pub owner: Option<String>,

    /// Maximum number of bank queries issued per discovery run
    #[arg(long, global = true, env = "DIESEL_LEADS_MAX_QUERIES")]
    pub max_queries: Option<usize>,

    /// Delay between consecutive search queries (milliseconds)
    #[arg(long, global = true, env = "DIESEL_LEADS_QUERY_DELAY_MS")]
    pub query_delay_ms: Option<u64>,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, env = "DIESEL_LEADS_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// Minimum estimated monthly usage (litres) for a lead to qualify
    #[arg(long, global = true, env = "DIESEL_LEADS_MIN_USAGE")]
    pub min_usage: Option<u32>,

    /// Minimum score for rule-based leads (0-100)
    #[arg(long, global = true, env = "DIESEL_LEADS_RULE_THRESHOLD")]
    pub rule_threshold: Option<u8>,

    /// Minimum confidence for AI-analysed leads (0-100)
    #[arg(long, global = true, env = "DIESEL_LEADS_AI_THRESHOLD")]
    pub ai_threshold: Option<u8>,

    /// Email address that receives lead digests
    #[arg(long, global = true, env = "DIESEL_LEADS_NOTIFY_EMAIL")]
    pub notify_email: Option<String>,

    /// Minimum score for a lead to be included in a notification
    #[arg(long, global = true, env = "DIESEL_LEADS_NOTIFY_THRESHOLD")]
    pub notify_threshold: Option<u8>,

    /// Spreadsheet that client records are exported to
    #[arg(long, global = true, env = "DIESEL_LEADS_SPREADSHEET_ID")]
    pub spreadsheet_id: Option<String>,

    /// Skip the LLM classifier and use keyword rules only
    #[arg(long, global = true, default_value = "false", env = "DIESEL_LEADS_NO_AI")]
    pub no_ai: bool,

    /// Skip geocoding even when a maps key is configured
    #[arg(long, global = true, default_value = "false", env = "DIESEL_LEADS_NO_GEOCODE")]
    pub no_geocode: bool,
}

/// TOML Configuration file structure
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    search: Option<SearchConfig>,
    llm: Option<LlmConfig>,
    geocoder: Option<GeocoderConfig>,
    qualification: Option<QualificationConfig>,
    storage: Option<StorageConfig>,
    notify: Option<NotifyConfig>,
    sheets: Option<SheetsConfig>,
    api: Option<ApiConfig>,
}

#[derive(Deserialize, Debug, Default)]
struct SearchConfig {
    base_url: Option<String>,
    limit: Option<u32>,
    lang: Option<String>,
    country: Option<String>,
    formats: Option<Vec<String>>,
    max_queries: Option<usize>,
    query_delay_ms: Option<u64>,
    request_timeout: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
struct LlmConfig {
    enabled: Option<bool>,
    endpoint: Option<String>,
    model: Option<String>,
    timeout: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
struct GeocoderConfig {
    enabled: Option<bool>,
    endpoint: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct QualificationConfig {
    min_usage: Option<u32>,
    rule_threshold: Option<u8>,
    ai_threshold: Option<u8>,
}

#[derive(Deserialize, Debug, Default)]
struct StorageConfig {
    store_file: Option<PathBuf>,
    history_file: Option<PathBuf>,
    history_length: Option<usize>,
    owner: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct NotifyConfig {
    recipient: Option<String>,
    threshold: Option<u8>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    sender: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct SheetsConfig {
    spreadsheet_id: Option<String>,
    api_base: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct ApiConfig {
    port: Option<u16>,
}

/// Credentials read from the environment. Each one enables a capability.
#[derive(Clone, Default)]
pub(crate) struct Secrets {
    pub firecrawl_api_key: Option<String>,
    pub llm_api_key: Option<String>,
    pub google_maps_api_key: Option<String>,
    pub google_service_account_key: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
}

impl Secrets {
    pub(crate) fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            firecrawl_api_key: var("FIRECRAWL_API_KEY"),
            llm_api_key: var("LLM_GATEWAY_API_KEY"),
            google_maps_api_key: var("GOOGLE_MAPS_API_KEY"),
            google_service_account_key: var("GOOGLE_SERVICE_ACCOUNT_KEY"),
            smtp_username: var("SMTP_USERNAME"),
            smtp_password: var("SMTP_PASSWORD"),
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("firecrawl_api_key", &state(&self.firecrawl_api_key))
            .field("llm_api_key", &state(&self.llm_api_key))
            .field("google_maps_api_key", &state(&self.google_maps_api_key))
            .field("google_service_account_key", &state(&self.google_service_account_key))
            .field("smtp_username", &state(&self.smtp_username))
            .field("smtp_password", &state(&self.smtp_password))
            .finish()
    }
}

/// Application configuration settings.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Base URL of the search API.
    pub search_base_url: String,
    /// Options sent with every search query.
    pub search_options: SearchOptions,
    /// Maximum number of bank queries per discovery run.
    pub max_queries: usize,
    /// Pause between consecutive search queries.
    pub query_delay: Duration,
    /// Timeout for individual HTTP requests.
    pub request_timeout: Duration,
    pub use_ai: bool,
    pub llm_endpoint: String,
    pub llm_model: String,
    /// Upper bound on one LLM analysis call.
    pub llm_timeout: Duration,
    pub use_geocoder: bool,
    pub geocoder_endpoint: String,
    /// Minimum estimated monthly usage in litres.
    pub min_usage: u32,
    pub thresholds: Thresholds,
    /// How many recent queries are remembered per area.
    pub history_length: usize,
    pub history_file: PathBuf,
    pub store_file: PathBuf,
    /// Owner of imported clients; `None` means unscoped.
    pub owner: Option<String>,
    pub notify_recipient: Option<String>,
    /// Minimum score for a lead to appear in a notification.
    pub notify_threshold: u8,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Defaults to the SMTP username when unset.
    pub smtp_sender: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub sheets_api_base: String,
    pub api_port: u16,
    pub secrets: Secrets,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            search_base_url: "https://api.firecrawl.dev".to_string(),
            search_options: SearchOptions::default(),
            max_queries: QUERIES_PER_RUN,
            query_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            use_ai: true,
            llm_endpoint: "https://ai.gateway.lovable.dev/v1/chat/completions".to_string(),
            llm_model: "google/gemini-3-flash-preview".to_string(),
            llm_timeout: Duration::from_secs(60),
            use_geocoder: true,
            geocoder_endpoint: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            min_usage: MIN_ORDER_LITERS,
            thresholds: Thresholds::default(),
            history_length: DEFAULT_HISTORY_LEN,
            history_file: PathBuf::from("query-history.json"),
            store_file: PathBuf::from("diesel-clients.json"),
            owner: None,
            notify_recipient: None,
            notify_threshold: 60,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            smtp_sender: None,
            spreadsheet_id: None,
            sheets_api_base: "https://sheets.googleapis.com".to_string(),
            api_port: 8080,
            secrets: Secrets::default(),
        }
    }
}

/// Load configuration from a TOML file
fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() {
        tracing::warn!("Configuration file {} not found, using defaults", file_path);
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::info!("Loaded configuration from {}", file_path);
    Ok(config)
}

fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    if let Some(search) = &file_config.search {
        if let Some(base_url) = &search.base_url {
            config.search_base_url = base_url.clone();
        }
        if let Some(limit) = search.limit {
            config.search_options.limit = limit;
        }
        if let Some(lang) = &search.lang {
            config.search_options.lang = lang.clone();
        }
        if let Some(country) = &search.country {
            config.search_options.country = country.clone();
        }
        if let Some(formats) = &search.formats {
            config.search_options.formats = formats.clone();
        }
        if let Some(max_queries) = search.max_queries {
            config.max_queries = max_queries;
        }
        if let Some(delay) = search.query_delay_ms {
            config.query_delay = Duration::from_millis(delay);
        }
        if let Some(timeout) = search.request_timeout {
            config.request_timeout = Duration::from_secs(timeout);
        }
    }

    if let Some(llm) = &file_config.llm {
        if let Some(enabled) = llm.enabled {
            config.use_ai = enabled;
        }
        if let Some(endpoint) = &llm.endpoint {
            config.llm_endpoint = endpoint.clone();
        }
        if let Some(model) = &llm.model {
            config.llm_model = model.clone();
        }
        if let Some(timeout) = llm.timeout {
            config.llm_timeout = Duration::from_secs(timeout);
        }
    }

    if let Some(geocoder) = &file_config.geocoder {
        if let Some(enabled) = geocoder.enabled {
            config.use_geocoder = enabled;
        }
        if let Some(endpoint) = &geocoder.endpoint {
            config.geocoder_endpoint = endpoint.clone();
        }
    }

    if let Some(qualification) = &file_config.qualification {
        if let Some(min_usage) = qualification.min_usage {
            config.min_usage = min_usage;
        }
        if let Some(threshold) = qualification.rule_threshold {
            config.thresholds.rules = threshold;
        }
        if let Some(threshold) = qualification.ai_threshold {
            config.thresholds.ai = threshold;
        }
    }

    if let Some(storage) = &file_config.storage {
        if let Some(file) = &storage.store_file {
            config.store_file = file.clone();
        }
        if let Some(file) = &storage.history_file {
            config.history_file = file.clone();
        }
        if let Some(length) = storage.history_length {
            config.history_length = length;
        }
        if let Some(owner) = &storage.owner {
            config.owner = Some(owner.clone());
        }
    }

    if let Some(notify) = &file_config.notify {
        if let Some(recipient) = &notify.recipient {
            config.notify_recipient = Some(recipient.clone());
        }
        if let Some(threshold) = notify.threshold {
            config.notify_threshold = threshold;
        }
        if let Some(host) = &notify.smtp_host {
            config.smtp_host = host.clone();
        }
        if let Some(port) = notify.smtp_port {
            config.smtp_port = port;
        }
        if let Some(sender) = &notify.sender {
            config.smtp_sender = Some(sender.clone());
        }
    }

    if let Some(sheets) = &file_config.sheets {
        if let Some(id) = &sheets.spreadsheet_id {
            config.spreadsheet_id = Some(id.clone());
        }
        if let Some(base) = &sheets.api_base {
            config.sheets_api_base = base.clone();
        }
    }

    if let Some(api) = &file_config.api {
        if let Some(port) = api.port {
            config.api_port = port;
        }
    }
}

/// Apply command line arguments to the Config instance
fn apply_cli_args(config: &mut Config, args: &AppArgs) {
    if let Some(ref file) = args.store_file {
        config.store_file = file.clone();
    }

    if let Some(ref file) = args.history_file {
        config.history_file = file.clone();
    }

    if let Some(ref owner) = args.owner {
        config.owner = Some(owner.clone());
    }

    if let Some(max_queries) = args.max_queries {
        config.max_queries = max_queries;
    }

    if let Some(delay) = args.query_delay_ms {
        config.query_delay = Duration::from_millis(delay);
    }

    if let Some(timeout) = args.request_timeout {
        config.request_timeout = Duration::from_secs(timeout);
    }

    if let Some(min_usage) = args.min_usage {
        config.min_usage = min_usage;
    }

    if let Some(threshold) = args.rule_threshold {
        config.thresholds.rules = threshold;
    }

    if let Some(threshold) = args.ai_threshold {
        config.thresholds.ai = threshold;
    }

    if let Some(ref recipient) = args.notify_email {
        config.notify_recipient = Some(recipient.clone());
    }

    if let Some(threshold) = args.notify_threshold {
        config.notify_threshold = threshold;
    }

    if let Some(ref id) = args.spreadsheet_id {
        config.spreadsheet_id = Some(id.clone());
    }

    if args.no_ai {
        config.use_ai = false;
    }

    if args.no_geocode {
        config.use_geocoder = false;
    }
}

fn validate_config(config: &mut Config) -> anyhow::Result<()> {
    if config.max_queries == 0 {
        config.max_queries = 1;
        tracing::warn!("Max queries was set to 0. Setting to 1.");
    }

    if config.search_options.limit == 0 {
        config.search_options.limit = 1;
        tracing::warn!("Search result limit was set to 0. Setting to 1.");
    }

    if config.search_options.formats.is_empty() {
        config.search_options.formats = vec!["markdown".to_string()];
        tracing::warn!("Search formats list was empty. Setting to markdown.");
    }

    if config.history_length == 0 {
        config.history_length = 1;
        tracing::warn!("Query history length was set to 0. Setting to 1.");
    }

    for (name, value) in [
        ("Rule threshold", &mut config.thresholds.rules),
        ("AI threshold", &mut config.thresholds.ai),
        ("Notification threshold", &mut config.notify_threshold),
    ] {
        if *value > 100 {
            *value = 100;
            tracing::warn!("{} exceeded maximum (100). Setting to 100.", name);
        }
    }

    if config.llm_timeout.is_zero() {
        config.llm_timeout = Duration::from_secs(60);
        tracing::warn!("LLM timeout was set to 0. Setting to 60 seconds.");
    }

    if config.request_timeout.is_zero() {
        config.request_timeout = Duration::from_secs(30);
        tracing::warn!("Request timeout was set to 0. Setting to 30 seconds.");
    }

    if config.notify_recipient.as_deref().is_some_and(|r| r.trim().is_empty()) {
        config.notify_recipient = None;
    }

    Ok(())
}

/// Builds the configuration: defaults, then the TOML file, then CLI and
/// environment values.
pub(crate) fn build_config(args: &AppArgs) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(ref file_path) = args.config_file {
        let file_config = load_config_file(file_path)?;
        apply_file_config(&mut config, &file_config);
    } else {
        for path in ["./diesel-leads.toml", "./config.toml"] {
            if Path::new(path).exists() {
                match load_config_file(path) {
                    Ok(file_config) => {
                        apply_file_config(&mut config, &file_config);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load configuration from {}: {}", path, e);
                    }
                }
            }
        }
    }

    apply_cli_args(&mut config, args);
    config.secrets = Secrets::from_env();

    validate_config(&mut config)?;

    tracing::debug!("Final configuration: {:?}", config);

    Ok(config)
}
