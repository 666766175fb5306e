//! Client for the LLM gateway that classifies and scores search results.
//!
//! The gateway speaks the OpenAI chat-completions dialect. We force a single
//! `analyze_leads` tool call so the answer arrives as structured JSON instead
//! of prose.

use crate::classify::{State, TargetArea, classify_state};
use crate::error::{AppError, Result};
use crate::models::{CandidateSource, LeadCandidate, SearchResult};
use crate::patterns::truncate_chars;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use std::time::Duration;

const SERVICE: &str = "llm";
const TOOL_NAME: &str = "analyze_leads";
const MAX_RESULTS_IN_PROMPT: usize = 20;
const MAX_EXCLUSIONS_IN_PROMPT: usize = 50;
const MARKDOWN_EXCERPT_LEN: usize = 500;

const SYSTEM_PROMPT: &str = "You are an expert lead analyst specializing in identifying diesel fuel consumers in Malaysia.

Analyze web search results and identify real, high-quality business leads that need diesel fuel.

Requirements:
1. Only identify real registered Malaysian businesses with \"Sdn Bhd\", \"Berhad\", \"Enterprise\", \"Industries\" or a similar registration.
2. Extract the exact registered company name.
3. Verify the location against known Malaysian states and cities.
4. Focus on heavy diesel users: palm oil mills and plantations (18,000+ L/month), construction with heavy machinery (12,000+), mining and quarrying (22,000+), transport and logistics fleets (10,000+), manufacturing with generators (15,000+), marine and port operations (20,000+), timber and logging (14,000+), oil and gas services (25,000+).
5. Exclude directory listings, news articles, job postings, social media pages, blogs, forums, retail fuel stations and companies without clear registration.
6. Regions: Pantai Timur = Terengganu, Kelantan, Pahang. Utara = Penang, Perak, Kedah, Perlis. Tengah = Selangor, Kuala Lumpur, Negeri Sembilan. Selatan = Johor, Melaka. East Malaysia = Sabah, Sarawak.
7. Look for diesel need signals: generators and gensets, heavy machinery, truck and lorry fleets, backup power, construction sites, mining equipment.
8. Detect buyer intent such as \"cari diesel\", \"pembekal diesel\", \"diesel supplier\", bulk purchase or tender mentions.

Only return leads genuinely likely to need bulk diesel (at least 5,460 L/month). Be conservative: quality over quantity.";

/// Inputs to one analysis call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AnalysisRequest<'a> {
    pub results: &'a [SearchResult],
    pub area: TargetArea,
    pub min_usage: u32,
    pub existing_names: &'a [String],
}

/// Structured answer returned through the tool call.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnalysisReport {
    #[serde(default)]
    pub leads: Vec<AnalyzedLead>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_qualified: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub active_searchers: u32,
}

/// Schema numbers may come back as floats or `null`.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?
        .filter(|n| n.is_finite())
        .unwrap_or(0.0))
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    let n = lenient_number(deserializer)?;
    Ok(n.max(0.0).round().min(u32::MAX as f64) as u32)
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub(crate) struct ContactInfo {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// One lead as the model describes it.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnalyzedLead {
    pub company_name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub estimated_usage: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub confidence: f64,
    #[serde(default)]
    pub diesel_need_indicators: Vec<String>,
    #[serde(default)]
    pub contact_info: Option<ContactInfo>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub search_intent: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AnalyzedLead {
    /// Converts the model's view into a candidate. Confidence becomes the
    /// quality score; the region is always re-derived from the state.
    pub(crate) fn into_candidate(self) -> LeadCandidate {
        let state = State::from_name(&self.state).unwrap_or_else(|| classify_state(&self.location));
        let location = if self.location.trim().is_empty() {
            state.label().to_string()
        } else {
            self.location.trim().to_string()
        };
        let contact = self.contact_info.unwrap_or_default();
        let industry = if self.industry.trim().is_empty() {
            "Industrial".to_string()
        } else {
            self.industry
        };

        LeadCandidate {
            company_name: self.company_name.trim().to_string(),
            industry,
            state,
            region: state.region(),
            location,
            contact_phone: non_empty(contact.phone),
            contact_email: non_empty(contact.email).map(|e| e.to_lowercase()),
            address: non_empty(contact.address),
            latitude: self.latitude,
            longitude: self.longitude,
            estimated_usage: self.estimated_usage.max(0.0).round() as u32,
            quality_score: self.confidence.clamp(0.0, 100.0).round() as u8,
            quality_factors: self.diesel_need_indicators,
            source: CandidateSource::Ai,
            source_url: None,
            snippet: self.reasoning.clone(),
            reasoning: Some(self.reasoning).filter(|r| !r.trim().is_empty()),
            search_intent: non_empty(self.search_intent),
            maps_verified: false,
        }
    }
}

fn area_name(area: TargetArea) -> &'static str {
    match area {
        TargetArea::All => "Malaysia",
        other => other.label(),
    }
}

/// Builds the user prompt from the aggregated results.
pub(crate) fn build_user_prompt(request: &AnalysisRequest<'_>) -> String {
    let mut prompt = format!(
        "Analyze these search results and identify qualified diesel leads for the {} region.\nMinimum estimated usage: {} liters/month.\n",
        area_name(request.area),
        request.min_usage
    );

    if !request.existing_names.is_empty() {
        let excluded: Vec<&str> = request
            .existing_names
            .iter()
            .take(MAX_EXCLUSIONS_IN_PROMPT)
            .map(String::as_str)
            .collect();
        prompt.push_str(&format!(
            "\nEXCLUDE these companies (already in database): {}\n",
            excluded.join(", ")
        ));
    }

    prompt.push_str("\nSearch Results to Analyze:\n");
    for (i, result) in request
        .results
        .iter()
        .take(MAX_RESULTS_IN_PROMPT)
        .enumerate()
    {
        prompt.push_str(&format!(
            "[{}] Title: {}\nURL: {}\nDescription: {}\nContent: {}\n---\n",
            i + 1,
            or_na(result.title()),
            or_na(result.url()),
            or_na(result.description()),
            truncate_chars(result.markdown(), MARKDOWN_EXCERPT_LEN)
        ));
    }

    prompt.push_str(&format!(
        "\nFor each valid new lead give the exact company name, industry, verified state and city, \
estimated monthly diesel usage, a 0-100 confidence, diesel need indicators, contact info, \
reasoning, priority (high/medium/low) and any detected buyer intent.\n\
Return only leads with confidence >= 60, estimated usage >= {}L, a real registered business name \
and a valid Malaysian location. Do not fabricate information.",
        request.min_usage
    ));
    prompt
}

fn or_na(s: &str) -> &str {
    if s.is_empty() { "N/A" } else { s }
}

fn tool_definition() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": TOOL_NAME,
            "description": "Return analyzed diesel leads with quality scores",
            "parameters": {
                "type": "object",
                "properties": {
                    "leads": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "companyName": {"type": "string", "description": "Exact registered company name"},
                                "industry": {"type": "string"},
                                "location": {"type": "string", "description": "City or area name"},
                                "state": {"type": "string", "description": "Malaysian state"},
                                "region": {"type": "string"},
                                "estimatedUsage": {"type": "number", "description": "Monthly diesel usage in liters"},
                                "confidence": {"type": "number", "description": "Confidence score 0-100"},
                                "dieselNeedIndicators": {"type": "array", "items": {"type": "string"}},
                                "contactInfo": {
                                    "type": "object",
                                    "properties": {
                                        "phone": {"type": "string"},
                                        "email": {"type": "string"},
                                        "address": {"type": "string"}
                                    }
                                },
                                "reasoning": {"type": "string"},
                                "priority": {"type": "string", "enum": ["high", "medium", "low"]},
                                "searchIntent": {"type": "string", "description": "Detected buyer intent if any"}
                            },
                            "required": ["companyName", "industry", "state", "estimatedUsage", "confidence", "dieselNeedIndicators", "reasoning", "priority"]
                        }
                    },
                    "summary": {"type": "string"},
                    "totalQualified": {"type": "number"},
                    "activeSearchers": {"type": "number", "description": "Number of leads with buyer intent"}
                },
                "required": ["leads", "summary", "totalQualified"]
            }
        }
    })
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    #[serde(default)]
    arguments: String,
}

/// Extracts the forced tool call's arguments from a chat-completions body.
fn parse_tool_call(body: &str) -> Result<AnalysisReport> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| AppError::MalformedResponse(SERVICE, e.to_string()))?;
    let arguments = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.tool_calls.into_iter().next())
        .map(|t| t.function.arguments)
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| AppError::MalformedResponse(SERVICE, "no tool call in response".to_string()))?;
    serde_json::from_str(&arguments)
        .map_err(|e| AppError::MalformedResponse(SERVICE, format!("bad tool arguments: {}", e)))
}

/// HTTP client for the chat-completions gateway.
pub(crate) struct LlmGateway {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmGateway {
    pub(crate) fn new(endpoint: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub(crate) async fn analyze_leads(&self, request: &AnalysisRequest<'_>) -> Result<AnalysisReport> {
        tracing::info!(target: "classify_task",
            "Sending {} results to the LLM for area {} ({} exclusions)",
            request.results.len().min(MAX_RESULTS_IN_PROMPT),
            area_name(request.area),
            request.existing_names.len().min(MAX_EXCLUSIONS_IN_PROMPT)
        );

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_user_prompt(request)},
            ],
            "tools": [tool_definition()],
            "tool_choice": {"type": "function", "function": {"name": TOOL_NAME}},
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(SERVICE)
                } else {
                    AppError::Request(e)
                }
            })?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(AppError::RateLimited(SERVICE)),
            StatusCode::PAYMENT_REQUIRED => return Err(AppError::PaymentRequired(SERVICE)),
            s if !s.is_success() => {
                let message = response.text().await.unwrap_or_default();
                tracing::error!(target: "classify_task", "LLM gateway error {}: {}", s, message);
                return Err(AppError::Upstream {
                    service: SERVICE,
                    status: s.as_u16(),
                    message,
                });
            }
            _ => {}
        }

        let text = response.text().await?;
        let report = parse_tool_call(&text)?;
        tracing::info!(target: "classify_task",
            "LLM returned {} leads, {} active searchers",
            report.leads.len(),
            report.active_searchers
        );
        Ok(report)
    }
}
