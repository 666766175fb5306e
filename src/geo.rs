//! Geographic validation of candidates, from text and optionally a geocoder.

use crate::classify::{Region, State, find_location};
use crate::error::{AppError, Result};
use crate::models::LeadCandidate;
use crate::processor::title_case;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const SERVICE: &str = "geocoder";

/// Where the text says a candidate is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedLocation {
    pub state: State,
    pub region: Region,
    pub city: Option<String>,
}

/// Resolves a location from free text. A known city wins over a state name,
/// which wins over the suggested state; otherwise the neutral marker.
pub(crate) fn validate_and_correct_location(text: &str, suggested: State) -> ResolvedLocation {
    let lowered = text.to_lowercase();
    if let Some(found) = find_location(&lowered) {
        return ResolvedLocation {
            state: found.state,
            region: found.state.region(),
            city: found.city.map(title_case),
        };
    }
    let state = if suggested.is_known() {
        suggested
    } else {
        State::Unknown
    };
    ResolvedLocation {
        state,
        region: state.region(),
        city: None,
    }
}

/// Re-validates a candidate's state, region and location against its own text.
pub(crate) fn apply_text_validation(candidate: &mut LeadCandidate) {
    let mut text = format!("{} {}", candidate.company_name, candidate.location);
    if candidate.state.is_known() {
        text.push(' ');
        text.push_str(candidate.state.label());
    }
    if let Some(address) = &candidate.address {
        text.push(' ');
        text.push_str(address);
    }

    let previous_label = candidate.state.label();
    let resolved = validate_and_correct_location(&text, candidate.state);
    if resolved.state != candidate.state {
        tracing::debug!(target: "geo_task",
            "Corrected '{}' from {} to {}", candidate.company_name, candidate.state, resolved.state
        );
    }

    candidate.location = match resolved.city {
        Some(city) => city,
        None if candidate.location.trim().is_empty() || candidate.location == previous_label => {
            resolved.state.label().to_string()
        }
        None => candidate.location.clone(),
    };
    candidate.state = resolved.state;
    candidate.region = resolved.region;
}

/// A geocoder's answer for one query.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GeocodeHit {
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
}

#[async_trait]
pub(crate) trait Geocoder: Send + Sync {
    /// `Ok(None)` means the service answered but found nothing.
    async fn geocode(&self, query: &str) -> Result<Option<GeocodeHit>>;
}

/// Per-run cache keyed by the exact query string. Misses are cached too.
#[derive(Debug, Default)]
pub(crate) struct GeocodeCache {
    entries: HashMap<String, Option<GeocodeHit>>,
}

impl GeocodeCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, query: &str) -> Option<&Option<GeocodeHit>> {
        self.entries.get(query)
    }
}

/// The free-text query sent to the geocoder for a candidate.
pub(crate) fn geocode_query(candidate: &LeadCandidate) -> String {
    let mut parts: Vec<&str> = vec![candidate.company_name.as_str()];
    if let Some(address) = &candidate.address {
        parts.push(address);
    }
    if candidate.location != candidate.state.label() {
        parts.push(&candidate.location);
    }
    if candidate.state.is_known() {
        parts.push(candidate.state.label());
    }
    parts.push("Malaysia");
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn apply_hit(candidate: &mut LeadCandidate, hit: &GeocodeHit) {
    if let Some(state) = hit.state.as_deref().and_then(State::from_name) {
        candidate.state = state;
    }
    candidate.region = candidate.state.region();
    if let Some(city) = hit.city.as_deref().filter(|c| !c.is_empty()) {
        candidate.location = city.to_string();
    }
    if let Some(address) = hit.formatted_address.as_deref().filter(|a| !a.is_empty()) {
        candidate.address = Some(address.to_string());
    }
    candidate.latitude = Some(hit.latitude);
    candidate.longitude = Some(hit.longitude);
    candidate.maps_verified = true;
}

/// Geocodes candidates concurrently, one call per distinct query not already
/// cached. Failures and misses leave the candidate's text-derived location.
pub(crate) async fn geocode_candidates(
    geocoder: &dyn Geocoder,
    candidates: &mut [LeadCandidate],
    cache: &mut GeocodeCache,
) {
    let queries: Vec<String> = candidates.iter().map(geocode_query).collect();

    let mut pending: Vec<&str> = Vec::new();
    for query in &queries {
        if cache.get(query).is_none() && !pending.contains(&query.as_str()) {
            pending.push(query);
        }
    }

    let answers = join_all(pending.iter().map(|q| geocoder.geocode(q))).await;
    for (query, answer) in pending.iter().zip(answers) {
        let hit = match answer {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(target: "geo_task", "Geocoding '{}' failed: {}", query, e);
                None
            }
        };
        cache.entries.insert(query.to_string(), hit);
    }

    let mut verified = 0;
    for (candidate, query) in candidates.iter_mut().zip(&queries) {
        if let Some(Some(hit)) = cache.get(query) {
            apply_hit(candidate, hit);
            verified += 1;
        }
    }
    tracing::info!(target: "geo_task",
        "Geocoded {}/{} candidates ({} cached queries)", verified, candidates.len(), cache.len()
    );
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    formatted_address: Option<String>,
    geometry: Geometry,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

fn component(components: &[AddressComponent], kind: &str) -> Option<String> {
    components
        .iter()
        .find(|c| c.types.iter().any(|t| t == kind))
        .map(|c| c.long_name.clone())
}

fn parse_geocode_response(response: GeocodeResponse) -> Result<Option<GeocodeHit>> {
    match response.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(None),
        other => {
            return Err(AppError::Upstream {
                service: SERVICE,
                status: 200,
                message: format!(
                    "{}: {}",
                    other,
                    response.error_message.unwrap_or_default()
                ),
            });
        }
    }
    let Some(first) = response.results.into_iter().next() else {
        return Ok(None);
    };
    let components = &first.address_components;
    Ok(Some(GeocodeHit {
        latitude: first.geometry.location.lat,
        longitude: first.geometry.location.lng,
        formatted_address: first.formatted_address.clone(),
        state: component(components, "administrative_area_level_1"),
        city: component(components, "locality")
            .or_else(|| component(components, "administrative_area_level_2")),
    }))
}

/// Google geocoding restricted to Malaysia.
pub(crate) struct GoogleGeocoder {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub(crate) fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<GeocodeHit>> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("address", query),
                ("key", self.api_key.as_str()),
                ("region", "my"),
                ("components", "country:MY"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(SERVICE, e.to_string()))?;
        parse_geocode_response(body)
    }
}
