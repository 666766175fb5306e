//! HTTP API for diesel-leads.

use crate::app::{AppState, DiscoverParams};
use crate::classify::TargetArea;
use crate::error::AppError;
use crate::models::{ClientStatus, LeadCandidate};
use crate::store::ClientFilter;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;
use warp::{Filter, Rejection, Reply, http::StatusCode};

/// API response envelope
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: impl Into<String>, result: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            result: Some(result),
        }
    }
}

fn failure(message: impl Into<String>, status: StatusCode) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&ApiResponse::<()> {
            success: false,
            message: message.into(),
            result: None,
        }),
        status,
    )
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DiscoverBody {
    area: Option<TargetArea>,
    custom_query: Option<String>,
    min_usage: Option<u32>,
    use_ai: Option<bool>,
    owner: Option<String>,
}

#[derive(Deserialize)]
struct ImportBody {
    candidates: Vec<LeadCandidate>,
    owner: Option<String>,
}

#[derive(Deserialize)]
struct ClientsQuery {
    archived: Option<bool>,
    owner: Option<String>,
}

#[derive(Deserialize)]
struct IdsBody {
    ids: Vec<Uuid>,
}

#[derive(Deserialize)]
struct StatusBody {
    ids: Vec<Uuid>,
    status: ClientStatus,
}

#[derive(Deserialize, Default)]
struct SyncBody {
    owner: Option<String>,
}

#[derive(Serialize)]
struct ChangedCount {
    changed: usize,
}

/// Wraps a domain error so it can travel as a rejection.
#[derive(Debug)]
struct ApiError(AppError);

impl warp::reject::Reject for ApiError {}

fn reject(err: AppError) -> Rejection {
    warp::reject::custom(ApiError(err))
}

fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AppError::Upstream { .. } | AppError::MalformedResponse(..) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// All routes, with CORS and error recovery applied.
pub(crate) fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());

    let health = warp::path("health").and(warp::get()).and(warp::path::end()).map(|| {
        warp::reply::json(&ApiResponse::<()> {
            success: true,
            message: "Diesel Leads API is running".to_string(),
            result: None,
        })
    });

    let discover = warp::path("discover")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(handle_discover);

    let import = warp::path("import")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(handle_import);

    let clients = warp::path("clients")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<ClientsQuery>())
        .and(state_filter.clone())
        .and_then(handle_list_clients);

    let batch = warp::path!("clients" / String)
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(handle_batch);

    let status = warp::path!("clients" / "status")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(handle_status);

    let sync = warp::path("sync-sheets")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json().or(warp::any().map(SyncBody::default)).unify())
        .and(state_filter)
        .and_then(handle_sync);

    health
        .or(discover)
        .or(import)
        .or(clients)
        .or(status)
        .or(batch)
        .or(sync)
        .recover(handle_rejection)
        .with(warp::cors().allow_any_origin())
}

/// Start the API server
pub(crate) async fn start_api_server(state: Arc<AppState>, port: u16) {
    tracing::info!(target: "api", "Starting API server on port {}", port);
    warp::serve(routes(state)).run(([0, 0, 0, 0], port)).await;
}

async fn handle_discover(body: DiscoverBody, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    tracing::info!(target: "api", "Discovery request for area {:?}", body.area);
    let params = DiscoverParams {
        area: body.area,
        custom_query: body.custom_query,
        min_usage: body.min_usage,
        use_ai: body.use_ai,
        owner: body.owner,
    };
    let outcome = state.discover(params).await.map_err(reject)?;
    Ok(warp::reply::json(&ApiResponse::ok(outcome.message(), outcome)))
}

async fn handle_import(body: ImportBody, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    tracing::info!(target: "api", "Importing {} candidates", body.candidates.len());
    let summary = state
        .import(body.owner.as_deref(), &body.candidates)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&ApiResponse::ok(summary.to_string(), summary)))
}

async fn handle_list_clients(query: ClientsQuery, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let filter = ClientFilter {
        archived: query.archived,
        owner: query.owner.or_else(|| state.config.owner.clone()),
    };
    let clients = state.store.list(&filter).await.map_err(reject)?;
    Ok(warp::reply::json(&ApiResponse::ok(
        format!("{} clients", clients.len()),
        clients,
    )))
}

async fn handle_batch(action: String, body: IdsBody, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let changed = match action.as_str() {
        "archive" => state.store.archive(&body.ids).await,
        "restore" => state.store.restore(&body.ids).await,
        "delete" => state.store.delete(&body.ids).await,
        other => Err(AppError::NotFound(format!("unknown client action '{}'", other))),
    }
    .map_err(reject)?;
    tracing::info!(target: "api", "{} applied to {} clients", action, changed);
    Ok(warp::reply::json(&ApiResponse::ok(
        format!("{} clients updated", changed),
        ChangedCount { changed },
    )))
}

async fn handle_status(body: StatusBody, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let changed = state
        .store
        .update_status(&body.ids, body.status)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&ApiResponse::ok(
        format!("{} clients updated", changed),
        ChangedCount { changed },
    )))
}

async fn handle_sync(body: SyncBody, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let report = state.sync_sheets(body.owner.as_deref()).await.map_err(reject)?;
    Ok(warp::reply::json(&ApiResponse::ok(
        format!("Synced {} rows to Google Sheets", report.rows_written),
        report,
    )))
}

/// Handle API rejections
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if err.is_not_found() {
        Ok(failure("Not Found", StatusCode::NOT_FOUND))
    } else if let Some(ApiError(e)) = err.find::<ApiError>() {
        let status = status_for(e);
        if status.is_server_error() {
            tracing::error!(target: "api", "Request failed: {}", e);
        } else {
            tracing::warn!(target: "api", "Request rejected: {}", e);
        }
        Ok(failure(e.to_string(), status))
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        Ok(failure("Invalid request body", StatusCode::BAD_REQUEST))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        Ok(failure("Method not allowed", StatusCode::METHOD_NOT_ALLOWED))
    } else {
        Ok(failure("Bad request", StatusCode::BAD_REQUEST))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::state_with;
    use crate::pipeline::tests::{ScriptedSearch, hit};
    use serde_json::{Value, json};

    async fn api(search: ScriptedSearch, dir: &tempfile::TempDir) -> Arc<AppState> {
        Arc::new(state_with(search, dir).await)
    }

    fn body(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let filter = routes(api(ScriptedSearch::default(), &dir).await);
        let res = warp::test::request().method("GET").path("/health").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(&res)["success"], json!(true));
    }

    #[tokio::test]
    async fn test_discover_import_and_archive() {
        let dir = tempfile::tempdir().unwrap();
        let search = ScriptedSearch::default().with(
            "genset kuantan",
            vec![hit("ABC Sdn Bhd diesel generator Kuantan", "Standby genset hire for plants")],
        );
        let filter = routes(api(search, &dir).await);

        let res = warp::test::request()
            .method("POST")
            .path("/discover")
            .json(&json!({"area": "Pantai Timur", "customQuery": "genset kuantan"}))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let discovered = body(&res);
        assert_eq!(discovered["message"], json!("Found 1 qualified leads"));
        assert_eq!(discovered["result"]["status"], json!("completed"));
        let candidates = discovered["result"]["candidates"].clone();

        let res = warp::test::request()
            .method("POST")
            .path("/import")
            .json(&json!({ "candidates": candidates }))
            .reply(&filter)
            .await;
        assert_eq!(body(&res)["message"], json!("1 imported, 0 duplicates skipped"));

        let res = warp::test::request().method("GET").path("/clients").reply(&filter).await;
        let listed = body(&res);
        let id = listed["result"][0]["id"].clone();

        let res = warp::test::request()
            .method("POST")
            .path("/clients/archive")
            .json(&json!({ "ids": [id] }))
            .reply(&filter)
            .await;
        assert_eq!(body(&res)["result"]["changed"], json!(1));

        let res = warp::test::request()
            .method("GET")
            .path("/clients?archived=true")
            .reply(&filter)
            .await;
        assert_eq!(body(&res)["result"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_no_results_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let filter = routes(api(ScriptedSearch::default(), &dir).await);
        let res = warp::test::request()
            .method("POST")
            .path("/discover")
            .json(&json!({"customQuery": "nothing here"}))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(&res)["result"]["status"], json!("noResults"));
    }

    #[tokio::test]
    async fn test_errors_use_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let filter = routes(api(ScriptedSearch::default(), &dir).await);

        let res = warp::test::request()
            .method("POST")
            .path("/clients/delete")
            .json(&json!({ "ids": [Uuid::new_v4()] }))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(&res)["result"]["changed"], json!(0));

        let res = warp::test::request()
            .method("POST")
            .path("/clients/purge")
            .json(&json!({ "ids": [Uuid::new_v4()] }))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&res)["success"], json!(false));

        let res = warp::test::request()
            .method("POST")
            .path("/sync-sheets")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let res = warp::test::request()
            .method("POST")
            .path("/import")
            .body("not json")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
