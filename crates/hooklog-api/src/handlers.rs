use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use hooklog_proto::{
    parse_record_key, ActionResponse, CapturedRequest, ErrorResponse, HealthResponse,
    HistoryResponse, RequestRecord, SearchResponse,
};
use hooklog_store::{load_records, scan_all, SearchQuery, StoreError, SCAN_PAGE_SIZE};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::ApiError;
use crate::models::{DeleteParams, SearchParams};
use crate::AppState;

/// List every captured request
#[utoipa::path(
    get,
    path = "/api/history",
    responses(
        (status = 200, description = "All stored records", body = HistoryResponse),
        (status = 303, description = "No valid session, redirect to /login"),
        (status = 500, description = "Store failure", body = ErrorResponse)
    ),
    tag = "records"
)]
pub async fn history(State(state): State<Arc<AppState>>) -> Result<Json<HistoryResponse>, ApiError> {
    let load = load_records(state.store.as_ref())
        .await
        .map_err(ApiError::store("Failed to fetch history"))?;

    debug!(
        "History: {} records, {} skipped",
        load.records.len(),
        load.skipped
    );
    Ok(Json(HistoryResponse::from_records(load.records)))
}

/// Full-text search over captured requests
#[utoipa::path(
    get,
    path = "/api/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Search results", body = SearchResponse),
        (status = 500, description = "Index failure", body = SearchResponse)
    ),
    tag = "records"
)]
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Json<SearchResponse>) {
    let query = SearchQuery::new(params.query(), params.offset(), params.limit());
    debug!("Searching {:?}", query);

    let page = match state.store.search(&query).await {
        Ok(page) => page,
        Err(e) => {
            error!("Search for {:?} failed: {}", query.query, e);
            let message = match e {
                StoreError::Query(detail) => format!("Invalid search query: {}", detail),
                _ => "Search failed".to_string(),
            };
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SearchResponse::failed(message)),
            );
        }
    };

    let results: Vec<RequestRecord> = page
        .hits
        .into_iter()
        .filter_map(|hit| {
            let Some(key) = parse_record_key(&hit.id) else {
                warn!("Dropping search hit with non-numeric key {}", hit.id);
                return None;
            };
            match CapturedRequest::from_json(&hit.document) {
                Ok(request) => Some(RequestRecord::new(key, request)),
                Err(e) => {
                    warn!("Dropping invalid search hit {}: {}", hit.id, e);
                    None
                }
            }
        })
        .collect();

    (
        StatusCode::OK,
        Json(SearchResponse::found(page.total, results)),
    )
}

/// Delete one record
#[utoipa::path(
    delete,
    path = "/api/delete",
    params(DeleteParams),
    responses(
        (status = 200, description = "Record deleted", body = ActionResponse),
        (status = 400, description = "Missing or invalid id", body = ActionResponse),
        (status = 404, description = "No such record", body = ActionResponse),
        (status = 500, description = "Store failure", body = ActionResponse)
    ),
    tag = "records"
)]
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DeleteParams>,
) -> (StatusCode, Json<ActionResponse>) {
    let id = params.id.as_deref().map(str::trim).unwrap_or_default();
    if id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResponse::failed("Missing id")),
        );
    }
    // Only record keys; the log and page hash are not deletable here
    if id.parse::<i64>().is_err() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResponse::failed(format!("Invalid id: {}", id))),
        );
    }

    match state.store.delete(&[id.to_string()]).await {
        Ok(0) => (
            StatusCode::NOT_FOUND,
            Json(ActionResponse::failed(format!("Key {} not found", id))),
        ),
        Ok(_) => {
            info!("Deleted record {}", id);
            (
                StatusCode::OK,
                Json(ActionResponse::ok(format!("Deleted key {}", id))),
            )
        }
        Err(e) => {
            error!("Failed to delete record {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResponse::failed("Failed to delete key")),
            )
        }
    }
}

/// Delete every key in the store
#[utoipa::path(
    delete,
    path = "/api/delete-all",
    responses(
        (status = 200, description = "Keys deleted", body = ActionResponse),
        (status = 500, description = "Store failure", body = ActionResponse)
    ),
    tag = "records"
)]
pub async fn delete_all(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ActionResponse>) {
    let result = async {
        let keys = scan_all(state.store.as_ref(), SCAN_PAGE_SIZE).await?;
        state.store.delete(&keys).await
    }
    .await;

    match result {
        Ok(removed) => {
            info!("Deleted {} keys", removed);
            (
                StatusCode::OK,
                Json(ActionResponse::ok(format!("Deleted {} keys", removed))),
            )
        }
        Err(e) => {
            error!("Failed to delete all keys: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResponse::failed("Failed to delete keys")),
            )
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store_up = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check: {} store unavailable: {}", state.store.name(), e);
            false
        }
    };

    Json(HealthResponse {
        status: if store_up { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: if store_up { "up" } else { "down" }.to_string(),
    })
}

/// Landing page: the API docs
pub async fn root() -> Redirect {
    Redirect::to("/swagger-ui/")
}
