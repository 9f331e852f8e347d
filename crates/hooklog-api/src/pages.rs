use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use hooklog_proto::{ActionResponse, PageInput, StoredPage, ValidationErrorResponse};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::models::PageDeleteParams;
use crate::AppState;

/// List custom pages keyed by endpoint
#[utoipa::path(
    get,
    path = "/api/create",
    responses(
        (status = 200, description = "Pages keyed by endpoint", body = BTreeMap<String, StoredPage>),
        (status = 500, description = "Store failure", body = hooklog_proto::ErrorResponse)
    ),
    tag = "pages"
)]
pub async fn list_pages(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, StoredPage>>, ApiError> {
    let raw = state
        .store
        .pages()
        .await
        .map_err(ApiError::store("Failed to fetch pages"))?;

    let pages = raw
        .into_iter()
        .filter_map(
            |(endpoint, value)| match serde_json::from_str::<StoredPage>(&value) {
                Ok(page) => Some((endpoint, page)),
                Err(e) => {
                    warn!("Skipping unparseable page {}: {}", endpoint, e);
                    None
                }
            },
        )
        .collect();

    Ok(Json(pages))
}

/// Create or overwrite a page
#[utoipa::path(
    post,
    path = "/api/create",
    request_body = PageInput,
    responses(
        (status = 200, description = "Page saved", body = ActionResponse),
        (status = 400, description = "Validation failed", body = ValidationErrorResponse),
        (status = 500, description = "Store failure", body = hooklog_proto::ErrorResponse)
    ),
    tag = "pages"
)]
pub async fn create_page(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PageInput>, JsonRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let (endpoint, stored) = validated(body)?;
    state
        .store
        .put_page(&endpoint, &stored)
        .await
        .map_err(ApiError::store("Failed to save page"))?;

    info!("Saved page /{}", endpoint);
    Ok(Json(ActionResponse::ok(format!("Page /{} saved", endpoint))))
}

/// Replace a page (delete then rewrite in one transaction)
#[utoipa::path(
    put,
    path = "/api/create",
    request_body = PageInput,
    responses(
        (status = 200, description = "Page replaced", body = ActionResponse),
        (status = 400, description = "Validation failed", body = ValidationErrorResponse),
        (status = 500, description = "Store failure", body = hooklog_proto::ErrorResponse)
    ),
    tag = "pages"
)]
pub async fn update_page(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PageInput>, JsonRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let (endpoint, stored) = validated(body)?;
    state
        .store
        .replace_page(&endpoint, &stored)
        .await
        .map_err(ApiError::store("Failed to update page"))?;

    info!("Updated page /{}", endpoint);
    Ok(Json(ActionResponse::ok(format!("Page /{} updated", endpoint))))
}

/// Remove a page
#[utoipa::path(
    delete,
    path = "/api/create",
    params(PageDeleteParams),
    responses(
        (status = 200, description = "Page removed", body = ActionResponse),
        (status = 400, description = "Missing endpoint", body = ValidationErrorResponse),
        (status = 500, description = "Store failure", body = hooklog_proto::ErrorResponse)
    ),
    tag = "pages"
)]
pub async fn delete_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageDeleteParams>,
) -> Result<Json<ActionResponse>, ApiError> {
    let endpoint = params
        .endpoint
        .as_deref()
        .map(|e| e.trim().trim_start_matches('/'))
        .unwrap_or_default();
    if endpoint.is_empty() {
        return Err(ApiError::field("endpoint", "Endpoint is required"));
    }

    let removed = state
        .store
        .delete_page(endpoint)
        .await
        .map_err(ApiError::store("Failed to delete page"))?;

    info!("Deleted page /{} ({} removed)", endpoint, removed);
    Ok(Json(ActionResponse::ok(format!("Page /{} deleted", endpoint))))
}

/// Validate an input body into `(endpoint, stored JSON)`
fn validated(body: Result<Json<PageInput>, JsonRejection>) -> Result<(String, String), ApiError> {
    let Json(input) = body.map_err(|rejection| ApiError::field("body", rejection.body_text()))?;
    let page = input
        .validate()
        .map_err(|validation| ApiError::Validation(validation.errors))?;
    let stored = serde_json::to_string(&page.stored())
        .map_err(|e| ApiError::Internal(format!("failed to encode page: {}", e)))?;
    Ok((page.endpoint, stored))
}
