use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hooklog_proto::{ErrorResponse, ValidationErrorResponse};
use hooklog_store::StoreError;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::error;

/// Handler failures and their HTTP mapping
#[derive(Debug, Error)]
pub enum ApiError {
    /// 400 with per-field messages
    #[error("validation failed")]
    Validation(BTreeMap<String, Vec<String>>),

    /// 401 with per-field messages
    #[error("invalid credentials")]
    Unauthorized(BTreeMap<String, Vec<String>>),

    /// 500; the store error is logged, only `message` reaches the client
    #[error("{message}: {source}")]
    Store {
        message: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn store(message: &'static str) -> impl FnOnce(StoreError) -> ApiError {
        move |source| ApiError::Store { message, source }
    }

    pub fn field(field: &str, message: impl Into<String>) -> ApiError {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(ValidationErrorResponse::new(errors)),
            )
                .into_response(),
            ApiError::Unauthorized(errors) => {
                let mut body = ValidationErrorResponse::new(errors);
                body.message = "Invalid credentials".to_string();
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
            ApiError::Store { message, source } => {
                error!("{}: {}", message, source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(message)),
                )
                    .into_response()
            }
            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Internal server error")),
                )
                    .into_response()
            }
        }
    }
}
