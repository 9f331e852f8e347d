//! Query and form inputs accepted by the handlers

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Upper bound on a search page
pub const MAX_SEARCH_LIMIT: usize = 1000;

/// Live feed query
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// Resume after this log id; `$` (default) starts at the newest entry
    #[serde(rename = "lastID")]
    pub last_id: Option<String>,
}

/// Search query
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Search expression (default `*`)
    pub q: Option<String>,
    /// Page size (default 10)
    pub limit: Option<usize>,
    /// Hits to skip (default 0)
    pub offset: Option<usize>,
}

impl SearchParams {
    pub fn query(&self) -> String {
        match self.q.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => q.to_string(),
            _ => "*".to_string(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(10).min(MAX_SEARCH_LIMIT)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

/// Delete query
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteParams {
    /// Record key
    pub id: Option<String>,
}

/// Page delete query
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageDeleteParams {
    /// Endpoint of the page to remove
    pub endpoint: Option<String>,
}

/// Login form
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}
