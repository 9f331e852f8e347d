//! HTTP client for the dashboard API

use hooklog_proto::{
    ActionResponse, HealthResponse, HistoryResponse, PageInput, RequestRecord, SearchResponse,
    StoredPage, StreamCursor,
};
use reqwest::{header, redirect, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Name of the session cookie set by `/login`
const SESSION_COOKIE: &str = "session";

/// Timeout for every call except the live feed
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not signed in or session expired")]
    Unauthorized,

    #[error("server returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("invalid server URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Client for one dashboard server
#[derive(Debug, Clone)]
pub struct DashboardClient {
    http: reqwest::Client,
    base_url: Url,
    session: Option<String>,
}

impl DashboardClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        // Redirects are how the server reports a missing session
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            session: None,
        })
    }

    /// Reuse an existing session token
    pub fn with_session(mut self, token: impl Into<String>) -> Self {
        self.session = Some(token.into());
        self
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let url = self.base_url.join(path)?;
        let mut builder = self.http.request(method, url);
        if let Some(token) = &self.session {
            builder = builder.header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token));
        }
        Ok(builder)
    }

    /// Sign in and keep the session cookie for later calls
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let response = self
            .request(Method::POST, "/login")?
            .timeout(REQUEST_TIMEOUT)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        if !response.status().is_redirection() {
            return Err(error_from(response).await);
        }

        let token = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|cookie| {
                let pair = cookie.split(';').next()?.trim();
                let (name, value) = pair.split_once('=')?;
                (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
            })
            .ok_or_else(|| ClientError::InvalidResponse("login set no session cookie".into()))?;

        debug!("Signed in to {}", self.base_url);
        self.session = Some(token);
        Ok(())
    }

    /// Every stored record, newest first
    pub async fn history(&self) -> Result<Vec<RequestRecord>, ClientError> {
        let response = self.send(self.request(Method::GET, "/api/history")?).await?;
        let history: HistoryResponse = json(response).await?;
        Ok(history.into_records())
    }

    /// Run a search.
    ///
    /// Search failures come back as a response with `success: false`, not as
    /// an error.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<SearchResponse, ClientError> {
        let mut params = vec![("q", query.to_string())];
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = offset {
            params.push(("offset", offset.to_string()));
        }

        let response = self
            .request(Method::GET, "/api/search")?
            .timeout(REQUEST_TIMEOUT)
            .query(&params)
            .send()
            .await?;
        check_session(&response)?;

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    pub async fn delete(&self, key: i64) -> Result<ActionResponse, ClientError> {
        let builder = self
            .request(Method::DELETE, "/api/delete")?
            .query(&[("id", key.to_string())]);
        json(self.send(builder).await?).await
    }

    pub async fn delete_all(&self) -> Result<ActionResponse, ClientError> {
        let builder = self.request(Method::DELETE, "/api/delete-all")?;
        json(self.send(builder).await?).await
    }

    pub async fn pages(&self) -> Result<BTreeMap<String, StoredPage>, ClientError> {
        json(self.send(self.request(Method::GET, "/api/create")?).await?).await
    }

    /// Create a page, or replace it entirely when `replace` is set
    pub async fn put_page(
        &self,
        input: &PageInput,
        replace: bool,
    ) -> Result<ActionResponse, ClientError> {
        let method = if replace { Method::PUT } else { Method::POST };
        let builder = self.request(method, "/api/create")?.json(input);
        json(self.send(builder).await?).await
    }

    pub async fn delete_page(&self, endpoint: &str) -> Result<ActionResponse, ClientError> {
        let builder = self
            .request(Method::DELETE, "/api/create")?
            .query(&[("endpoint", endpoint)]);
        json(self.send(builder).await?).await
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        json(self.send(self.request(Method::GET, "/api/health")?).await?).await
    }

    /// Open the live feed; the response body is the event stream
    pub async fn open_stream(&self, cursor: &StreamCursor) -> Result<Response, ClientError> {
        let response = self
            .request(Method::GET, "/api/stream")?
            .header(header::ACCEPT, "text/event-stream")
            .query(&[("lastID", cursor.as_str())])
            .send()
            .await?;
        check_session(&response)?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        Ok(response)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let response = builder.timeout(REQUEST_TIMEOUT).send().await?;
        check_session(&response)?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from(response).await)
        }
    }
}

/// A 401, or a redirect to the login page, means the session is gone
fn check_session(response: &Response) -> Result<(), ClientError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    if status.is_redirection() {
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if location.ends_with("/login") {
            return Err(ClientError::Unauthorized);
        }
    }
    Ok(())
}

async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

/// Build a `Status` error from an error body (`error`, then `message`)
async fn error_from(response: Response) -> ClientError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|value| {
            ["error", "message"]
                .iter()
                .find_map(|field| value.get(*field)?.as_str().map(str::to_string))
        })
        .unwrap_or(text);

    ClientError::Status { status, message }
}
