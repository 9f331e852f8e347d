//! Custom page definitions served by the capture service

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Default status code when none is given
pub const DEFAULT_STATUS_CODE: u16 = 200;

fn endpoint_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._\-/]{2,99}$").expect("static pattern"))
}

/// One custom response header as submitted by the editor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct HeaderEntry {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Create/update request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PageInput {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub status_code: Option<i64>,
    #[serde(default)]
    pub headers: Vec<HeaderEntry>,
}

/// Field-level validation failures, keyed by input field name
#[derive(Debug, Clone, Default, PartialEq, Error)]
#[error("page validation failed")]
pub struct PageValidation {
    pub errors: BTreeMap<String, Vec<String>>,
}

impl PageValidation {
    fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A validated page, endpoint normalised
#[derive(Debug, Clone, PartialEq)]
pub struct PageDefinition {
    pub endpoint: String,
    pub body: Option<String>,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
}

/// Value stored in the page hash under the endpoint field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct StoredPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_status_code() -> u16 {
    DEFAULT_STATUS_CODE
}

impl PageInput {
    /// Validate and normalise into a storable page.
    ///
    /// The endpoint pattern is checked on the raw input; leading slashes are
    /// stripped afterwards. Header entries with a blank name are dropped.
    pub fn validate(self) -> Result<PageDefinition, PageValidation> {
        let mut validation = PageValidation::default();

        let raw_endpoint = self.endpoint.trim();
        if !endpoint_pattern().is_match(raw_endpoint) {
            validation.add(
                "endpoint",
                "Endpoint must be 2-99 characters of letters, digits, '.', '_', '-' or '/'",
            );
        }
        let endpoint = raw_endpoint.trim_start_matches('/').to_string();
        if validation.is_empty() && endpoint.is_empty() {
            validation.add("endpoint", "Endpoint cannot consist only of slashes");
        }

        let status_code = match self.status_code {
            None => DEFAULT_STATUS_CODE,
            Some(code) if (100..=599).contains(&code) => code as u16,
            Some(code) => {
                validation.add(
                    "statusCode",
                    format!("Status code {} is outside 100-599", code),
                );
                DEFAULT_STATUS_CODE
            }
        };

        if !validation.is_empty() {
            return Err(validation);
        }

        let headers = self
            .headers
            .into_iter()
            .filter(|h| !h.key.trim().is_empty())
            .map(|h| (h.key.trim().to_string(), h.value))
            .collect();

        Ok(PageDefinition {
            endpoint,
            body: self.body,
            status_code,
            headers,
        })
    }
}

impl PageDefinition {
    pub fn stored(&self) -> StoredPage {
        StoredPage {
            body: self.body.clone(),
            status_code: self.status_code,
            headers: self.headers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(endpoint: &str) -> PageInput {
        PageInput {
            endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_page_normalises_endpoint() {
        let page = PageInput {
            endpoint: "/phish/login.html".to_string(),
            body: Some("<h1>hi</h1>".to_string()),
            status_code: None,
            headers: vec![
                HeaderEntry {
                    key: "Content-Type".to_string(),
                    value: "text/html".to_string(),
                },
                HeaderEntry {
                    key: "  ".to_string(),
                    value: "dropped".to_string(),
                },
            ],
        }
        .validate()
        .unwrap();

        assert_eq!(page.endpoint, "phish/login.html");
        assert_eq!(page.status_code, 200);
        assert_eq!(page.headers.len(), 1);
        assert_eq!(page.headers["Content-Type"], "text/html");
    }

    #[test]
    fn test_endpoint_pattern() {
        assert!(input("ab").validate().is_ok());
        assert!(input("a").validate().is_err());
        assert!(input(&"a".repeat(99)).validate().is_ok());
        assert!(input(&"a".repeat(100)).validate().is_err());
        assert!(input("bad path").validate().is_err());
        assert!(input("query?x=1").validate().is_err());
    }

    #[test]
    fn test_slash_only_endpoint_is_rejected() {
        let err = input("///").validate().unwrap_err();
        assert!(err.errors.contains_key("endpoint"));
    }

    #[test]
    fn test_errors_are_collected_per_field() {
        let err = PageInput {
            endpoint: "x".to_string(),
            status_code: Some(42),
            ..Default::default()
        }
        .validate()
        .unwrap_err();

        assert_eq!(err.errors.len(), 2);
        assert!(err.errors.contains_key("endpoint"));
        assert!(err.errors.contains_key("statusCode"));
    }

    #[test]
    fn test_stored_page_wire_shape() {
        let stored = input("status").validate().unwrap().stored();
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert!(json.get("body").is_none());

        let parsed: StoredPage = serde_json::from_str(r#"{"body":"ok"}"#).unwrap();
        assert_eq!(parsed.status_code, 200);
        assert!(parsed.headers.is_empty());
    }
}
