//! HTTP response bodies shared by server and client

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::record::{parse_record_key, CapturedRequest, RequestRecord};

/// Full history listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct HistoryResponse {
    /// Number of records returned
    #[serde(alias = "totalCount")]
    pub request_number: usize,
    /// One single-entry object per record, keyed by record key
    pub data: Vec<BTreeMap<String, CapturedRequest>>,
}

impl HistoryResponse {
    pub fn from_records(records: Vec<RequestRecord>) -> Self {
        let data: Vec<_> = records
            .into_iter()
            .map(|record| {
                let mut entry = BTreeMap::new();
                entry.insert(record.key.to_string(), record.request);
                entry
            })
            .collect();

        Self {
            request_number: data.len(),
            data,
        }
    }

    /// Flatten into keyed records; entries whose key is not an integer are skipped
    pub fn into_records(self) -> Vec<RequestRecord> {
        self.data
            .into_iter()
            .flat_map(|entry| entry.into_iter())
            .filter_map(|(key, request)| {
                parse_record_key(&key).map(|key| RequestRecord::new(key, request))
            })
            .collect()
    }
}

/// Search result page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct SearchResponse {
    /// Whether the index answered
    pub success: bool,
    /// Total hits reported by the index (not just this page)
    #[serde(default)]
    pub total: u64,
    /// Matching records in index order
    #[serde(default)]
    pub results: Vec<RequestRecord>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    pub fn found(total: u64, results: Vec<RequestRecord>) -> Self {
        Self {
            success: true,
            total,
            results,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Outcome of a mutating operation (delete, page save)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of the delete endpoints
pub type DeleteResponse = ActionResponse;

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Generic error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    pub fn with_code(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
        }
    }
}

/// Field-level validation failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ValidationErrorResponse {
    pub success: bool,
    pub message: String,
    /// Messages keyed by input field
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrorResponse {
    pub fn new(errors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            success: false,
            message: "Validation failed".to_string(),
            errors,
        }
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::new(errors)
    }
}

/// Service health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct HealthResponse {
    /// "ok" when the store answers, "degraded" otherwise
    pub status: String,
    /// Server version
    pub version: String,
    /// "up" or "down"
    pub store: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ts: &str) -> CapturedRequest {
        CapturedRequest::from_json(&format!(r#"{{"method":"GET","timestamp":"{}"}}"#, ts)).unwrap()
    }

    #[test]
    fn test_history_wire_shape() {
        let history = HistoryResponse::from_records(vec![
            RequestRecord::new(2, request("2025-01-01T00:00:02Z")),
            RequestRecord::new(1, request("2025-01-01T00:00:01Z")),
        ]);
        let json = serde_json::to_value(&history).unwrap();

        assert_eq!(json["request_number"], 2);
        assert_eq!(json["data"][0]["2"]["method"], "GET");
        assert_eq!(json["data"][1]["1"]["timestamp"], "2025-01-01T00:00:01Z");
    }

    #[test]
    fn test_history_accepts_total_count_alias() {
        let raw = r#"{
            "totalCount": 2,
            "data": [
                {"5": {"method": "POST", "timestamp": "2025-01-01T00:00:05Z"}},
                {"oops": {"method": "GET", "timestamp": "2025-01-01T00:00:06Z"}}
            ]
        }"#;
        let history: HistoryResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(history.request_number, 2);

        let records = history.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, 5);
        assert_eq!(records[0].request.method, "POST");
    }

    #[test]
    fn test_search_response_failure_shape() {
        let json = serde_json::to_value(SearchResponse::failed("Search failed")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Search failed");
        assert_eq!(json["total"], 0);

        let parsed: SearchResponse = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(parsed.results.is_empty());
    }

    #[test]
    fn test_delete_response_omits_absent_fields() {
        let json = serde_json::to_value(DeleteResponse::ok("Deleted 0 keys")).unwrap();
        assert_eq!(json["message"], "Deleted 0 keys");
        assert!(json.get("error").is_none());
    }
}
