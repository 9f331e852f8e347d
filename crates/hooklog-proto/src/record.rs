//! Captured request records
//!
//! `CapturedRequest` mirrors the JSON document the capture service writes to
//! the store. The capture service serialises absent collections as `null` and
//! binary bodies as base64, so both are normalised here.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Multi-valued map kept in the order the capture service received it
pub type OrderedMultiMap = IndexMap<String, Vec<String>>;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Client-side telemetry attached by the capture script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(default)]
pub struct Report {
    pub uri: String,
    pub cookies: String,
    pub referrer: String,
    #[serde(alias = "user-agent")]
    pub user_agent: String,
    pub origin: String,
    pub lang: String,
    pub gpu: String,
    #[serde(deserialize_with = "null_as_default")]
    pub localstorage: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub sessionstorage: BTreeMap<String, String>,
    pub dom: String,
    pub screenshot: String,
}

impl Report {
    /// True when the capture script sent nothing (all fields at their zero value)
    pub fn is_empty(&self) -> bool {
        self == &Report::default()
    }
}

/// One cookie as parsed by the capture service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(default, rename_all = "PascalCase")]
pub struct HttpCookie {
    pub name: String,
    pub value: String,
    pub quoted: bool,
    pub path: String,
    pub domain: String,
    pub expires: String,
    pub raw_expires: String,
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: i64,
    pub partitioned: bool,
    pub raw: String,
    pub unparsed: Option<Vec<String>>,
}

/// Stored request document, without its store key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CapturedRequest {
    #[serde(default, alias = "remoteaddr")]
    pub address: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub useragent: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub headers: OrderedMultiMap,
    /// Raw body, base64 encoded on the wire
    #[serde(default, with = "body_bytes")]
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub body: Vec<u8>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cookies: Vec<HttpCookie>,
    #[serde(default)]
    pub contentlength: i64,
    #[serde(default)]
    pub protocol: String,
    #[serde(default, deserialize_with = "null_as_default")]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub form: OrderedMultiMap,
    #[serde(default, deserialize_with = "null_as_default")]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub postform: OrderedMultiMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub uniqueid: String,
}

impl CapturedRequest {
    /// Parse a raw store document
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Body as text, lossily decoded
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A captured request together with its integer store key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RequestRecord {
    pub key: i64,
    #[serde(flatten)]
    pub request: CapturedRequest,
}

impl RequestRecord {
    pub fn new(key: i64, request: CapturedRequest) -> Self {
        Self { key, request }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.request.timestamp
    }
}

/// Namespace some index deployments put in front of record keys
pub const RECORD_KEY_PREFIX: &str = "request:";

/// Convert a store or index key into a record key.
///
/// Accepts a bare integer or one behind [`RECORD_KEY_PREFIX`]; any other
/// prefix is not a record.
pub fn parse_record_key(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.strip_prefix(RECORD_KEY_PREFIX)
        .unwrap_or(raw)
        .parse()
        .ok()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

mod body_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Vec::new()),
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map_err(serde::de::Error::custom),
        }
    }
}
