//! Search index schema
//!
//! The capture service and the dashboard both create [`SEARCH_INDEX`] when it
//! is missing, so whichever starts first decides the schema. Both must send
//! this exact field list.

/// Full-text index over captured request documents
pub const SEARCH_INDEX: &str = "idx:complete_requests";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Tokenised full text
    Text,
    /// Exact-match tags, queried as `@field:{a|b}`
    Tag,
    Numeric,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "TEXT",
            FieldKind::Tag => "TAG",
            FieldKind::Numeric => "NUMERIC",
        }
    }
}

/// One `SCHEMA` entry: a JSON path indexed under an alias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexField {
    pub path: &'static str,
    pub alias: &'static str,
    pub kind: FieldKind,
    /// Trailing options such as `NOSTEM`, `SORTABLE` or `NOINDEX`
    pub options: &'static [&'static str],
}

impl IndexField {
    const fn new(
        path: &'static str,
        alias: &'static str,
        kind: FieldKind,
        options: &'static [&'static str],
    ) -> Self {
        Self {
            path,
            alias,
            kind,
            options,
        }
    }

    /// False for `NOINDEX` fields, which are stored but never matched
    pub fn is_searchable(&self) -> bool {
        !self.options.contains(&"NOINDEX")
    }

    /// The field as `FT.CREATE` arguments
    pub fn schema_args(&self) -> Vec<&'static str> {
        let mut args = vec![self.path, "AS", self.alias, self.kind.as_str()];
        args.extend_from_slice(self.options);
        args
    }
}

use FieldKind::{Numeric, Tag, Text};

/// Schema of [`SEARCH_INDEX`], in `FT.CREATE` order
pub const INDEX_FIELDS: &[IndexField] = &[
    IndexField::new("$.remoteaddr", "ip", Tag, &[]),
    IndexField::new("$.useragent", "useragent", Text, &["NOSTEM"]),
    IndexField::new("$.method", "method", Tag, &[]),
    IndexField::new("$.path", "path", Text, &[]),
    IndexField::new("$.protocol", "protocol", Tag, &[]),
    IndexField::new("$.contentlength", "content_length", Numeric, &[]),
    IndexField::new("$.timestamp", "timestamp", Numeric, &["SORTABLE"]),
    IndexField::new("$.headers", "headers_raw", Text, &["NOSTEM"]),
    IndexField::new("$.cookies", "cookies_raw", Text, &["NOSTEM"]),
    IndexField::new("$.cookies_string", "all_cookies", Text, &["NOSTEM"]),
    IndexField::new("$.headers['User-Agent']", "header_user_agent", Text, &[]),
    IndexField::new("$.headers['Content-Type']", "header_content_type", Tag, &[]),
    IndexField::new("$.form_string", "form_data", Text, &["NOSTEM"]),
    IndexField::new("$.postform_string", "postform_data", Text, &["NOSTEM"]),
    IndexField::new("$.report.uri", "report_uri", Text, &[]),
    IndexField::new("$.report.referrer", "report_referrer", Text, &[]),
    IndexField::new("$.report.user_agent", "report_user_agent", Text, &[]),
    IndexField::new("$.report.lang", "report_lang", Tag, &[]),
    IndexField::new("$.report.gpu", "report_gpu", Tag, &[]),
    IndexField::new("$.report.localstorage_string", "localstorage", Text, &["NOSTEM"]),
    IndexField::new("$.report.sessionstorage_string", "sessionstorage", Text, &["NOSTEM"]),
    IndexField::new("$.body", "body_text", Text, &["NOINDEX"]),
];

/// Look up a field by its query alias, ignoring case
pub fn index_field(alias: &str) -> Option<&'static IndexField> {
    INDEX_FIELDS
        .iter()
        .find(|field| field.alias.eq_ignore_ascii_case(alias))
}

/// Every `FT.CREATE` argument after `SCHEMA`
pub fn schema_args() -> Vec<&'static str> {
    INDEX_FIELDS.iter().flat_map(IndexField::schema_args).collect()
}
