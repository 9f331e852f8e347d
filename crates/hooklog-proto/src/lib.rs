//! Hooklog wire and storage schemas
//!
//! Every value that crosses a boundary (store document, HTTP body, stream
//! event) is parsed into one of these types before the rest of the system
//! touches it.

pub mod api;
pub mod feed;
pub mod index;
pub mod page;
pub mod record;

pub use api::{
    ActionResponse, DeleteResponse, ErrorResponse, HealthResponse, HistoryResponse, SearchResponse,
    ValidationErrorResponse,
};
pub use feed::{FeedFrame, FrameError, StreamCursor, HANDSHAKE_MESSAGE};
pub use index::{index_field, FieldKind, IndexField, INDEX_FIELDS, SEARCH_INDEX};
pub use page::{HeaderEntry, PageDefinition, PageInput, PageValidation, StoredPage};
pub use record::{
    parse_record_key, CapturedRequest, HttpCookie, OrderedMultiMap, Report, RequestRecord,
    RECORD_KEY_PREFIX,
};

/// Stream key holding the append-only request log
pub const STREAM_KEY: &str = "data_stream";

/// Hash key holding page definitions, field = endpoint
pub const PAGES_KEY: &str = "page_data";
