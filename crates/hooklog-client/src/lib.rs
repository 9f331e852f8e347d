//! Client side of the hooklog dashboard
//!
//! Everything a front-end needs to show captured requests: the record
//! view with optimistic deletes ([`view`]), the live feed connection
//! ([`feed`], [`live`]), the HTTP client ([`client`]) and the
//! [`Dashboard`] controller tying them together.

pub mod backoff;
pub mod client;
pub mod cursor;
pub mod dashboard;
pub mod feed;
pub mod live;
pub mod sse;
pub mod view;

pub use backoff::{Backoff, BackoffConfig};
pub use client::{ClientError, DashboardClient};
pub use cursor::{CursorError, CursorStore, FileCursorStore, MemoryCursorStore};
pub use dashboard::{Dashboard, DashboardEvent, Notice};
pub use feed::{ConnectionState, FeedError, FeedEvent, FeedMachine, FeedMessage};
pub use live::{LiveFeed, LiveUpdate};
pub use sse::{SseEvent, SseParser};
pub use view::{merge, DashboardView, DeleteSnapshot, SearchOutcome, Tombstones};
