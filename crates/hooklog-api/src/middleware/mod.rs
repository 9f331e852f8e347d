//! API Middleware
//!
//! Session enforcement for every non-public route.

pub mod session;

pub use session::{require_session, session_user, SessionUser};
