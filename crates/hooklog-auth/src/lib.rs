//! Session tokens and the single admin credential

pub mod credentials;
pub mod session;

pub use credentials::Credentials;
pub use session::{
    clear_session_cookie, generate_secret, read_cookie, session_cookie, SessionClaims,
    SessionCodec, SessionError, SESSION_COOKIE,
};
