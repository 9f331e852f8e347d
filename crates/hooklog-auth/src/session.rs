//! Signed session tokens carried in the `session` cookie

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cookie holding the session token
pub const SESSION_COOKIE: &str = "session";

/// Default session lifetime
pub const SESSION_DAYS: i64 = 7;

/// Claims stored in a session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// Subject (user id)
    pub sub: String,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(user_id: impl Into<String>, validity: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.into(),
            iat: now.timestamp(),
            exp: (now + validity).timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session encoding error: {0}")]
    Encoding(jsonwebtoken::errors::Error),

    #[error("Session expired")]
    Expired,

    #[error("Invalid session")]
    Invalid,
}

impl From<jsonwebtoken::errors::Error> for SessionError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => SessionError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => SessionError::Invalid,
            _ => SessionError::Encoding(err),
        }
    }
}

/// Issues and verifies HS256 session tokens
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    validity: Duration,
}

impl SessionCodec {
    /// Codec signing with `secret`, sessions valid for seven days
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.validate_nbf = false;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            validity: Duration::days(SESSION_DAYS),
        }
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Issue a token for `user_id`
    pub fn issue(&self, user_id: &str) -> Result<String, SessionError> {
        let claims = SessionClaims::new(user_id, self.validity);
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)?;
        if data.claims.is_expired() {
            return Err(SessionError::Expired);
        }
        Ok(data.claims)
    }
}

/// Random 32-byte signing secret, hex encoded
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// `Set-Cookie` value establishing a session
pub fn session_cookie(token: &str, validity: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        validity.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value removing the session
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", Duration::zero(), secure)
}

/// Find a cookie value in a `Cookie` request header
pub fn read_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .map(|c| c.trim())
        .find_map(|c| c.split_once('=').filter(|(n, _)| *n == name))
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
