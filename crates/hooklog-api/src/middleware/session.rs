//! Session cookie middleware
//!
//! Reads the `session` cookie, verifies its signature and expiry and checks
//! it belongs to the configured account. Requests without a valid session
//! are redirected to `/login` with `303 See Other`; handlers behind the
//! middleware can read the [`SessionUser`] extension.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use hooklog_auth::{read_cookie, SESSION_COOKIE};
use std::sync::Arc;
use tracing::debug;

use crate::AppState;

/// Authenticated user context
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub user_id: String,
}

/// Resolve the session carried by a request, if any
pub fn session_user(state: &AppState, headers: &HeaderMap) -> Option<SessionUser> {
    let token = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|cookies| read_cookie(cookies, SESSION_COOKIE))?;

    match state.sessions.verify(token) {
        Ok(claims) if claims.sub == state.credentials.user_id => Some(SessionUser {
            user_id: claims.sub,
        }),
        Ok(claims) => {
            debug!("Session for unknown user {}", claims.sub);
            None
        }
        Err(e) => {
            debug!("Rejected session: {}", e);
            None
        }
    }
}

/// Redirect to `/login` unless the request carries a valid session
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    match session_user(&state, request.headers()) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => Redirect::to("/login").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Extension, Router};
    use hooklog_auth::SessionCodec;
    use tower::ServiceExt; // For oneshot()

    async fn protected_handler(Extension(user): Extension<SessionUser>) -> String {
        user.user_id
    }

    fn create_test_app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/protected", get(protected_handler))
            .layer(middleware::from_fn_with_state(state.clone(), require_session))
            .with_state(state)
    }

    fn request(cookie: Option<String>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().uri("/protected");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_session_reaches_handler() {
        let state = test_state();
        let token = state.sessions.issue("0").unwrap();
        let app = create_test_app(state);

        let response = app
            .oneshot(request(Some(format!("theme=dark; session={}", token))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"0");
    }

    #[tokio::test]
    async fn test_missing_cookie_redirects_to_login() {
        let app = create_test_app(test_state());

        let response = app.oneshot(request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn test_foreign_signature_redirects_to_login() {
        let token = SessionCodec::new(b"some-other-secret").issue("0").unwrap();
        let app = create_test_app(test_state());

        let response = app
            .oneshot(request(Some(format!("session={}", token))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_session_for_other_user_is_rejected() {
        let state = test_state();
        let token = state.sessions.issue("42").unwrap();
        let app = create_test_app(state);

        let response = app
            .oneshot(request(Some(format!("session={}", token))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }
}
