//! Login and logout

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use hooklog_auth::{clear_session_cookie, session_cookie};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::middleware::session_user;
use crate::models::LoginForm;
use crate::AppState;

const LOGIN_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>hooklog - sign in</title></head>
<body>
<form method="post" action="/login">
<label>Username <input name="username" autocomplete="username" required></label>
<label>Password <input name="password" type="password" autocomplete="current-password" required></label>
<button type="submit">Sign in</button>
</form>
</body>
</html>
"#;

/// Login form; an active session goes straight to `/`
pub async fn login_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if session_user(&state, &headers).is_some() {
        return Redirect::to("/").into_response();
    }
    Html(LOGIN_PAGE).into_response()
}

/// Check credentials and start a session
#[utoipa::path(
    post,
    path = "/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Signed in, session cookie set, redirect to /"),
        (status = 400, description = "Missing username or password", body = hooklog_proto::ValidationErrorResponse),
        (status = 401, description = "Invalid username or password", body = hooklog_proto::ValidationErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let username = form.username.trim();
    let password = form.password.trim();

    let mut errors = BTreeMap::new();
    if username.is_empty() {
        errors.insert("username".to_string(), vec!["Username is required".to_string()]);
    }
    if password.is_empty() {
        errors.insert("password".to_string(), vec!["Password is required".to_string()]);
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    if !state.credentials.verify(username, password) {
        warn!("Failed login for user {:?}", username);
        let mut errors = BTreeMap::new();
        errors.insert(
            "username".to_string(),
            vec!["Invalid username or password".to_string()],
        );
        return Err(ApiError::Unauthorized(errors));
    }

    let token = state
        .sessions
        .issue(&state.credentials.user_id)
        .map_err(|e| ApiError::Internal(format!("failed to issue session: {}", e)))?;
    let cookie = session_cookie(&token, state.sessions.validity(), state.secure_cookie);

    info!("User {} signed in", username);
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

/// End the session
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 303, description = "Session cleared, redirect to /login")
    ),
    tag = "auth"
)]
pub async fn logout(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::SET_COOKIE, clear_session_cookie(state.secure_cookie))],
        Redirect::to("/login"),
    )
        .into_response()
}
