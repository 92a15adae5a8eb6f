//! services/reader_api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

/// Name of the cookie carrying the login session id.
pub const SESSION_COOKIE: &str = "session";

/// Middleware that validates the auth session cookie and extracts the user_id.
///
/// If valid, inserts the user_id into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let auth_session_id =
        session_cookie(cookie_header).ok_or(StatusCode::UNAUTHORIZED)?;

    let user_id = state
        .auth
        .validate_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            warn!("Rejected auth session: {}", e);
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

/// Picks the login session id out of a `Cookie` header.
fn session_cookie(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .filter_map(|c| c.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_session_cookie_among_others() {
        assert_eq!(
            session_cookie("theme=dark; session=abc123; other=1"),
            Some("abc123")
        );
    }

    #[test]
    fn similarly_named_cookies_do_not_match() {
        assert_eq!(session_cookie("session_hint=abc; xsession=def"), None);
        assert_eq!(session_cookie("session="), None);
    }
}
