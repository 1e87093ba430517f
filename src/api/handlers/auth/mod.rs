//! Auth endpoint wiring and shared response plumbing.

pub(crate) mod login;
pub(crate) mod session;
pub(crate) mod two_factor;
pub(crate) mod types;
mod utils;
pub(crate) mod webauthn;

use axum::{
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::login::{IssuedSession, LoginConfig};
use session::{challenge_cookie, clear_cookie, session_cookie, TWO_FACTOR_COOKIE_NAME};
use types::LoginResponse;

/// Terminal success response: session cookie plus the one-time redirect.
/// Steps that consumed a two-factor challenge also clear its cookie.
pub(super) fn completed_response(
    config: &LoginConfig,
    session: &IssuedSession,
    redirect: String,
    clear_challenge: bool,
) -> Response {
    let mut headers = HeaderMap::new();
    match session_cookie(config, session) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    if clear_challenge {
        if let Ok(cookie) = clear_cookie(config, TWO_FACTOR_COOKIE_NAME) {
            headers.append(SET_COOKIE, cookie);
        }
    }
    (StatusCode::OK, headers, Json(LoginResponse { redirect })).into_response()
}

/// Two-factor pending: bind the challenge to the client and point it at the
/// verification step.
pub(super) fn two_factor_pending_response(
    config: &LoginConfig,
    challenge_id: uuid::Uuid,
    redirect: String,
) -> Response {
    let mut headers = HeaderMap::new();
    match challenge_cookie(config, challenge_id) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build challenge cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    (StatusCode::OK, headers, Json(LoginResponse { redirect })).into_response()
}

/// Blocked channel: a plain redirect back to the same page. Deliberately
/// carries no error body so throttling is not signaled.
pub(super) fn rate_limited_response(redirect: String) -> Response {
    (StatusCode::OK, Json(LoginResponse { redirect })).into_response()
}
