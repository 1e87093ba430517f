//! Session endpoints and cookie plumbing for the login flows.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::types::SessionResponse;
use crate::login::{IssuedSession, LoginConfig, Orchestrator};

pub(crate) const SESSION_COOKIE_NAME: &str = "gatehouse_session";
pub(crate) const TWO_FACTOR_COOKIE_NAME: &str = "gatehouse_2fa";

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    orchestrator: Extension<Arc<Orchestrator>>,
) -> axum::response::Response {
    // Missing cookies are treated as "no session" to avoid leaking auth state.
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match orchestrator.introspect_session(&token).await {
        Ok(Some(record)) => {
            let response = SessionResponse {
                user_id: record.user_id.to_string(),
                email: record.email,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    orchestrator: Extension<Arc<Orchestrator>>,
) -> axum::response::Response {
    if let Some(token) = extract_session_token(&headers) {
        if let Err(err) = orchestrator.logout(&token).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_cookie(orchestrator.config(), SESSION_COOKIE_NAME) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie for a freshly issued session. Without an
/// expiry the cookie is session-scoped; with one, `Max-Age` covers the
/// remaining lifetime.
pub(super) fn session_cookie(
    config: &LoginConfig,
    session: &IssuedSession,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax",
        session.token
    );
    if let Some(expires_at) = session.expires_at {
        let max_age = (expires_at - Utc::now()).num_seconds().max(0);
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Cookie binding the pending two-factor challenge to this client.
pub(super) fn challenge_cookie(
    config: &LoginConfig,
    challenge_id: Uuid,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.challenge_ttl_seconds();
    let mut cookie = format!(
        "{TWO_FACTOR_COOKIE_NAME}={challenge_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_cookie(
    config: &LoginConfig,
    name: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    cookie_value(headers, SESSION_COOKIE_NAME)
}

pub(super) fn extract_challenge_id(headers: &HeaderMap) -> Option<Uuid> {
    cookie_value(headers, TWO_FACTOR_COOKIE_NAME)
        .and_then(|value| Uuid::parse_str(&value).ok())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secure_config() -> LoginConfig {
        LoginConfig::new("https://gatehouse.dev".to_string())
    }

    #[test]
    fn session_cookie_shape() {
        let issued = IssuedSession {
            token: "tok".to_string(),
            expires_at: None,
        };
        let cookie = session_cookie(&secure_config(), &issued).expect("cookie");
        let cookie = cookie.to_str().expect("ascii");
        assert!(cookie.starts_with("gatehouse_session=tok; "));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        assert!(!cookie.contains("Max-Age"));
    }

    #[test]
    fn stay_session_cookie_carries_max_age() {
        let issued = IssuedSession {
            token: "tok".to_string(),
            expires_at: Some(Utc::now() + chrono::Duration::seconds(3600)),
        };
        let cookie = session_cookie(&secure_config(), &issued).expect("cookie");
        assert!(cookie.to_str().expect("ascii").contains("Max-Age=35"));
    }

    #[test]
    fn insecure_base_url_omits_secure_attribute() {
        let config = LoginConfig::new("http://localhost:8080".to_string());
        let issued = IssuedSession {
            token: "tok".to_string(),
            expires_at: None,
        };
        let cookie = session_cookie(&config, &issued).expect("cookie");
        assert!(!cookie.to_str().expect("ascii").contains("Secure"));
    }

    #[test]
    fn extract_session_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("gatehouse_session=from-cookie"),
        );
        assert_eq!(extract_session_token(&headers), Some("abc".to_string()));
    }

    #[test]
    fn extract_session_token_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("other=1; gatehouse_session=from-cookie"),
        );
        assert_eq!(
            extract_session_token(&headers),
            Some("from-cookie".to_string())
        );
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn extract_challenge_id_requires_a_uuid() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("gatehouse_2fa=not-a-uuid"),
        );
        assert!(extract_challenge_id(&headers).is_none());

        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(&format!("gatehouse_2fa={id}")).expect("header"),
        );
        assert_eq!(extract_challenge_id(&headers), Some(id));
    }
}
