//! Router-level login scenarios over in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use tower::ServiceExt;
use uuid::Uuid;

use gatehouse::api;
use gatehouse::login::{
    hash_password, ChallengeCache, LoginConfig, MemoryAbuseGuard, MemoryAuditSink,
    MemorySessionStore, MemoryUserStore, Orchestrator, User,
};
use gatehouse::twofactor;

const PASSWORD: &str = "correct-horse-battery";

async fn test_app(threshold: u64, two_factor_secret: Option<String>) -> Result<Router> {
    let config = LoginConfig::new("https://gatehouse.dev".to_string())
        .with_default_view("/backend".to_string())
        .with_abuse_threshold(threshold);
    let users = Arc::new(MemoryUserStore::default());
    users
        .add_user(User {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            password_hash: hash_password(PASSWORD)?,
            two_factor_secret,
            created_at: Utc::now(),
        })
        .await;

    let orchestrator = Orchestrator::new(
        config,
        users,
        Arc::new(MemoryAbuseGuard::new(threshold, Duration::from_secs(3600))),
        Arc::new(MemoryAuditSink::default()),
        Arc::new(MemorySessionStore::default()),
        ChallengeCache::generate_key(),
        None,
    )?;
    Ok(api::router(Arc::new(orchestrator)))
}

fn login_request(email: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(format!(
            r#"{{"email":"{email}","password":"{password}"}}"#
        )))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn set_cookies(response: &axum::response::Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok().map(ToString::to_string))
        .collect()
}

fn cookie_pair(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string()
}

#[tokio::test]
async fn health_reports_the_service() -> Result<()> {
    let app = test_app(10, None).await?;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("X-App"));

    let body = body_json(response).await;
    assert_eq!(body["name"], "gatehouse");
    Ok(())
}

#[tokio::test]
async fn password_login_sets_the_session_cookie() -> Result<()> {
    let app = test_app(10, None).await?;
    let response = app.oneshot(login_request("a@x.com", PASSWORD)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert!(cookies
        .iter()
        .any(|cookie| cookie.starts_with("gatehouse_session=")));

    let body = body_json(response).await;
    assert_eq!(body["redirect"], "/backend");
    Ok(())
}

#[tokio::test]
async fn invalid_credentials_return_a_generic_401() -> Result<()> {
    let app = test_app(10, None).await?;
    let response = app.oneshot(login_request("a@x.com", "wrong")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
    Ok(())
}

#[tokio::test]
async fn blocked_channel_answers_with_a_silent_redirect() -> Result<()> {
    let app = test_app(2, None).await?;
    let response = app
        .clone()
        .oneshot(login_request("a@x.com", "wrong"))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The next attempt reaches the threshold before evaluation. Correct
    // credentials now look like a plain redirect back to the login page:
    // 200, no error body, no cookie.
    let response = app.oneshot(login_request("a@x.com", PASSWORD)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    let body = body_json(response).await;
    assert_eq!(body["redirect"], "/login");
    Ok(())
}

#[tokio::test]
async fn two_factor_round_trip_over_http() -> Result<()> {
    let secret = twofactor::generate_secret()?;
    let app = test_app(10, Some(secret.clone())).await?;

    let response = app
        .clone()
        .oneshot(login_request("a@x.com", PASSWORD))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    let challenge = cookies
        .iter()
        .find(|cookie| cookie.starts_with("gatehouse_2fa="))
        .expect("challenge cookie");
    assert!(!cookies
        .iter()
        .any(|cookie| cookie.starts_with("gatehouse_session=")));
    let body = body_json(response).await;
    assert_eq!(body["redirect"], "/login/two-factor");

    let code = {
        let secret_bytes = totp_rs::Secret::Encoded(secret).to_bytes().expect("secret");
        totp_rs::TOTP::new(
            totp_rs::Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some("Gatehouse".to_string()),
            "a@x.com".to_string(),
        )
        .expect("totp")
        .generate_current()
        .expect("code")
    };

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/login/two-factor")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, cookie_pair(challenge))
                .body(Body::from(format!(r#"{{"code":"{code}"}}"#)))
                .expect("request"),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response)
        .iter()
        .any(|cookie| cookie.starts_with("gatehouse_session=")));

    let body = body_json(response).await;
    assert_eq!(body["redirect"], "/backend");
    Ok(())
}

#[tokio::test]
async fn session_introspection_and_logout() -> Result<()> {
    let app = test_app(10, None).await?;
    let response = app
        .clone()
        .oneshot(login_request("a@x.com", PASSWORD))
        .await?;
    let cookies = set_cookies(&response);
    let session = cookies
        .iter()
        .find(|cookie| cookie.starts_with("gatehouse_session="))
        .expect("session cookie");
    let pair = cookie_pair(session);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/auth/session")
                .header(header::COOKIE, pair.clone())
                .body(Body::empty())
                .expect("request"),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["email"], "a@x.com");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/logout")
                .header(header::COOKIE, pair.clone())
                .body(Body::empty())
                .expect("request"),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/auth/session")
                .header(header::COOKIE, pair)
                .body(Body::empty())
                .expect("request"),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    Ok(())
}

#[tokio::test]
async fn webauthn_start_without_credentials_is_denied() -> Result<()> {
    let app = test_app(10, None).await?;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/webauthn/start")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"email":"a@x.com"}"#))
                .expect("request"),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn missing_payload_is_a_bad_request() -> Result<()> {
    let app = test_app(10, None).await?;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/login")
                .body(Body::empty())
                .expect("request"),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
