//! Security key login endpoints.
//!
//! Raw `WebAuthn` payloads are never logged.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;
use webauthn_rs::prelude::PublicKeyCredential;

use super::types::{WebauthnFinishRequest, WebauthnStartRequest, WebauthnStartResponse};
use super::utils::valid_email;
use super::{completed_response, rate_limited_response};
use crate::login::{normalize_email, AssertionStart, LoginError, LoginFlow, Orchestrator};

#[utoipa::path(
    post,
    path = "/v1/auth/webauthn/start",
    request_body = WebauthnStartRequest,
    responses(
        (status = 200, description = "Assertion challenge issued", body = WebauthnStartResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Security key sign-in unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn start(
    orchestrator: Extension<Arc<Orchestrator>>,
    payload: Option<Json<WebauthnStartRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    if !valid_email(&normalize_email(&request.email)) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let start = match orchestrator.webauthn_request_args(&request.email).await {
        Ok(start) => start,
        Err(err) => {
            error!("Failed to start security key login: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match start {
        AssertionStart::Challenge {
            challenge_id,
            request,
        } => match serde_json::to_value(&request) {
            Ok(request) => (
                StatusCode::OK,
                Json(WebauthnStartResponse {
                    challenge_id: challenge_id.to_string(),
                    request,
                }),
            )
                .into_response(),
            Err(err) => {
                error!("Failed to serialize assertion challenge: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        // Every denial — unknown user, no credentials, blocked channel —
        // surfaces as the same generic failure.
        AssertionStart::Denied(_) => (
            StatusCode::UNAUTHORIZED,
            LoginError::InvalidFido2Request.to_string(),
        )
            .into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/webauthn/finish",
    request_body = WebauthnFinishRequest,
    responses(
        (status = 200, description = "Login finished", body = super::types::LoginResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Verification failed", body = String)
    ),
    tag = "auth"
)]
pub async fn finish(
    orchestrator: Extension<Arc<Orchestrator>>,
    payload: Option<Json<WebauthnFinishRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    let Ok(challenge_id) = Uuid::parse_str(request.challenge_id.trim()) else {
        return (StatusCode::BAD_REQUEST, "Invalid challenge id".to_string()).into_response();
    };
    let credential: PublicKeyCredential = match serde_json::from_value(request.credential) {
        Ok(credential) => credential,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                "Invalid credential payload".to_string(),
            )
                .into_response();
        }
    };

    let flow = match orchestrator
        .webauthn_complete(
            &request.email,
            challenge_id,
            &credential,
            request.stay,
            request.redirect.as_deref(),
        )
        .await
    {
        Ok(flow) => flow,
        Err(err) => {
            error!("Security key login failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match flow {
        LoginFlow::Completed { session, redirect } => {
            completed_response(orchestrator.config(), &session, redirect, false)
        }
        LoginFlow::TwoFactorRequired { .. } => {
            // Security keys complete in one verification; nothing parks here.
            error!("Unexpected pending flow out of security key login");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        LoginFlow::RateLimited { redirect } => rate_limited_response(redirect),
        LoginFlow::Rejected(err) => (StatusCode::UNAUTHORIZED, err.to_string()).into_response(),
    }
}
