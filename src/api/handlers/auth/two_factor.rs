//! Two-factor verification endpoint, the second half of password login.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::session::extract_challenge_id;
use super::types::TwoFactorRequest;
use super::{completed_response, rate_limited_response};
use crate::login::{LoginError, LoginFlow, Orchestrator};

#[utoipa::path(
    post,
    path = "/v1/auth/login/two-factor",
    request_body = TwoFactorRequest,
    responses(
        (status = 200, description = "Login finished", body = super::types::LoginResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid code or challenge", body = String)
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    orchestrator: Extension<Arc<Orchestrator>>,
    payload: Option<Json<TwoFactorRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    // No challenge cookie means no password step happened on this client.
    let Some(challenge_id) = extract_challenge_id(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            LoginError::InvalidCredentials.to_string(),
        )
            .into_response();
    };

    let flow = match orchestrator
        .verify_two_factor(challenge_id, &request.code)
        .await
    {
        Ok(flow) => flow,
        Err(err) => {
            error!("Two-factor verification failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match flow {
        LoginFlow::Completed { session, redirect } => {
            completed_response(orchestrator.config(), &session, redirect, true)
        }
        LoginFlow::TwoFactorRequired { .. } => {
            // The two-factor step never parks a login a second time.
            error!("Unexpected pending flow out of two-factor verification");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        LoginFlow::RateLimited { redirect } => rate_limited_response(redirect),
        LoginFlow::Rejected(err) => (StatusCode::UNAUTHORIZED, err.to_string()).into_response(),
    }
}
