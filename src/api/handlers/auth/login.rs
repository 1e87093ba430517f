//! Password login endpoint.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::types::LoginRequest;
use super::utils::valid_email;
use super::{completed_response, rate_limited_response, two_factor_pending_response};
use crate::login::{normalize_email, LoginFlow, Orchestrator, SubmitCredentials};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login finished or parked behind a second factor", body = super::types::LoginResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    orchestrator: Extension<Arc<Orchestrator>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    if !valid_email(&normalize_email(&request.email)) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let flow = match orchestrator
        .submit_password(SubmitCredentials {
            email: request.email,
            password: request.password,
            stay: request.stay,
            redirect: request.redirect,
        })
        .await
    {
        Ok(flow) => flow,
        Err(err) => {
            error!("Login attempt failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match flow {
        LoginFlow::Completed { session, redirect } => {
            completed_response(orchestrator.config(), &session, redirect, false)
        }
        LoginFlow::TwoFactorRequired {
            challenge_id,
            redirect,
        } => two_factor_pending_response(orchestrator.config(), challenge_id, redirect),
        LoginFlow::RateLimited { redirect } => rate_limited_response(redirect),
        LoginFlow::Rejected(err) => (StatusCode::UNAUTHORIZED, err.to_string()).into_response(),
    }
}
