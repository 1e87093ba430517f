//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub stay: bool,
    #[serde(default)]
    pub redirect: Option<String>,
}

/// The one-time redirect target for a finished (or silently throttled) step.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub redirect: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WebauthnStartRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WebauthnStartResponse {
    pub challenge_id: String,
    /// Browser-facing `navigator.credentials.get` arguments.
    pub request: serde_json::Value,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WebauthnFinishRequest {
    pub email: String,
    pub challenge_id: String,
    #[serde(default)]
    pub stay: bool,
    #[serde(default)]
    pub redirect: Option<String>,
    /// The signed assertion as produced by the browser.
    pub credential: serde_json::Value,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
}
