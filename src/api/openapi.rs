//! `OpenAPI` document for the login endpoints, served at `/openapi.json`.

use axum::Json;
use utoipa::OpenApi;

use super::handlers;
use super::handlers::auth::types::{
    LoginRequest, LoginResponse, SessionResponse, TwoFactorRequest, WebauthnFinishRequest,
    WebauthnStartRequest, WebauthnStartResponse,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::auth::login::login,
        handlers::auth::two_factor::verify,
        handlers::auth::webauthn::start,
        handlers::auth::webauthn::finish,
        handlers::auth::session::session,
        handlers::auth::session::logout,
    ),
    components(schemas(
        LoginRequest,
        LoginResponse,
        TwoFactorRequest,
        WebauthnStartRequest,
        WebauthnStartResponse,
        WebauthnFinishRequest,
        SessionResponse,
    )),
    tags(
        (name = "auth", description = "Login and session endpoints"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_the_login_paths() {
        let doc = openapi();
        assert!(doc.paths.paths.contains_key("/v1/auth/login"));
        assert!(doc.paths.paths.contains_key("/v1/auth/login/two-factor"));
        assert!(doc.paths.paths.contains_key("/v1/auth/webauthn/start"));
        assert!(doc.paths.paths.contains_key("/v1/auth/webauthn/finish"));
        assert!(doc.paths.paths.contains_key("/v1/auth/session"));
        assert!(doc.paths.paths.contains_key("/health"));
    }
}
