//! Router and server wiring.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, info_span};
use url::Url;

pub(crate) mod handlers;
mod openapi;

pub use openapi::openapi;

use crate::cli::globals::GlobalArgs;
use crate::login::{
    ChallengeCache, LoginConfig, Orchestrator, PgAbuseGuard, PgAuditSink, PgSessionStore,
    PgUserStore,
};

/// Build the application router around a wired orchestrator.
#[must_use]
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/v1/auth/login", post(handlers::auth::login::login))
        .route(
            "/v1/auth/login/two-factor",
            post(handlers::auth::two_factor::verify),
        )
        .route(
            "/v1/auth/webauthn/start",
            post(handlers::auth::webauthn::start),
        )
        .route(
            "/v1/auth/webauthn/finish",
            post(handlers::auth::webauthn::finish),
        )
        .route("/v1/auth/session", get(handlers::auth::session::session))
        .route("/v1/auth/logout", post(handlers::auth::session::logout))
        .layer(Extension(orchestrator))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, config: LoginConfig, globals: &GlobalArgs) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    // Challenges do not survive a restart; without a configured key each
    // process seals with its own.
    let sealing_key = match globals.sealing_key_bytes()? {
        Some(key) => key,
        None => ChallengeCache::generate_key(),
    };

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgAbuseGuard::new(
            pool.clone(),
            config.abuse_threshold(),
            config.abuse_window_seconds(),
        )),
        Arc::new(PgAuditSink::new(pool.clone())),
        Arc::new(PgSessionStore::new(pool)),
        sealing_key,
        globals.backup_pepper_bytes(),
    )?);

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(base_origin(
            orchestrator.config().base_url(),
        )?))
        .allow_credentials(true);

    let app = router(orchestrator).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let path = request
                        .extensions()
                        .get::<MatchedPath>()
                        .map_or_else(|| request.uri().path(), MatchedPath::as_str);
                    info_span!("http.request", method = %request.method(), path)
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(cors),
    );

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!("Listening on port {port}");

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn base_origin(base_url: &str) -> Result<HeaderValue> {
    let url = Url::parse(base_url).context("invalid base URL")?;
    let origin = url.origin().ascii_serialization();
    HeaderValue::from_str(&origin).context("invalid origin header")
}

#[cfg(test)]
mod tests {
    use super::base_origin;

    #[test]
    fn base_origin_normalizes_to_scheme_host_port() {
        let origin = base_origin("https://gatehouse.dev/some/path").expect("origin");
        assert_eq!(origin, "https://gatehouse.dev");

        let origin = base_origin("http://localhost:8080/").expect("origin");
        assert_eq!(origin, "http://localhost:8080");
    }

    #[test]
    fn base_origin_rejects_garbage() {
        assert!(base_origin("not a url").is_err());
    }
}
