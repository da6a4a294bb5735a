use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post, put},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub(crate) mod handlers;
mod openapi;

pub use handlers::{AuthConfig, AuthState};
pub use openapi::openapi;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Build the application router with all routes and ambient layers wired.
#[must_use]
pub fn router(state: Arc<AuthState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/auth/login", post(handlers::auth::login))
        .route("/v1/auth/challenge", post(handlers::auth::challenge))
        .route("/v1/auth/session", get(handlers::auth::session))
        .route(
            "/v1/auth/mfa/enroll/start",
            post(handlers::mfa::enroll_start),
        )
        .route(
            "/v1/auth/mfa/enroll/finish",
            post(handlers::mfa::enroll_finish),
        )
        .route("/v1/auth/mfa/disable", post(handlers::mfa::disable))
        .route("/v1/admin/users", post(handlers::users::create))
        .route("/v1/admin/users/:username", get(handlers::users::get))
        .route(
            "/v1/admin/users/:username/groups",
            get(handlers::groups::list),
        )
        .route(
            "/v1/admin/users/:username/groups/:group",
            put(handlers::groups::add).delete(handlers::groups::remove),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<AuthState>) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
