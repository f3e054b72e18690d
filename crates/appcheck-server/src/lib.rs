//! HTTP transport and process wiring for the deployment status synchronizer.

pub mod config;
pub mod error;
pub mod middleware;
pub mod project;
pub mod routes;
pub mod state;

use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use crate::config::{Args, ConfigError, Settings};
pub use crate::state::AppState;

/// Build the service router. `request_timeout` bounds every request,
/// including a webhook call waiting for its release.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", post(routes::webhook::receive))
        .route("/healthz", get(routes::health::health_check))
        .route("/version", get(routes::version::version))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(axum_mw::from_fn(middleware::request_log::request_log))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_timeout_error(_err: tower::BoxError) -> error::ApiError {
    error::ApiError::Unavailable("request timed out".to_string())
}

