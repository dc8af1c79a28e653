// src/routes/health.rs
//! Liveness endpoints for the yield prediction API.
//!
//! `GET /` answers with the plain-text banner the mobile front-end polls, and
//! `GET /health` returns JSON for container orchestrators and CI. Neither
//! touches the model or the document store. Follows the Explicit Module
//! Boundary Pattern (EMBP): only the subrouter is exported to the gateway.

use axum::{routing::get, Json, Router};
use serde::Serialize;

pub const BANNER: &str = "Yield Prediction API is running!";

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handle `GET /`.
async fn home() -> &'static str {
    BANNER
}

/// Handle `GET /health`.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Create a subrouter containing the `/` and `/health` routes.
///
/// Generic over the application state so it merges cleanly with the gateway
/// router regardless of the state type.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
}
