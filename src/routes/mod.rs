use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::predictor::RegressionModel;
use crate::Config;

mod health;
mod predict;
mod train;

pub type SharedModel = Arc<dyn RegressionModel>;
pub type AppState = (SharedModel, Config);

// ---

pub fn router(model: SharedModel, config: Config) -> Result<Router> {
    // ---
    let origin: HeaderValue = config
        .cors_origin
        .parse()
        .map_err(|e| anyhow!("Invalid CORS_ORIGIN {}: {}", config.cors_origin, e))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Ok(Router::new()
        .merge(predict::router())
        .merge(train::router())
        .merge(health::router())
        .layer(cors)
        .with_state((model, config)))
}
