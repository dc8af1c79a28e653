//! `POST /predict`: score a single reading with the loaded model.
//!
//! The single row is passed to the model as-is; per-batch standardization
//! only applies to the daily job.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use super::AppState;
use crate::models::{as_number, round_to};

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/predict", post(handler))
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    temperature: Value,
    humidity: Value,
    soil_moisture: Value,
}

#[derive(Debug, Serialize, PartialEq)]
struct PredictInput {
    temperature: f64,
    humidity: f64,
    soil_moisture: f64,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    predicted_yield: f64,
    input: PredictInput,
}

fn bad_request(message: impl Into<String>) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
        .into_response()
}

fn parse_input(req: &PredictRequest) -> Result<PredictInput, String> {
    // ---
    let field = |name: &str, value: &Value| {
        as_number(value).ok_or_else(|| format!("{} must be a number, got {}", name, value))
    };
    Ok(PredictInput {
        temperature: field("temperature", &req.temperature)?,
        humidity: field("humidity", &req.humidity)?,
        soil_moisture: field("soil_moisture", &req.soil_moisture)?,
    })
}

async fn handler(
    State((model, _config)): State<AppState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> impl IntoResponse {
    // ---
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let input = match parse_input(&req) {
        Ok(input) => input,
        Err(message) => return bad_request(message),
    };
    debug!("POST /predict - {:?}", input);

    let row = [input.temperature, input.humidity, input.soil_moisture];
    let predicted = match model.infer(&[row]).await {
        Ok(outputs) => outputs.first().copied(),
        Err(e) => {
            error!("Model inference failed: {}", e);
            return bad_request(e.to_string());
        }
    };

    match predicted {
        Some(value) => (
            StatusCode::OK,
            Json(PredictResponse {
                predicted_yield: round_to(value, 2),
                input,
            }),
        )
            .into_response(),
        None => bad_request("model returned no prediction"),
    }
}
