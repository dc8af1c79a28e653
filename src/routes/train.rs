//! `POST /train`: run the daily job out-of-process and report its output.

use std::process::Output;

use axum::{http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde_json::json;
use tokio::process::Command;
use tracing::{error, info};

use super::AppState;

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/train", post(handler))
}

async fn handler() -> impl IntoResponse {
    // ---
    info!("POST /train - launching daily run");

    match run_daily_subprocess().await {
        Ok(output) if output.status.success() => (
            StatusCode::OK,
            Json(json!({
                "message": "Model run started successfully.",
                "output": String::from_utf8_lossy(&output.stdout),
            })),
        ),
        Ok(output) => {
            error!("Daily run exited with {}", output.status);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Training failed.",
                    "details": String::from_utf8_lossy(&output.stderr),
                })),
            )
        }
        Err(e) => {
            error!("Failed to launch daily run: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Training failed.",
                    "details": e.to_string(),
                })),
            )
        }
    }
}

/// Re-invoke this binary with `run-daily`, capturing stdout and stderr.
async fn run_daily_subprocess() -> std::io::Result<Output> {
    // ---
    let exe = std::env::current_exe()?;
    Command::new(exe)
        .arg("run-daily")
        .env("FORCE_COLOR", "0")
        .output()
        .await
}
