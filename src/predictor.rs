//! Regression model boundary.
//!
//! The jobs never train; they load a fitted model and call it. Two backends
//! exist: a linear artifact read from a JSON file, and a remote inference
//! endpoint reached over HTTP.

use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Config;

/// One model input row: temperature, humidity, soil moisture.
pub type FeatureRow = [f64; 3];

// ---

#[async_trait]
pub trait RegressionModel: Send + Sync {
    /// Raw inference, one output per row, same order.
    async fn infer(&self, rows: &[FeatureRow]) -> Result<Vec<f64>>;
}

/// Fitted linear model, e.g. `{"coefficients":[0.8,0.1,0.3],"intercept":2.0}`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LinearModel {
    pub coefficients: [f64; 3],
    pub intercept: f64,
}

impl LinearModel {
    pub fn load(path: &Path) -> Result<Self> {
        // ---
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid model artifact {}", path.display()))
    }

    fn eval(&self, row: &FeatureRow) -> f64 {
        self.intercept
            + row
                .iter()
                .zip(self.coefficients.iter())
                .map(|(x, w)| x * w)
                .sum::<f64>()
    }
}

#[async_trait]
impl RegressionModel for LinearModel {
    async fn infer(&self, rows: &[FeatureRow]) -> Result<Vec<f64>> {
        Ok(rows.iter().map(|row| self.eval(row)).collect())
    }
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    instances: &'a [FeatureRow],
}

#[derive(Deserialize)]
struct InferenceResponse {
    predictions: Vec<f64>,
}

/// Model served behind an HTTP inference endpoint.
#[derive(Debug, Clone)]
pub struct RemoteModel {
    client: reqwest::Client,
    url: String,
}

impl RemoteModel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl RegressionModel for RemoteModel {
    async fn infer(&self, rows: &[FeatureRow]) -> Result<Vec<f64>> {
        // ---
        tracing::debug!("POST {} with {} rows", self.url, rows.len());

        let response: InferenceResponse = self
            .client
            .post(&self.url)
            .json(&InferenceRequest { instances: rows })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("Malformed inference response from {}", self.url))?;

        Ok(response.predictions)
    }
}

/// Pick the configured backend: the remote endpoint when set, otherwise the
/// artifact file.
pub fn load_model(cfg: &Config) -> Result<Box<dyn RegressionModel>> {
    // ---
    if let Some(url) = &cfg.model_url {
        tracing::info!("Using remote model at {}", url);
        return Ok(Box::new(RemoteModel::new(url.clone())));
    }

    let model = LinearModel::load(&cfg.model_path)?;
    tracing::info!("Loaded linear model from {}", cfg.model_path.display());
    Ok(Box::new(model))
}

/// Standardize each column to zero mean and unit variance using this batch's
/// own statistics. Constant columns are only centered.
///
/// Statistics are not persisted from training, so the same reading can score
/// differently in batches of different composition.
pub fn standardize(rows: &[FeatureRow]) -> Vec<FeatureRow> {
    // ---
    if rows.is_empty() {
        return Vec::new();
    }
    let n = rows.len() as f64;

    let mean: FeatureRow = std::array::from_fn(|i| rows.iter().map(|r| r[i]).sum::<f64>() / n);
    let scale: FeatureRow = std::array::from_fn(|i| {
        let var = rows.iter().map(|r| (r[i] - mean[i]).powi(2)).sum::<f64>() / n;
        if var > 0.0 {
            var.sqrt()
        } else {
            1.0
        }
    });

    rows.iter()
        .map(|row| std::array::from_fn(|i| (row[i] - mean[i]) / scale[i]))
        .collect()
}

/// Standardize the batch and run it through the model.
pub async fn predict(model: &dyn RegressionModel, rows: &[FeatureRow]) -> Result<Vec<f64>> {
    // ---
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let scaled = standardize(rows);
    let outputs = model.infer(&scaled).await?;

    if outputs.len() != rows.len() {
        return Err(anyhow!(
            "Model returned {} predictions for {} rows",
            outputs.len(),
            rows.len()
        ));
    }
    Ok(outputs)
}
