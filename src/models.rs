//! Document models for the yield collections.
//!
//! Field names here are the wire contract shared with the mobile front-end;
//! serde renames keep the Rust names idiomatic.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Document, Fields};

pub const SENSOR_COLLECTION: &str = "dataCollectionSensor";
pub const PREDICTION_COLLECTION: &str = "predictedYield";
pub const DAILY_COLLECTION: &str = "DailyReading";
pub const MONTHLY_COLLECTION: &str = "monthlyYieldSummary";
pub const TRAINING_LOG_COLLECTION: &str = "trainingLogs";
pub const FARM_COLLECTION: &str = "Farm_information";

// ---

/// Coerce a stored value to a finite number. Older writers stored numbers as
/// text, so numeric strings are accepted too.
pub fn as_number(value: &Value) -> Option<f64> {
    // ---
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Serialize a model into a document field map.
pub fn to_fields<T: Serialize>(model: &T) -> Result<Fields> {
    // ---
    match serde_json::to_value(model)? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!("expected a JSON object, got {}", other)),
    }
}

/// Sensor reading that carries all three model features.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    // ---
    pub id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
}

impl SensorReading {
    // ---
    pub const TEMPERATURE: &'static str = "temperature";
    pub const HUMIDITY: &'static str = "humidity";
    pub const SOIL_MOISTURE: &'static str = "avgSoilMoisture";

    /// Extract the features of a `dataCollectionSensor` document. Fails if a
    /// feature is missing or not numeric.
    pub fn from_document(doc: &Document) -> Result<Self> {
        // ---
        let feature = |name: &str| -> Result<f64> {
            let raw = doc
                .get(name)
                .ok_or_else(|| anyhow!("missing field {}", name))?;
            as_number(raw).ok_or_else(|| anyhow!("field {} is not numeric: {}", name, raw))
        };

        Ok(Self {
            id: doc.id.clone(),
            temperature: feature(Self::TEMPERATURE)?,
            humidity: feature(Self::HUMIDITY)?,
            soil_moisture: feature(Self::SOIL_MOISTURE)?,
        })
    }

    pub fn features(&self) -> [f64; 3] {
        [self.temperature, self.humidity, self.soil_moisture]
    }
}

/// Bookkeeping merged into a sensor reading once it has been predicted.
#[derive(Debug, Serialize)]
pub struct ConsumedFlag {
    pub predicted: bool,
    pub predicted_at: String,
    pub predicted_value: f64,
}

/// One model output, stored in `predictedYield`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    // ---
    pub reading_id: String,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(rename = "avgSoilMoisture")]
    pub soil_moisture: f64,
    pub timestamp: String,
    pub date: String,
    pub time: String,
    pub day: String,
    pub hour: String,
    pub index: u64,
    pub predicted_yield: f64,
    pub source: String,
    pub trained_at: String,
}

/// Per-day rollup stored in `DailyReading`, one document per date-key.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyTotal {
    // ---
    pub date: String,
    pub date_iso: String,
    pub total_yield: f64,
    pub trained_at: String,
    /// Sensor reading ids already counted in `total_yield`.
    pub processed_readings: Vec<String>,
    pub runs: u64,
}

impl DailyTotal {
    /// Reading ids recorded on a stored daily document.
    pub fn processed_ids(fields: &Fields) -> Vec<String> {
        // ---
        fields
            .get("processed_readings")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Running monthly total in `monthlyYieldSummary`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlySummary {
    // ---
    pub month: String,
    pub year: i32,
    pub total_yield: f64,
    pub past_updated: String,
    #[serde(rename = "formatTimeUpdate")]
    pub format_time_update: String,
    #[serde(flatten)]
    pub forecast: Forecast,
    /// Daily total already folded into `total_yield`, per date-key.
    pub daily_applied: BTreeMap<String, f64>,
}

impl MonthlySummary {
    /// The `daily_applied` ledger of a stored summary. Entries that are not
    /// numbers are dropped.
    pub fn applied_days(fields: &Fields) -> BTreeMap<String, f64> {
        // ---
        fields
            .get("daily_applied")
            .and_then(Value::as_object)
            .map(|days| {
                days.iter()
                    .filter_map(|(day, v)| as_number(v).map(|n| (day.clone(), n)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Trailing-average projection merged into the monthly summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Forecast {
    // ---
    pub based_on_days: usize,
    pub avg_daily_used: f64,
    pub predicted_1month: f64,
    pub predicted_2months: f64,
    pub predicted_3months: f64,
    pub predicted_next_day: f64,
    pub calculated_at: String,
    pub forecast_generated_on: String,
}

#[derive(Debug, Serialize)]
pub struct TrainingLog {
    pub trained_at: String,
    pub note: String,
}
