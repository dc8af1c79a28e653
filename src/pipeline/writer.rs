//! Per-record writer: one `predictedYield` document per prediction.

use anyhow::Result;
use chrono::Datelike;
use serde_json::json;
use tracing::{debug, warn};

use crate::anchor::TimeAnchor;
use crate::models::{
    as_number, round_to, to_fields, ConsumedFlag, Prediction, SensorReading,
    PREDICTION_COLLECTION, SENSOR_COLLECTION,
};
use crate::store::DocumentStore;

// ---

/// First free sequence index for `date_key`: one past the highest stored
/// index, or 0 when the day has none.
pub async fn next_index(store: &dyn DocumentStore, date_key: &str) -> Result<u64> {
    // ---
    let existing = store
        .find_eq(PREDICTION_COLLECTION, "date", &json!(date_key))
        .await?;

    let max = existing
        .iter()
        .filter_map(|d| d.get("index").and_then(as_number))
        .filter(|i| *i >= 0.0)
        .map(|i| i as u64)
        .max();

    Ok(max.map_or(0, |m| m + 1))
}

/// Persist each (reading, prediction) pair in order.
///
/// Prediction writes are authoritative and abort the batch on failure.
/// Flagging the source reading is bookkeeping: failures are logged and the
/// batch carries on.
pub async fn write_predictions(
    store: &dyn DocumentStore,
    anchor: &TimeAnchor,
    readings: &[SensorReading],
    predicted: &[f64],
    flag_sources: bool,
) -> Result<Vec<Prediction>> {
    // ---
    let date_key = anchor.date_key();
    let trained_at = anchor.run_stamp();
    let day = anchor.today().day().to_string();
    let mut index = next_index(store, &date_key).await?;
    debug!("Assigning prediction indices for {} from {}", date_key, index);

    let mut written = Vec::with_capacity(readings.len());
    for (reading, value) in readings.iter().zip(predicted) {
        let now = anchor.tick();

        let prediction = Prediction {
            reading_id: reading.id.clone(),
            temperature: reading.temperature,
            humidity: reading.humidity,
            soil_moisture: reading.soil_moisture,
            timestamp: now.to_rfc3339(),
            date: date_key.clone(),
            time: now.format("%I:%M %p").to_string(),
            day: day.clone(),
            hour: now.format("%I").to_string(),
            index,
            predicted_yield: round_to(*value, 2),
            source: "predicted".to_string(),
            trained_at: trained_at.clone(),
        };
        store
            .add(PREDICTION_COLLECTION, to_fields(&prediction)?)
            .await?;

        if flag_sources {
            let flag = ConsumedFlag {
                predicted: true,
                predicted_at: now.format("%Y-%m-%d %I:%M %p").to_string(),
                predicted_value: round_to(*value, 4),
            };
            if let Err(e) = store
                .merge(SENSOR_COLLECTION, &reading.id, to_fields(&flag)?)
                .await
            {
                warn!("Failed to flag reading {} as predicted: {}", reading.id, e);
            }
        }

        written.push(prediction);
        index += 1;
    }

    Ok(written)
}
