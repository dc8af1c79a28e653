//! Sensor reader: today's readings that still need a prediction.

use std::collections::HashSet;

use anyhow::Result;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::anchor::TimeAnchor;
use crate::models::{DailyTotal, SensorReading, DAILY_COLLECTION, SENSOR_COLLECTION};
use crate::store::{cmp_desc, DocumentStore};

// ---

/// Fetch the anchor day's sensor readings, newest first.
///
/// Readings missing a feature or carrying a non-numeric one are logged and
/// dropped. Readings already rolled into the day's total by an earlier run
/// are skipped, which makes re-running the job a no-op for them.
pub async fn fetch(store: &dyn DocumentStore, anchor: &TimeAnchor) -> Result<Vec<SensorReading>> {
    // ---
    let date_key = anchor.date_key();
    let mut docs = store
        .find_eq(SENSOR_COLLECTION, "date", &json!(date_key))
        .await?;
    docs.sort_by(|a, b| cmp_desc(a.get("timestamp"), b.get("timestamp")));

    let processed = processed_readings(store, &date_key).await?;
    let total = docs.len();

    let mut readings = Vec::with_capacity(total);
    for doc in &docs {
        if processed.contains(&doc.id) {
            debug!("Reading {} already processed for {}", doc.id, date_key);
            continue;
        }
        match SensorReading::from_document(doc) {
            Ok(reading) => readings.push(reading),
            Err(e) => warn!("Skipping reading {}: {}", doc.id, e),
        }
    }

    info!(
        "Fetched {} sensor readings for {}, {} usable",
        total,
        date_key,
        readings.len()
    );
    Ok(readings)
}

/// Reading ids already counted in the daily total for `date_key`.
async fn processed_readings(store: &dyn DocumentStore, date_key: &str) -> Result<HashSet<String>> {
    // ---
    let docs = store
        .find_eq(DAILY_COLLECTION, "date", &json!(date_key))
        .await?;
    Ok(docs
        .iter()
        .flat_map(|d| DailyTotal::processed_ids(&d.fields))
        .collect())
}
