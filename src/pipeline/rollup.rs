//! Daily and monthly rollups.
//!
//! Both are read-modify-write on shared documents and therefore go through
//! the store's atomic `update_where`, keyed by date-key and month-key.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use serde_json::json;
use tracing::info;

use crate::anchor::TimeAnchor;
use crate::models::{
    as_number, round_to, to_fields, DailyTotal, Forecast, MonthlySummary, SensorReading,
    DAILY_COLLECTION, MONTHLY_COLLECTION,
};
use crate::store::{Document, DocumentStore, Fields};

// ---

fn stored_total(doc: &Document) -> Result<f64> {
    doc.get("total_yield")
        .and_then(as_number)
        .ok_or_else(|| anyhow!("Document {} has no numeric total_yield", doc.id))
}

/// Add this run's total to the day's `DailyReading`, creating it on the first
/// run of the day, and record which readings it covers.
///
/// `delta` is the full-precision sum of the run's predictions; rounding
/// happens only on the stored value. Returns the day's total after the merge.
pub async fn record_daily_total(
    store: &dyn DocumentStore,
    anchor: &TimeAnchor,
    readings: &[SensorReading],
    delta: f64,
) -> Result<f64> {
    // ---
    let date_key = anchor.date_key();
    let run_ids: Vec<String> = readings.iter().map(|r| r.id.clone()).collect();

    let apply = |current: Option<&Fields>| -> Result<Fields> {
        // ---
        let (previous, mut processed, runs) = match current {
            Some(fields) => (
                fields.get("total_yield").and_then(as_number).unwrap_or(0.0),
                DailyTotal::processed_ids(fields),
                fields.get("runs").and_then(|v| v.as_u64()).unwrap_or(0),
            ),
            None => (0.0, Vec::new(), 0),
        };
        for id in &run_ids {
            if !processed.contains(id) {
                processed.push(id.clone());
            }
        }

        to_fields(&DailyTotal {
            date: date_key.clone(),
            date_iso: anchor.date_iso(),
            total_yield: round_to(previous + delta, 2),
            trained_at: anchor.run_stamp(),
            processed_readings: processed,
            runs: runs + 1,
        })
    };

    let doc = store
        .update_where(DAILY_COLLECTION, "date", &json!(date_key), &apply)
        .await?;
    let total = stored_total(&doc)?;

    info!("Daily total for {}: {:.2}", date_key, total);
    Ok(total)
}

/// Fold the day's total into the month's running total and merge `forecast`
/// into the same summary document in one atomic update. Creates the summary
/// on the first run of a month.
///
/// The summary keeps how much of each day it has absorbed in `daily_applied`,
/// so only the difference to `daily_total` is added. A day whose earlier
/// monthly update failed is therefore caught up by the next run instead of
/// being lost. Returns the month's total after the merge.
pub async fn upsert_monthly(
    store: &dyn DocumentStore,
    anchor: &TimeAnchor,
    daily_total: f64,
    forecast: &Forecast,
) -> Result<f64> {
    // ---
    let month_key = anchor.month_key();
    let date_key = anchor.date_key();

    let apply = |current: Option<&Fields>| -> Result<Fields> {
        // ---
        let (previous, mut applied) = match current {
            Some(fields) => (
                fields.get("total_yield").and_then(as_number).unwrap_or(0.0),
                MonthlySummary::applied_days(fields),
            ),
            None => (0.0, BTreeMap::new()),
        };
        let already = applied.insert(date_key.clone(), daily_total).unwrap_or(0.0);

        to_fields(&MonthlySummary {
            month: month_key.clone(),
            year: anchor.year(),
            total_yield: round_to(previous + daily_total - already, 2),
            past_updated: anchor.run_stamp(),
            format_time_update: anchor.time_only(),
            forecast: forecast.clone(),
            daily_applied: applied,
        })
    };

    let doc = store
        .update_where(MONTHLY_COLLECTION, "month", &json!(month_key), &apply)
        .await?;
    let total = stored_total(&doc)?;

    info!("Monthly total for {}: {:.2}", month_key, total);
    Ok(total)
}

/// Today's daily total when the month's summary has not absorbed all of it,
/// which happens when a run failed between the daily and monthly updates.
pub async fn unapplied_daily_total(
    store: &dyn DocumentStore,
    anchor: &TimeAnchor,
) -> Result<Option<f64>> {
    // ---
    let date_key = anchor.date_key();
    let daily = store
        .find_eq(DAILY_COLLECTION, "date", &json!(date_key))
        .await?;
    let daily_total = daily
        .first()
        .and_then(|doc| doc.get("total_yield"))
        .and_then(as_number);
    let Some(daily_total) = daily_total else {
        return Ok(None);
    };

    let monthly = store
        .find_eq(MONTHLY_COLLECTION, "month", &json!(anchor.month_key()))
        .await?;
    let applied = monthly
        .first()
        .and_then(|doc| MonthlySummary::applied_days(&doc.fields).remove(&date_key))
        .unwrap_or(0.0);

    Ok(((daily_total - applied).abs() >= 0.005).then_some(daily_total))
}
