//! Trailing-average yield forecast.

use anyhow::Result;
use tracing::{debug, warn};

use crate::anchor::TimeAnchor;
use crate::models::{as_number, round_to, Forecast, DAILY_COLLECTION};
use crate::store::DocumentStore;

/// Days per projected month.
const MONTH_DAYS: f64 = 30.0;

// ---

/// Totals of the `window` most recent daily documents, newest first.
/// Unparseable totals are skipped.
pub async fn trailing_totals(store: &dyn DocumentStore, window: usize) -> Result<Vec<f64>> {
    // ---
    let docs = store.latest(DAILY_COLLECTION, "date_iso", window).await?;

    let totals: Vec<f64> = docs
        .iter()
        .filter_map(|doc| match doc.get("total_yield").and_then(as_number) {
            Some(total) => Some(total),
            None => {
                warn!("Skipping daily total {} with unusable total_yield", doc.id);
                None
            }
        })
        .collect();

    debug!("Trailing window: {} of {} daily totals usable", totals.len(), docs.len());
    Ok(totals)
}

/// Project 1/2/3-month yields from the mean of `totals`. With no usable
/// totals, `fallback` stands in as the daily average.
pub fn project(totals: &[f64], fallback: f64, anchor: &TimeAnchor) -> Forecast {
    // ---
    let avg = if totals.is_empty() {
        fallback
    } else {
        totals.iter().sum::<f64>() / totals.len() as f64
    };

    Forecast {
        based_on_days: totals.len(),
        avg_daily_used: round_to(avg, 2),
        predicted_1month: round_to(avg * MONTH_DAYS, 2),
        predicted_2months: round_to(avg * MONTH_DAYS * 2.0, 2),
        predicted_3months: round_to(avg * MONTH_DAYS * 3.0, 2),
        predicted_next_day: round_to(avg, 2),
        calculated_at: anchor.run_stamp(),
        forecast_generated_on: anchor.date_key(),
    }
}
