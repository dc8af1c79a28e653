//! Daily prediction-and-rollup job.
//!
//! One linear pass per invocation:
//! 1. read today's unprocessed sensor readings
//! 2. predict a yield per reading
//! 3. store each prediction with a per-day sequence index
//! 4. add the run's total to the day's `DailyReading`
//! 5. forecast from the trailing daily totals
//! 6. fold the run's total and the forecast into the month's summary
//!
//! Every step uses the same [`TimeAnchor`]; nothing reads "today" on its own.

use anyhow::Result;
use tracing::{info, warn};

use crate::anchor::TimeAnchor;
use crate::models::{to_fields, Forecast, TrainingLog, TRAINING_LOG_COLLECTION};
use crate::predictor::{self, FeatureRow, RegressionModel};
use crate::store::DocumentStore;
use crate::Config;

mod forecast;
mod reader;
mod rollup;
mod writer;

pub use forecast::{project, trailing_totals};
pub use reader::fetch;
pub use rollup::{record_daily_total, upsert_monthly};
pub use writer::write_predictions;

// ---

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub flag_source_readings: bool,
    pub forecast_window_days: usize,
}

impl From<&Config> for PipelineOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            flag_source_readings: cfg.flag_source_readings,
            forecast_window_days: cfg.forecast_window_days as usize,
        }
    }
}

/// What a completed run wrote.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub date_key: String,
    pub month_key: String,
    pub predictions: usize,
    pub run_total: f64,
    pub daily_total: f64,
    pub monthly_total: f64,
    pub forecast: Forecast,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Nothing to predict; no prediction or rollup documents were written.
    NoNewReadings,
    Completed(RunReport),
    /// No new readings, but the month had not absorbed all of today's total
    /// yet; the monthly summary was brought up to date.
    CaughtUp(RunReport),
}

/// Run the daily job once for `anchor`'s day.
///
/// Failures on authoritative writes abort the run. Documents written before
/// the failure stay in place.
pub async fn run_daily(
    store: &dyn DocumentStore,
    model: &dyn RegressionModel,
    anchor: &TimeAnchor,
    opts: &PipelineOptions,
) -> Result<RunOutcome> {
    // ---
    let date_key = anchor.date_key();
    info!("Starting daily run for {}", date_key);

    log_training_run(store, anchor).await?;

    let readings = fetch(store, anchor).await?;
    if readings.is_empty() {
        if let Some(daily_total) = rollup::unapplied_daily_total(store, anchor).await? {
            warn!(
                "Month {} is missing part of {} total {:.2}; catching up",
                anchor.month_key(),
                date_key,
                daily_total
            );
            let report = roll_up_month(store, anchor, opts, 0, 0.0, daily_total).await?;
            return Ok(RunOutcome::CaughtUp(report));
        }
        info!("No new sensor data to predict for {}", date_key);
        return Ok(RunOutcome::NoNewReadings);
    }

    let rows: Vec<FeatureRow> = readings.iter().map(|r| r.features()).collect();
    let predicted = predictor::predict(model, &rows).await?;

    let written =
        write_predictions(store, anchor, &readings, &predicted, opts.flag_source_readings).await?;
    info!("{} predictions saved for {}", written.len(), date_key);

    let run_total: f64 = predicted.iter().sum();
    let daily_total = record_daily_total(store, anchor, &readings, run_total).await?;

    let report = roll_up_month(store, anchor, opts, written.len(), run_total, daily_total).await?;
    Ok(RunOutcome::Completed(report))
}

/// Forecast from the trailing daily totals, then fold the day's total and
/// the forecast into the month's summary.
async fn roll_up_month(
    store: &dyn DocumentStore,
    anchor: &TimeAnchor,
    opts: &PipelineOptions,
    predictions: usize,
    run_total: f64,
    daily_total: f64,
) -> Result<RunReport> {
    // ---
    let totals = trailing_totals(store, opts.forecast_window_days).await?;
    let forecast = project(&totals, daily_total, anchor);

    let monthly_total = upsert_monthly(store, anchor, daily_total, &forecast).await?;

    let report = RunReport {
        date_key: anchor.date_key(),
        month_key: anchor.month_key(),
        predictions,
        run_total,
        daily_total,
        monthly_total,
        forecast,
    };
    info!(
        "Run complete: {} predictions, run total {:.2}, day {} {:.2}, month {} {:.2}, \
         1-month forecast {:.2}",
        report.predictions,
        report.run_total,
        report.date_key,
        report.daily_total,
        report.month_key,
        report.monthly_total,
        report.forecast.predicted_1month
    );
    Ok(report)
}

async fn log_training_run(store: &dyn DocumentStore, anchor: &TimeAnchor) -> Result<()> {
    // ---
    let entry = TrainingLog {
        trained_at: anchor.run_stamp(),
        note: "Auto-retrain schedule".to_string(),
    };
    store
        .add(TRAINING_LOG_COLLECTION, to_fields(&entry)?)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{
        DAILY_COLLECTION, MONTHLY_COLLECTION, PREDICTION_COLLECTION, SENSOR_COLLECTION,
    };
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::Asia::Manila;
    use serde_json::{json, Value};

    /// Returns preset outputs regardless of input.
    struct Scripted(Vec<f64>);

    #[async_trait]
    impl RegressionModel for Scripted {
        async fn infer(&self, rows: &[FeatureRow]) -> Result<Vec<f64>> {
            Ok(self.0.iter().copied().take(rows.len()).collect())
        }
    }

    fn anchor(day: u32) -> TimeAnchor {
        TimeAnchor::fixed(Manila.with_ymd_and_hms(2026, 1, day, 10, 0, 0).unwrap())
    }

    fn opts() -> PipelineOptions {
        PipelineOptions {
            flag_source_readings: true,
            forecast_window_days: 30,
        }
    }

    fn seed_reading(store: &MemoryStore, date: &str, temp: f64) -> String {
        store.seed(
            SENSOR_COLLECTION,
            json!({
                "date": date,
                "timestamp": format!("{} {}", date, temp),
                "temperature": temp,
                "humidity": 70,
                "avgSoilMoisture": 40
            }),
        )
    }

    fn completed(outcome: RunOutcome) -> RunReport {
        match outcome {
            RunOutcome::Completed(report) => report,
            other => panic!("expected a completed run, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_one_prediction_per_complete_reading() {
        // ---
        let store = MemoryStore::new();
        seed_reading(&store, "01/05/2026", 30.0);
        seed_reading(&store, "01/05/2026", 31.0);
        store.seed(SENSOR_COLLECTION, json!({ "date": "01/05/2026", "temperature": 29 }));

        let model = Scripted(vec![1.0, 2.0, 3.0]);
        let report = completed(run_daily(&store, &model, &anchor(5), &opts()).await.unwrap());

        assert_eq!(report.predictions, 2);
        assert_eq!(store.docs(PREDICTION_COLLECTION).len(), 2);
        assert_eq!(store.docs(DAILY_COLLECTION).len(), 1);
        assert_eq!(store.docs(MONTHLY_COLLECTION).len(), 1);
    }

    #[tokio::test]
    async fn test_indices_continue_from_existing() {
        // ---
        let store = MemoryStore::new();
        for i in 0..3 {
            store.seed(PREDICTION_COLLECTION, json!({ "date": "01/05/2026", "index": i }));
        }
        seed_reading(&store, "01/05/2026", 30.0);
        seed_reading(&store, "01/05/2026", 31.0);

        let model = Scripted(vec![1.0, 2.0]);
        run_daily(&store, &model, &anchor(5), &opts()).await.unwrap();

        let indices: Vec<Value> = store
            .docs(PREDICTION_COLLECTION)
            .iter()
            .filter_map(|d| d.get("index").cloned())
            .collect();
        assert_eq!(indices, vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
    }

    #[tokio::test]
    async fn test_daily_total_sums_full_precision() {
        // ---
        let store = MemoryStore::new();
        for t in [30.0, 31.0, 32.0] {
            seed_reading(&store, "01/05/2026", t);
        }

        let model = Scripted(vec![1.004, 1.004, 1.004]);
        let report = completed(run_daily(&store, &model, &anchor(5), &opts()).await.unwrap());

        // each stored prediction rounds to 1.00, the total does not sum those
        for doc in store.docs(PREDICTION_COLLECTION) {
            assert_eq!(doc.get("predicted_yield"), Some(&json!(1.0)));
        }
        assert_eq!(report.daily_total, 3.01);
        assert_eq!(
            store.docs(DAILY_COLLECTION)[0].get("total_yield"),
            Some(&json!(3.01))
        );
    }

    #[tokio::test]
    async fn test_monthly_total_across_days() {
        // ---
        let store = MemoryStore::new();
        seed_reading(&store, "01/05/2026", 30.0);
        seed_reading(&store, "01/06/2026", 30.0);

        let first = completed(
            run_daily(&store, &Scripted(vec![12.5]), &anchor(5), &opts())
                .await
                .unwrap(),
        );
        assert_eq!(format!("{:.2}", first.monthly_total), "12.50");

        let second = completed(
            run_daily(&store, &Scripted(vec![7.5]), &anchor(6), &opts())
                .await
                .unwrap(),
        );
        assert_eq!(format!("{:.2}", second.monthly_total), "20.00");

        // forecast averages the two daily totals
        assert_eq!(second.forecast.based_on_days, 2);
        assert_eq!(second.forecast.avg_daily_used, 10.0);
        let monthly = &store.docs(MONTHLY_COLLECTION)[0];
        assert_eq!(monthly.get("predicted_3months"), Some(&json!(900.0)));
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        // ---
        let store = MemoryStore::new();
        seed_reading(&store, "01/04/2026", 30.0);
        store.seed(SENSOR_COLLECTION, json!({ "date": "01/05/2026", "humidity": 70 }));

        let outcome = run_daily(&store, &Scripted(vec![]), &anchor(5), &opts())
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::NoNewReadings));
        assert!(store.docs(PREDICTION_COLLECTION).is_empty());
        assert!(store.docs(DAILY_COLLECTION).is_empty());
        assert!(store.docs(MONTHLY_COLLECTION).is_empty());
    }

    #[tokio::test]
    async fn test_rerun_same_day_is_idempotent() {
        // ---
        let store = MemoryStore::new();
        seed_reading(&store, "01/05/2026", 30.0);
        seed_reading(&store, "01/05/2026", 31.0);
        let model = Scripted(vec![5.0, 7.5]);

        completed(run_daily(&store, &model, &anchor(5), &opts()).await.unwrap());
        let rerun = run_daily(&store, &model, &anchor(5), &opts()).await.unwrap();

        assert!(matches!(rerun, RunOutcome::NoNewReadings));
        assert_eq!(store.docs(PREDICTION_COLLECTION).len(), 2);
        assert_eq!(store.docs(DAILY_COLLECTION).len(), 1);
        let monthly = store.docs(MONTHLY_COLLECTION);
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].get("total_yield"), Some(&json!(12.5)));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent_even_when_flagging_failed() {
        // ---
        let store = MemoryStore::new();
        seed_reading(&store, "01/05/2026", 30.0);
        store.fail_writes_to(SENSOR_COLLECTION);
        let model = Scripted(vec![4.0]);

        completed(run_daily(&store, &model, &anchor(5), &opts()).await.unwrap());
        let rerun = run_daily(&store, &model, &anchor(5), &opts()).await.unwrap();

        assert!(matches!(rerun, RunOutcome::NoNewReadings));
        assert_eq!(
            store.docs(MONTHLY_COLLECTION)[0].get("total_yield"),
            Some(&json!(4.0))
        );
    }

    #[tokio::test]
    async fn test_later_readings_same_day_are_added() {
        // ---
        let store = MemoryStore::new();
        seed_reading(&store, "01/05/2026", 30.0);
        completed(
            run_daily(&store, &Scripted(vec![2.0]), &anchor(5), &opts())
                .await
                .unwrap(),
        );

        seed_reading(&store, "01/05/2026", 33.0);
        let report = completed(
            run_daily(&store, &Scripted(vec![3.0]), &anchor(5), &opts())
                .await
                .unwrap(),
        );

        assert_eq!(report.predictions, 1);
        assert_eq!(report.daily_total, 5.0);
        assert_eq!(report.monthly_total, 5.0);
        assert_eq!(store.docs(DAILY_COLLECTION).len(), 1);
        let last = store.docs(PREDICTION_COLLECTION).pop().unwrap();
        assert_eq!(last.get("index"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_source_reading_is_flagged() {
        // ---
        let store = MemoryStore::new();
        let id = seed_reading(&store, "01/05/2026", 30.0);

        run_daily(&store, &Scripted(vec![3.141_59]), &anchor(5), &opts())
            .await
            .unwrap();

        let reading = store
            .docs(SENSOR_COLLECTION)
            .into_iter()
            .find(|d| d.id == id)
            .unwrap();
        assert_eq!(reading.get("predicted"), Some(&json!(true)));
        assert_eq!(reading.get("predicted_value"), Some(&json!(3.1416)));
        assert_eq!(reading.get("predicted_at"), Some(&json!("2026-01-05 10:00 AM")));

        let prediction = &store.docs(PREDICTION_COLLECTION)[0];
        assert_eq!(prediction.get("predicted_yield"), Some(&json!(3.14)));
        assert_eq!(prediction.get("reading_id"), Some(&json!(id)));
        assert_eq!(prediction.get("source"), Some(&json!("predicted")));
        assert_eq!(prediction.get("hour"), Some(&json!("10")));
        assert_eq!(prediction.get("day"), Some(&json!("5")));
    }

    #[tokio::test]
    async fn test_flag_failure_does_not_abort() {
        // ---
        let store = MemoryStore::new();
        seed_reading(&store, "01/05/2026", 30.0);
        seed_reading(&store, "01/05/2026", 31.0);
        store.fail_writes_to(SENSOR_COLLECTION);

        let report = completed(
            run_daily(&store, &Scripted(vec![1.0, 2.0]), &anchor(5), &opts())
                .await
                .unwrap(),
        );

        assert_eq!(report.predictions, 2);
        assert_eq!(report.monthly_total, 3.0);
    }

    #[tokio::test]
    async fn test_authoritative_failure_aborts_without_rollback() {
        // ---
        let store = MemoryStore::new();
        seed_reading(&store, "01/05/2026", 30.0);
        store.fail_writes_to(MONTHLY_COLLECTION);

        let result = run_daily(&store, &Scripted(vec![1.0]), &anchor(5), &opts()).await;

        assert!(result.is_err());
        assert_eq!(store.docs(PREDICTION_COLLECTION).len(), 1);
        assert_eq!(store.docs(DAILY_COLLECTION).len(), 1);
        assert!(store.docs(MONTHLY_COLLECTION).is_empty());

        // once the store recovers, a rerun folds the stranded day into the month
        store.clear_failures();
        let rerun = run_daily(&store, &Scripted(vec![]), &anchor(5), &opts())
            .await
            .unwrap();

        let report = match rerun {
            RunOutcome::CaughtUp(report) => report,
            other => panic!("expected a catch-up run, got {:?}", other),
        };
        assert_eq!(report.predictions, 0);
        assert_eq!(report.monthly_total, 1.0);
        assert_eq!(store.docs(PREDICTION_COLLECTION).len(), 1);

        let daily = store.docs(DAILY_COLLECTION);
        let monthly = store.docs(MONTHLY_COLLECTION);
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].get("total_yield"), daily[0].get("total_yield"));

        // and nothing is left to catch up afterwards
        let again = run_daily(&store, &Scripted(vec![]), &anchor(5), &opts())
            .await
            .unwrap();
        assert!(matches!(again, RunOutcome::NoNewReadings));
        assert_eq!(store.docs(MONTHLY_COLLECTION)[0].get("total_yield"), Some(&json!(1.0)));
    }

    #[tokio::test]
    async fn test_missed_month_is_caught_up_by_next_batch() {
        // ---
        let store = MemoryStore::new();
        seed_reading(&store, "01/05/2026", 30.0);
        store.fail_writes_to(MONTHLY_COLLECTION);
        assert!(run_daily(&store, &Scripted(vec![2.0]), &anchor(5), &opts())
            .await
            .is_err());

        store.clear_failures();
        seed_reading(&store, "01/05/2026", 31.0);
        let report = completed(
            run_daily(&store, &Scripted(vec![3.0]), &anchor(5), &opts())
                .await
                .unwrap(),
        );

        assert_eq!(report.daily_total, 5.0);
        assert_eq!(report.monthly_total, 5.0);
    }
}
