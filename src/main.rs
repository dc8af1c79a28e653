//! Application entry point for `yieldflow`.
//!
//! One binary, three commands:
//! - `run-daily`     – predict today's sensor readings and roll the results
//!   into daily and monthly totals with a forecast (scheduled once a day)
//! - `harvest-check` – delete monthly summaries stamped with today's harvest
//!   date when a farm harvests today
//! - `serve`         – HTTP wrapper exposing the model (`/predict`) and
//!   triggering `run-daily` out-of-process (`/train`)
//!
//! Every command loads configuration from environment variables or `.env`
//! and initializes structured logging first. The jobs additionally connect
//! to the document store and ensure its schema exists.
//!
//! # Environment Variables
//! - `YIELD_STORE_KEY` / `YIELD_STORE_KEY_FILE` – store credentials (one is **required**)
//! - `YIELDFLOW_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `YIELDFLOW_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config` for the remaining settings.
use std::{env, io::IsTerminal, net::SocketAddr, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use yieldflow::anchor::TimeAnchor;
use yieldflow::pipeline::{self, PipelineOptions, RunOutcome};
use yieldflow::store::PgDocumentStore;
use yieldflow::{config, harvest, predictor, routes, schema, Config};

// ---

#[derive(Debug, Parser)]
#[command(name = "yieldflow", version, about = "Calamansi yield prediction jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Predict today's readings and update daily/monthly totals and forecast
    RunDaily,
    /// Remove monthly summaries made stale by a harvest today
    HarvestCheck,
    /// Serve the prediction HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cli = Cli::parse();
    let cfg = config::load_from_env()?;
    cfg.log_config();

    match cli.command {
        Command::RunDaily => run_daily(cfg).await,
        Command::HarvestCheck => harvest_check(cfg).await,
        Command::Serve => serve(cfg).await,
    }
}

async fn connect_store(cfg: &Config) -> Result<PgDocumentStore> {
    // ---
    let store = PgDocumentStore::connect(cfg).await?;
    schema::create_schema(store.pool()).await?;
    Ok(store)
}

async fn run_daily(cfg: Config) -> Result<()> {
    // ---
    let store = connect_store(&cfg).await?;
    let model = predictor::load_model(&cfg)?;
    let anchor = TimeAnchor::resolve(cfg.farm_tz);

    let outcome =
        pipeline::run_daily(&store, model.as_ref(), &anchor, &PipelineOptions::from(&cfg)).await?;

    match outcome {
        RunOutcome::NoNewReadings => tracing::info!("Nothing to do for {}", anchor.date_key()),
        RunOutcome::Completed(report) | RunOutcome::CaughtUp(report) => tracing::info!(
            "Monthly yield summary for {}: {:.2}",
            report.month_key,
            report.monthly_total
        ),
    }
    Ok(())
}

async fn harvest_check(cfg: Config) -> Result<()> {
    // ---
    let store = connect_store(&cfg).await?;
    let anchor = TimeAnchor::resolve(cfg.farm_tz);
    harvest::run_harvest_check(&store, &anchor).await?;
    Ok(())
}

async fn serve(cfg: Config) -> Result<()> {
    // ---
    let model: routes::SharedModel = Arc::from(predictor::load_model(&cfg)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    let app = routes::router(model, cfg)?;

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `YIELDFLOW_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `YIELDFLOW_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("YIELDFLOW_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to YIELDFLOW_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("YIELDFLOW_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
