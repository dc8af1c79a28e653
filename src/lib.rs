//! Calamansi yield prediction jobs.
//!
//! The `yieldflow` binary wires these modules into its `run-daily`,
//! `harvest-check` and `serve` commands.

pub mod anchor;
pub mod config;
pub mod harvest;
pub mod models;
pub mod pipeline;
pub mod predictor;
pub mod routes;
pub mod schema;
pub mod store;

pub use config::Config;
