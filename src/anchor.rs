//! Time anchor for a single job invocation.
//!
//! "Today" is resolved exactly once, in the farm's civil timezone, and every
//! component derives its date-keys from the resulting [`TimeAnchor`]. Nothing
//! downstream reads the clock to decide which day it is.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;

/// Sensor and prediction documents key days as `07/23/2025`.
pub const DATE_KEY_FORMAT: &str = "%m/%d/%Y";

/// Sortable day representation used for trailing-window ordering.
pub const DATE_ISO_FORMAT: &str = "%Y-%m-%d";

pub const MONTH_KEY_FORMAT: &str = "%Y-%m";

/// Farm records carry harvest dates as `Jan. 24, 2026`.
pub const HARVEST_FORMAT: &str = "%b. %d, %Y";

// ---

/// The resolved "now" of one invocation.
#[derive(Debug, Clone)]
pub struct TimeAnchor {
    // ---
    now: DateTime<Tz>,
    live: bool,
}

impl TimeAnchor {
    // ---
    /// Resolve today from the wall clock in `tz`.
    pub fn resolve(tz: Tz) -> Self {
        Self {
            now: Utc::now().with_timezone(&tz),
            live: true,
        }
    }

    /// Anchor pinned to a fixed instant; `tick` never advances.
    #[cfg(test)]
    pub fn fixed(now: DateTime<Tz>) -> Self {
        Self { now, live: false }
    }

    /// Anchor resolved at `now` whose `tick` follows the wall clock.
    #[cfg(test)]
    pub fn live_from(now: DateTime<Tz>) -> Self {
        Self { now, live: true }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Canonical date-key, e.g. `07/23/2025`.
    pub fn date_key(&self) -> String {
        self.now.format(DATE_KEY_FORMAT).to_string()
    }

    /// ISO form of the date-key, e.g. `2025-07-23`.
    pub fn date_iso(&self) -> String {
        self.now.format(DATE_ISO_FORMAT).to_string()
    }

    /// Month-key, e.g. `2025-07`.
    pub fn month_key(&self) -> String {
        self.now.format(MONTH_KEY_FORMAT).to_string()
    }

    pub fn year(&self) -> i32 {
        self.now.year()
    }

    /// Human-readable run timestamp, e.g. `2025-07-23 02:14 PM`.
    pub fn run_stamp(&self) -> String {
        self.now.format("%Y-%m-%d %I:%M %p").to_string()
    }

    /// Time of day of the run, e.g. `02:14 PM`.
    pub fn time_only(&self) -> String {
        self.now.format("%I:%M %p").to_string()
    }

    /// Today in the farm-record style without zero padding, e.g. `Jan. 4, 2026`.
    pub fn harvest_label(&self) -> String {
        self.now.format("%b. %-d, %Y").to_string()
    }

    /// Current instant for per-record display timestamps. The day is still
    /// the anchor's; only the time of day moves on a live anchor.
    pub fn tick(&self) -> DateTime<Tz> {
        if self.live {
            Utc::now().with_timezone(&self.now.timezone())
        } else {
            self.now
        }
    }
}

/// Parse a farm harvest date such as `Jan. 24, 2026` or `Jan. 4, 2026`.
pub fn parse_harvest_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), HARVEST_FORMAT).ok()
}
