//! Harvest-day cleanup.
//!
//! When any farm's estimated harvest falls on today, the monthly summaries
//! stamped with today's harvest date are stale and get deleted.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::anchor::{parse_harvest_date, TimeAnchor};
use crate::models::{FARM_COLLECTION, MONTHLY_COLLECTION};
use crate::store::DocumentStore;

const FARM_HARVEST_FIELD: &str = "estimatedHarvest";
const SUMMARY_HARVEST_FIELD: &str = "harvestDate";

// ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestReport {
    /// Farms whose estimated harvest is today.
    pub farms: Vec<String>,
    /// Monthly summaries removed.
    pub deleted: usize,
}

pub async fn run_harvest_check(
    store: &dyn DocumentStore,
    anchor: &TimeAnchor,
) -> Result<HarvestReport> {
    // ---
    let today = anchor.today();
    info!("Checking harvest schedule for {}", anchor.harvest_label());

    let mut report = HarvestReport::default();

    for farm in store.list(FARM_COLLECTION).await? {
        let Some(harvest) = farm.get(FARM_HARVEST_FIELD).and_then(|v| v.as_str()) else {
            warn!("Farm {} has no {}", farm.id, FARM_HARVEST_FIELD);
            continue;
        };

        if parse_harvest_date(harvest) == Some(today) {
            info!("Farm {} harvests today ({})", farm.id, harvest);
            report.farms.push(farm.id.clone());
        } else {
            debug!("Farm {} harvest {} is not today", farm.id, harvest);
        }
    }

    if report.farms.is_empty() {
        info!("No farms scheduled for harvest today");
        return Ok(report);
    }

    for summary in store.list(MONTHLY_COLLECTION).await? {
        let Some(harvest) = summary
            .get(SUMMARY_HARVEST_FIELD)
            .and_then(|v| v.as_str())
        else {
            continue;
        };

        if parse_harvest_date(harvest) == Some(today) {
            info!("Deleting monthly summary {} (harvest {})", summary.id, harvest);
            store.delete(MONTHLY_COLLECTION, &summary.id).await?;
            report.deleted += 1;
        }
    }

    info!(
        "Farms harvesting today: {:?}; monthly summaries deleted: {}",
        report.farms, report.deleted
    );
    Ok(report)
}
