// Cache key layout, TTL tiers and invalidation helpers

use std::time::Duration;

use chrono::NaiveDate;
use tracing::debug;

use super::CacheFacade;
use crate::model::AccommodationType;

// TTL tiers, in seconds
pub const TTL_DEFAULT: u64 = 300;
pub const TTL_LONG: u64 = 3600;
pub const TTL_SHORT: u64 = 60;
pub const TTL_VERY_SHORT: u64 = 30;
pub const TTL_SLUG: u64 = 1800;

pub fn ttl(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

pub fn unit_status(unit_id: &str) -> String {
    format!("unit:{unit_id}:status")
}

pub fn unit_available_beds(unit_id: &str) -> String {
    format!("unit:{unit_id}:available_beds")
}

pub fn unit_detail(unit_id: &str) -> String {
    format!("unit:{unit_id}:detail")
}

pub fn unit_availability(
    unit_id: &str,
    check_in: NaiveDate,
    check_out: NaiveDate,
    beds: u32,
) -> String {
    format!("unit:{unit_id}:availability:{check_in}:{check_out}:{beds}")
}

pub fn unit_slug(slug: &str) -> String {
    format!("unit:slug:{slug}")
}

// Every per-unit entry, including availability snapshots
pub fn unit_pattern(unit_id: &str) -> String {
    format!("unit:{unit_id}:*")
}

pub const ALL_UNITS: &str = "units:all";
pub const AVAILABLE_UNITS: &str = "units:available";
pub const RESERVED_UNITS: &str = "units:reserved";
pub const CABINS_ONLY: &str = "units:cabins";
pub const HOSTELS_ONLY: &str = "units:hostels";

pub fn by_type(accommodation: AccommodationType) -> &'static str {
    match accommodation {
        AccommodationType::Exclusive => CABINS_ONLY,
        AccommodationType::SharedCapacity => HOSTELS_ONLY,
    }
}

// Listing keys narrowed to one accommodation type, e.g. `units:available:hostels`
pub fn scoped(base: &str, accommodation: Option<AccommodationType>) -> String {
    match accommodation {
        Some(t) => format!("{base}:{}", t.label()),
        None => base.to_string(),
    }
}

/// Drops every cached view of one unit, then the aggregate listings that embed it.
pub async fn invalidate_unit(cache: &CacheFacade, unit_id: &str) {
    let removed = cache.del_by_pattern(&unit_pattern(unit_id)).await;
    debug!("Invalidated {removed} cache entries for unit {unit_id}");
    invalidate_listings(cache).await;
}

pub async fn invalidate_listings(cache: &CacheFacade) {
    for key in [ALL_UNITS, AVAILABLE_UNITS, RESERVED_UNITS, CABINS_ONLY, HOSTELS_ONLY] {
        cache.del(key).await;
    }
    cache.del_by_pattern(&format!("{AVAILABLE_UNITS}:*")).await;
    cache.del_by_pattern(&format!("{RESERVED_UNITS}:*")).await;
}

// Every per-unit key and every listing key
pub const FAMILIES: [&str; 2] = ["unit:*", "units:*"];

// Full purge of unit and listing keys; returns the number of keys removed
pub async fn purge_all(cache: &CacheFacade) -> u64 {
    let mut removed = 0;
    for family in FAMILIES {
        removed += cache.del_by_pattern(family).await;
    }
    removed
}
