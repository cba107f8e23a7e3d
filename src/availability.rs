// Availability engine
//
// Answers "can this unit take this stay" from the unit's Confirmed reservations
// that overlap the requested range. The store only understands inclusive date
// comparisons, so the overlap set is assembled from three sub-queries (stay
// starts inside, stay ends inside, stay contains) and then narrowed in-process
// to true half-open overlaps.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, warn};

use crate::cache::keys::{self, ttl, TTL_VERY_SHORT};
use crate::cache::CacheFacade;
use crate::catalog::UnitCatalog;
use crate::error::{BookingError, StoreError};
use crate::gateway::StoreGateway;
use crate::model::{
    AvailabilityResult, DateRange, InventoryModel, Occupancy, Reservation, ReservationState, Unit,
    UnitStatus,
};
use crate::store::schema::{reservation_from_record, reservation_props};
use crate::store::{Collection, Condition, DateCondition, Filter, Query, Record};

#[derive(Clone)]
pub struct AvailabilityEngine {
    gateway: StoreGateway,
    cache: Arc<CacheFacade>,
    catalog: UnitCatalog,
}

fn confirmed_for_unit(unit_id: &str) -> Vec<Filter> {
    vec![
        Filter::property(
            reservation_props::UNIT,
            Condition::RelationContains(unit_id.to_string()),
        ),
        Filter::property(
            reservation_props::STATE,
            Condition::SelectEquals(ReservationState::Confirmed.label().to_string()),
        ),
    ]
}

// The three inclusive branches whose union covers every overlap with `stay`
fn overlap_branches(unit_id: &str, stay: &DateRange) -> [Filter; 3] {
    use reservation_props::{CHECK_IN, CHECK_OUT};

    let branch = |check_in: DateCondition, check_out: DateCondition| {
        let mut parts = confirmed_for_unit(unit_id);
        parts.push(Filter::date(CHECK_IN, check_in));
        parts.push(Filter::date(CHECK_OUT, check_out));
        Filter::And(parts)
    };

    [
        // requested check-in falls inside an existing stay
        branch(
            DateCondition::OnOrBefore(stay.check_in),
            DateCondition::OnOrAfter(stay.check_in),
        ),
        // requested check-out falls inside an existing stay
        branch(
            DateCondition::OnOrBefore(stay.check_out),
            DateCondition::OnOrAfter(stay.check_out),
        ),
        // an existing stay lies within the requested one
        branch(
            DateCondition::OnOrAfter(stay.check_in),
            DateCondition::OnOrBefore(stay.check_out),
        ),
    ]
}

fn readable(records: Vec<Record>) -> Vec<Reservation> {
    records
        .iter()
        .filter_map(|record| match reservation_from_record(record) {
            Ok(reservation) => Some(reservation),
            Err(e) => {
                warn!("Ignoring unreadable reservation: {e}");
                None
            }
        })
        .collect()
}

impl AvailabilityEngine {
    pub fn new(gateway: StoreGateway, cache: Arc<CacheFacade>, catalog: UnitCatalog) -> Self {
        Self {
            gateway,
            cache,
            catalog,
        }
    }

    pub fn catalog(&self) -> &UnitCatalog {
        &self.catalog
    }

    /// Confirmed reservations of `unit_id` overlapping `stay`, deduplicated,
    /// optionally leaving out one reservation (the one being re-checked).
    pub async fn overlapping_confirmed(
        &self,
        unit_id: &str,
        stay: &DateRange,
        exclude: Option<&str>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let mut seen = HashSet::new();
        let mut conflicts = Vec::new();

        for branch in overlap_branches(unit_id, stay) {
            let records = self
                .gateway
                .query_all(Query::new(Collection::Reservations).filter(branch))
                .await?;
            for reservation in readable(records) {
                if seen.insert(reservation.id.clone()) {
                    conflicts.push(reservation);
                }
            }
        }

        // Inclusive branches also catch stays that merely touch at a boundary
        conflicts.retain(|r| {
            r.state == ReservationState::Confirmed
                && r.stay.overlaps(stay)
                && exclude.map_or(true, |id| r.id != id)
        });
        debug!(
            "Unit {unit_id} has {} confirmed reservations overlapping {} to {}",
            conflicts.len(),
            stay.check_in,
            stay.check_out
        );
        Ok(conflicts)
    }

    // Availability of an already-resolved unit; a failed read is returned, never read as "full"
    pub async fn assess(
        &self,
        unit: &Unit,
        stay: &DateRange,
        beds_requested: u32,
        exclude: Option<&str>,
    ) -> Result<AvailabilityResult, BookingError> {
        let beds = match unit.inventory {
            InventoryModel::Exclusive => 1,
            InventoryModel::SharedCapacity { .. } if beds_requested == 0 => {
                return Err(BookingError::Validation(
                    "at least one bed must be requested".into(),
                ))
            }
            InventoryModel::SharedCapacity { .. } => beds_requested,
        };

        let conflicts = self.overlapping_confirmed(&unit.id, stay, exclude).await?;
        let verdict = unit.inventory.evaluate(&conflicts, beds);

        Ok(AvailabilityResult {
            is_available: verdict.is_available,
            conflicting_reservations: conflicts,
            available_beds: verdict.available_beds,
            total_capacity: unit.inventory.total_capacity(),
        })
    }

    pub async fn check_availability(
        &self,
        unit_id: &str,
        stay: &DateRange,
        beds_requested: u32,
        exclude: Option<&str>,
    ) -> Result<AvailabilityResult, BookingError> {
        let unit = self.catalog.get_unit(unit_id).await?;
        self.assess(&unit, stay, beds_requested, exclude).await
    }

    /// Read-only availability for display, cached briefly.
    ///
    /// Booking decisions must go through [`AvailabilityEngine::assess`] instead.
    pub async fn availability_snapshot(
        &self,
        unit_id: &str,
        stay: &DateRange,
        beds_requested: u32,
    ) -> Result<AvailabilityResult, BookingError> {
        let key = keys::unit_availability(unit_id, stay.check_in, stay.check_out, beds_requested);
        if let Some(result) = self.cache.get::<AvailabilityResult>(&key).await {
            return Ok(result);
        }
        let result = self
            .check_availability(unit_id, stay, beds_requested, None)
            .await?;
        self.cache.set(&key, &result, ttl(TTL_VERY_SHORT)).await;
        Ok(result)
    }

    // Occupancy on `day`, from one fetch of confirmed stays that have not ended yet
    pub async fn occupancy_on(&self, unit: &Unit, day: NaiveDate) -> Result<Occupancy, StoreError> {
        let mut filters = confirmed_for_unit(&unit.id);
        filters.push(Filter::date(
            reservation_props::CHECK_OUT,
            DateCondition::OnOrAfter(day),
        ));
        let records = self
            .gateway
            .query_all(Query::new(Collection::Reservations).filter(Filter::And(filters)))
            .await?;
        let stays = readable(records);

        let occupancy = match unit.inventory {
            InventoryModel::Exclusive => {
                let status = if stays.iter().any(|r| r.stay.contains_day(day)) {
                    UnitStatus::Occupied
                } else if stays.iter().any(|r| r.stay.check_in > day) {
                    UnitStatus::Reserved
                } else {
                    UnitStatus::Available
                };
                Occupancy {
                    status,
                    available_beds: None,
                    occupied_beds: None,
                }
            }
            InventoryModel::SharedCapacity { total_capacity } => {
                let occupied = stays
                    .iter()
                    .filter(|r| r.stay.contains_day(day))
                    .map(|r| r.beds_requested.max(1))
                    .fold(0u32, |acc, beds| acc.saturating_add(beds));
                let available = total_capacity.saturating_sub(occupied);
                let status = if available == 0 {
                    UnitStatus::Full
                } else if occupied > 0 {
                    UnitStatus::PartiallyOccupied
                } else {
                    UnitStatus::Available
                };
                Occupancy {
                    status,
                    available_beds: Some(available),
                    occupied_beds: Some(occupied),
                }
            }
        };
        Ok(occupancy)
    }

    /// Advisory occupancy for listings, cached for a few seconds.
    ///
    /// On upstream failure this reports [`UnitStatus::Unknown`] and caches nothing.
    pub async fn advisory_occupancy(&self, unit: &Unit) -> Occupancy {
        let status_key = keys::unit_status(&unit.id);
        let beds_key = keys::unit_available_beds(&unit.id);

        if let Some(status) = self.cache.get::<UnitStatus>(&status_key).await {
            match unit.inventory {
                InventoryModel::Exclusive => {
                    return Occupancy {
                        status,
                        available_beds: None,
                        occupied_beds: None,
                    }
                }
                InventoryModel::SharedCapacity { total_capacity } => {
                    if let Some(available) = self.cache.get::<u32>(&beds_key).await {
                        return Occupancy {
                            status,
                            available_beds: Some(available),
                            occupied_beds: Some(total_capacity.saturating_sub(available)),
                        };
                    }
                }
            }
        }

        match self.occupancy_on(unit, Utc::now().date_naive()).await {
            Ok(occupancy) => {
                let expiry = ttl(TTL_VERY_SHORT);
                self.cache.set(&status_key, &occupancy.status, expiry).await;
                if let Some(available) = occupancy.available_beds {
                    self.cache.set(&beds_key, &available, expiry).await;
                }
                occupancy
            }
            Err(e) => {
                warn!("Could not determine status of unit {}: {e}", unit.id);
                Occupancy {
                    status: UnitStatus::Unknown,
                    available_beds: None,
                    occupied_beds: None,
                }
            }
        }
    }

    pub async fn unit_status(&self, unit_id: &str) -> UnitStatus {
        match self.catalog.get_unit(unit_id).await {
            Ok(unit) => self.advisory_occupancy(&unit).await.status,
            Err(e) => {
                warn!("Could not resolve unit {unit_id} for status: {e}");
                UnitStatus::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::StoreMode;
    use crate::testing::{day, stay, Fixture};

    #[tokio::test(start_paused = true)]
    async fn test_exclusive_boundary_is_not_a_conflict() {
        let fx = Fixture::new();
        fx.cabin("c1");
        fx.reservation("r1", "c1", "2025-06-01", "2025-06-05", 1, ReservationState::Confirmed);

        let crossing = fx
            .engine
            .check_availability("c1", &stay("2025-06-04", "2025-06-08"), 1, None)
            .await
            .unwrap();
        assert!(!crossing.is_available);
        assert_eq!(crossing.conflicting_reservations[0].id, "r1");

        let adjacent = fx
            .engine
            .check_availability("c1", &stay("2025-06-05", "2025-06-08"), 1, None)
            .await
            .unwrap();
        assert!(adjacent.is_available);
        assert!(adjacent.conflicting_reservations.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_overlap_shape_is_found_once() {
        let fx = Fixture::new();
        fx.cabin("c1");
        // starts before, ends inside
        fx.reservation("a", "c1", "2025-03-01", "2025-03-06", 1, ReservationState::Confirmed);
        // starts inside, ends after
        fx.reservation("b", "c1", "2025-03-09", "2025-03-15", 1, ReservationState::Confirmed);
        // contained
        fx.reservation("c", "c1", "2025-03-06", "2025-03-08", 1, ReservationState::Confirmed);
        // contains
        fx.reservation("d", "c1", "2025-02-01", "2025-04-01", 1, ReservationState::Confirmed);
        // not counted
        fx.reservation("e", "c1", "2025-03-06", "2025-03-08", 1, ReservationState::Pending);
        fx.reservation("f", "c1", "2025-03-06", "2025-03-08", 1, ReservationState::Cancelled);
        fx.reservation("g", "c2", "2025-03-06", "2025-03-08", 1, ReservationState::Confirmed);

        let mut ids: Vec<String> = fx
            .engine
            .overlapping_confirmed("c1", &stay("2025-03-05", "2025-03-10"), None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);

        let without_d = fx
            .engine
            .overlapping_confirmed("c1", &stay("2025-03-05", "2025-03-10"), Some("d"))
            .await
            .unwrap();
        assert_eq!(without_d.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hostel_bed_arithmetic() {
        let fx = Fixture::new();
        fx.hostel("h1", 10);
        fx.reservation("r1", "h1", "2025-06-01", "2025-06-02", 4, ReservationState::Confirmed);
        fx.reservation("r2", "h1", "2025-06-01", "2025-06-03", 5, ReservationState::Confirmed);
        let night = stay("2025-06-01", "2025-06-02");

        let two = fx.engine.check_availability("h1", &night, 2, None).await.unwrap();
        assert!(!two.is_available);
        assert_eq!(two.available_beds, Some(1));
        assert_eq!(two.total_capacity, Some(10));

        let one = fx.engine.check_availability("h1", &night, 1, None).await.unwrap();
        assert!(one.is_available);

        let zero = fx.engine.check_availability("h1", &night, 0, None).await;
        assert!(matches!(zero, Err(BookingError::Validation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_surfaces_instead_of_unavailable() {
        let fx = Fixture::new();
        fx.cabin("c1");
        let unit = fx.engine.catalog().get_unit("c1").await.unwrap();
        fx.store.set_mode(StoreMode::CompleteOutage);

        let result = fx
            .engine
            .assess(&unit, &stay("2025-06-01", "2025-06-05"), 1, None)
            .await;
        assert!(matches!(result, Err(BookingError::Upstream(_))));

        assert_eq!(fx.engine.advisory_occupancy(&unit).await.status, UnitStatus::Unknown);
        assert!(fx
            .cache
            .get::<UnitStatus>(&keys::unit_status("c1"))
            .await
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cabin_occupancy_labels() {
        let fx = Fixture::new();
        fx.cabin("c1");
        fx.reservation("r1", "c1", "2025-06-10", "2025-06-12", 1, ReservationState::Confirmed);
        let unit = fx.engine.catalog().get_unit("c1").await.unwrap();

        let status = |d| {
            let engine = fx.engine.clone();
            let unit = unit.clone();
            async move { engine.occupancy_on(&unit, day(d)).await.unwrap().status }
        };
        assert_eq!(status("2025-06-01").await, UnitStatus::Reserved);
        assert_eq!(status("2025-06-11").await, UnitStatus::Occupied);
        assert_eq!(status("2025-06-12").await, UnitStatus::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hostel_occupancy_labels() {
        let fx = Fixture::new();
        fx.hostel("h1", 6);
        fx.reservation("r1", "h1", "2025-06-10", "2025-06-12", 2, ReservationState::Confirmed);
        fx.reservation("r2", "h1", "2025-06-11", "2025-06-12", 4, ReservationState::Confirmed);
        let unit = fx.engine.catalog().get_unit("h1").await.unwrap();

        let partial = fx.engine.occupancy_on(&unit, day("2025-06-10")).await.unwrap();
        assert_eq!(partial.status, UnitStatus::PartiallyOccupied);
        assert_eq!(partial.available_beds, Some(4));

        let full = fx.engine.occupancy_on(&unit, day("2025-06-11")).await.unwrap();
        assert_eq!(full.status, UnitStatus::Full);
        assert_eq!(full.occupied_beds, Some(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_bed_counts_read_as_full() {
        let fx = Fixture::new();
        fx.hostel("h1", 6);
        fx.reservation(
            "r1",
            "h1",
            "2025-06-10",
            "2025-06-12",
            u32::MAX,
            ReservationState::Confirmed,
        );
        fx.reservation(
            "r2",
            "h1",
            "2025-06-10",
            "2025-06-12",
            u32::MAX,
            ReservationState::Confirmed,
        );
        let unit = fx.engine.catalog().get_unit("h1").await.unwrap();

        let occupancy = fx.engine.occupancy_on(&unit, day("2025-06-10")).await.unwrap();
        assert_eq!(occupancy.status, UnitStatus::Full);
        assert_eq!(occupancy.occupied_beds, Some(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_advisory_status_is_cached_briefly() {
        let fx = Fixture::new();
        fx.hostel("h1", 6);
        let unit = fx.engine.catalog().get_unit("h1").await.unwrap();

        let first = fx.engine.advisory_occupancy(&unit).await;
        assert_eq!(first.status, UnitStatus::Available);
        assert_eq!(first.available_beds, Some(6));
        let requests = fx.store.request_count();

        let again = fx.engine.advisory_occupancy(&unit).await;
        assert_eq!(again, first);
        assert_eq!(fx.store.request_count(), requests);

        tokio::time::sleep(std::time::Duration::from_secs(31)).await;
        fx.engine.advisory_occupancy(&unit).await;
        assert_eq!(fx.store.request_count(), requests + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_is_cached() {
        let fx = Fixture::new();
        fx.cabin("c1");
        let range = stay("2025-06-01", "2025-06-05");

        assert!(fx.engine.availability_snapshot("c1", &range, 1).await.unwrap().is_available);
        let requests = fx.store.request_count();
        fx.reservation("r1", "c1", "2025-06-01", "2025-06-05", 1, ReservationState::Confirmed);

        // Still the cached answer until the entry expires or the unit is invalidated
        assert!(fx.engine.availability_snapshot("c1", &range, 1).await.unwrap().is_available);
        assert_eq!(fx.store.request_count(), requests);

        keys::invalidate_unit(&fx.cache, "c1").await;
        assert!(!fx.engine.availability_snapshot("c1", &range, 1).await.unwrap().is_available);
    }
}
