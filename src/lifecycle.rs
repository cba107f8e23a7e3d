// Reservation lifecycle: admission, state transitions and the expiry sweep
//
//   Pending -> Confirmed -> Completed
//   Pending -> Cancelled
//   Confirmed -> Cancelled
//
// Creation checks availability, but confirmation is the real admission gate:
// it re-runs the overlap check (without the reservation itself) right before
// the state change, since another booking may have been confirmed in between.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::availability::AvailabilityEngine;
use crate::cache::keys;
use crate::cache::CacheFacade;
use crate::config::ReservationConfig;
use crate::error::{BookingError, CapacityShortfall, EntityKind, StoreError};
use crate::gateway::StoreGateway;
use crate::model::{
    AvailabilityResult, CancelReason, DateRange, InventoryModel, RequesterId, Reservation,
    ReservationState, Unit, UnitId,
};
use crate::store::schema::{
    cancel_properties, new_reservation_properties, reservation_from_record, reservation_props,
    stay_properties, state_properties,
};
use crate::store::{
    Collection, Condition, DateCondition, Filter, Properties, PropertyValue, Query, Record,
};

#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub unit_id: UnitId,
    pub requester_id: Option<RequesterId>,
    pub stay: DateRange,
    pub beds_requested: u32,
    pub price: Option<f64>,
}

// Fields left as None keep their current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationUpdate {
    pub unit_id: Option<UnitId>,
    pub stay: Option<DateRange>,
    pub beds_requested: Option<u32>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub examined: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub units_invalidated: usize,
}

fn shortfall(unit: &Unit, result: &AvailabilityResult, requested: u32) -> CapacityShortfall {
    match unit.inventory {
        InventoryModel::Exclusive => CapacityShortfall::UnitTaken {
            unit_id: unit.id.clone(),
        },
        InventoryModel::SharedCapacity { .. } => CapacityShortfall::NotEnoughBeds {
            unit_id: unit.id.clone(),
            requested,
            available: result.available_beds.unwrap_or(0),
        },
    }
}

fn effective_beds(unit: &Unit, requested: u32) -> u32 {
    match unit.inventory {
        InventoryModel::Exclusive => 1,
        InventoryModel::SharedCapacity { .. } => requested,
    }
}

pub struct ReservationManager {
    gateway: StoreGateway,
    cache: Arc<CacheFacade>,
    engine: AvailabilityEngine,
    config: ReservationConfig,
}

impl ReservationManager {
    pub fn new(
        gateway: StoreGateway,
        cache: Arc<CacheFacade>,
        engine: AvailabilityEngine,
        config: ReservationConfig,
    ) -> Self {
        Self {
            gateway,
            cache,
            engine,
            config,
        }
    }

    pub fn engine(&self) -> &AvailabilityEngine {
        &self.engine
    }

    // Fails with a capacity error unless `unit` can take the stay
    async fn admit(
        &self,
        unit: &Unit,
        stay: &DateRange,
        beds: u32,
        exclude: Option<&str>,
    ) -> Result<(), BookingError> {
        let result = self.engine.assess(unit, stay, beds, exclude).await?;
        if result.is_available {
            Ok(())
        } else {
            let short = shortfall(unit, &result, beds);
            info!("Rejected stay on unit {}: {short}", unit.id);
            Err(BookingError::Capacity(short))
        }
    }

    pub async fn create(&self, request: NewReservation) -> Result<Reservation, BookingError> {
        let stay = DateRange::new(request.stay.check_in, request.stay.check_out)?;
        let unit = self.engine.catalog().get_unit(&request.unit_id).await?;
        let beds = effective_beds(&unit, request.beds_requested);

        self.admit(&unit, &stay, beds, None).await?;

        let properties = new_reservation_properties(
            &unit.id,
            request.requester_id.as_deref(),
            &stay,
            beds,
            request.price,
        );
        let record = self
            .gateway
            .create(Collection::Reservations, properties)
            .await?;
        let reservation = reservation_from_record(&record)?;

        keys::invalidate_unit(&self.cache, &unit.id).await;
        info!(
            "Created pending reservation {} on unit {} ({} to {}, {beds} beds)",
            reservation.id, unit.id, stay.check_in, stay.check_out
        );
        Ok(reservation)
    }

    // Archived (deleted or expired) reservations are still returned, as Cancelled
    pub async fn get(&self, reservation_id: &str) -> Result<Reservation, BookingError> {
        let record = self
            .gateway
            .retrieve(reservation_id)
            .await
            .map_err(|e| BookingError::from_lookup(EntityKind::Reservation, e))?;
        if record.collection != Collection::Reservations {
            return Err(BookingError::NotFound {
                kind: EntityKind::Reservation,
                id: reservation_id.to_string(),
            });
        }
        Ok(reservation_from_record(&record)?)
    }

    async fn write_state(
        &self,
        reservation: &Reservation,
        properties: Properties,
    ) -> Result<Reservation, BookingError> {
        let record = self.gateway.update(&reservation.id, properties).await?;
        keys::invalidate_unit(&self.cache, &reservation.unit_id).await;
        Ok(reservation_from_record(&record)?)
    }

    fn ensure_transition(
        reservation: &Reservation,
        next: ReservationState,
    ) -> Result<(), BookingError> {
        if reservation.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(BookingError::InvalidTransition {
                from: reservation.state,
                to: next,
            })
        }
    }

    pub async fn confirm(&self, reservation_id: &str) -> Result<Reservation, BookingError> {
        let reservation = self.get(reservation_id).await?;
        if reservation.state == ReservationState::Confirmed {
            return Ok(reservation);
        }
        Self::ensure_transition(&reservation, ReservationState::Confirmed)?;

        let unit = self.engine.catalog().get_unit(&reservation.unit_id).await?;
        self.admit(
            &unit,
            &reservation.stay,
            reservation.beds_requested,
            Some(&reservation.id),
        )
        .await?;

        let mut properties = Properties::new();
        state_properties(&mut properties, ReservationState::Confirmed);
        let confirmed = self.write_state(&reservation, properties).await?;
        info!("Confirmed reservation {reservation_id}");
        Ok(confirmed)
    }

    pub async fn cancel(&self, reservation_id: &str) -> Result<Reservation, BookingError> {
        let reservation = self.get(reservation_id).await?;
        Self::ensure_transition(&reservation, ReservationState::Cancelled)?;

        let cancelled = self
            .write_state(&reservation, cancel_properties(CancelReason::Requested))
            .await?;
        info!("Cancelled reservation {reservation_id}");
        Ok(cancelled)
    }

    // Check-out: Confirmed -> Completed
    pub async fn complete(&self, reservation_id: &str) -> Result<Reservation, BookingError> {
        let reservation = self.get(reservation_id).await?;
        Self::ensure_transition(&reservation, ReservationState::Completed)?;

        let mut properties = Properties::new();
        state_properties(&mut properties, ReservationState::Completed);
        let completed = self.write_state(&reservation, properties).await?;
        info!("Completed reservation {reservation_id}");
        Ok(completed)
    }

    pub async fn update(
        &self,
        reservation_id: &str,
        changes: ReservationUpdate,
    ) -> Result<Reservation, BookingError> {
        let current = self.get(reservation_id).await?;
        if current.state.is_terminal() {
            return Err(BookingError::Validation(format!(
                "reservation {reservation_id} is {} and can no longer be changed",
                current.state
            )));
        }

        let unit_id = changes.unit_id.unwrap_or_else(|| current.unit_id.clone());
        let stay = match changes.stay {
            Some(stay) => DateRange::new(stay.check_in, stay.check_out)?,
            None => current.stay,
        };
        let requested_beds = changes.beds_requested.unwrap_or(current.beds_requested);

        let mut properties = Properties::new();
        let booking_changed = unit_id != current.unit_id
            || stay != current.stay
            || requested_beds != current.beds_requested;

        if booking_changed {
            let unit = self.engine.catalog().get_unit(&unit_id).await?;
            let beds = effective_beds(&unit, requested_beds);
            self.admit(&unit, &stay, beds, Some(&current.id)).await?;

            properties.insert(
                reservation_props::UNIT.into(),
                PropertyValue::Relation(vec![unit_id.clone()]),
            );
            stay_properties(&mut properties, &stay);
            properties.insert(
                reservation_props::BEDS.into(),
                PropertyValue::Number(Some(beds as f64)),
            );
        }
        if let Some(price) = changes.price {
            properties.insert(
                reservation_props::PRICE.into(),
                PropertyValue::Number(Some(price)),
            );
        }
        if properties.is_empty() {
            return Ok(current);
        }

        let record = self.gateway.update(&current.id, properties).await?;
        keys::invalidate_unit(&self.cache, &current.unit_id).await;
        if unit_id != current.unit_id {
            keys::invalidate_unit(&self.cache, &unit_id).await;
        }
        info!("Updated reservation {reservation_id}");
        Ok(reservation_from_record(&record)?)
    }

    // Cancels (if still open) and archives the reservation
    pub async fn delete(&self, reservation_id: &str) -> Result<(), BookingError> {
        let reservation = self.get(reservation_id).await?;
        let properties = if reservation.state.is_terminal() {
            Properties::new()
        } else {
            cancel_properties(CancelReason::Requested)
        };
        self.gateway.archive(&reservation.id, properties).await?;
        keys::invalidate_unit(&self.cache, &reservation.unit_id).await;
        info!("Deleted reservation {reservation_id}");
        Ok(())
    }

    async fn list(&self, filter: Filter) -> Result<Vec<Reservation>, StoreError> {
        let records = self
            .gateway
            .query_all(
                Query::new(Collection::Reservations)
                    .filter(filter)
                    .sort_ascending(reservation_props::CHECK_IN),
            )
            .await?;
        Ok(records
            .iter()
            .filter_map(|record: &Record| match reservation_from_record(record) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("Skipping unreadable reservation: {e}");
                    None
                }
            })
            .collect())
    }

    pub async fn list_for_unit(&self, unit_id: &str) -> Result<Vec<Reservation>, StoreError> {
        self.list(Filter::property(
            reservation_props::UNIT,
            Condition::RelationContains(unit_id.to_string()),
        ))
        .await
    }

    pub async fn list_for_requester(
        &self,
        requester_id: &str,
    ) -> Result<Vec<Reservation>, StoreError> {
        self.list(Filter::Or(vec![
            Filter::property(
                reservation_props::REQUESTER,
                Condition::RelationContains(requester_id.to_string()),
            ),
            Filter::property(
                reservation_props::REQUESTER_LEGACY,
                Condition::RelationContains(requester_id.to_string()),
            ),
        ]))
        .await
    }

    // Confirmed stays in progress on `day`
    pub async fn list_active(&self, day: NaiveDate) -> Result<Vec<Reservation>, StoreError> {
        self.list(Filter::And(vec![
            Filter::property(
                reservation_props::STATE,
                Condition::SelectEquals(ReservationState::Confirmed.label().into()),
            ),
            Filter::date(reservation_props::CHECK_IN, DateCondition::OnOrBefore(day)),
            Filter::date(reservation_props::CHECK_OUT, DateCondition::After(day)),
        ]))
        .await
    }

    // Confirmed stays starting after `day`
    pub async fn list_upcoming(&self, day: NaiveDate) -> Result<Vec<Reservation>, StoreError> {
        self.list(Filter::And(vec![
            Filter::property(
                reservation_props::STATE,
                Condition::SelectEquals(ReservationState::Confirmed.label().into()),
            ),
            Filter::date(reservation_props::CHECK_IN, DateCondition::After(day)),
        ]))
        .await
    }

    pub async fn sweep_expired(&self) -> Result<SweepReport, StoreError> {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Cancels (reason "expired") and archives every Pending reservation not
    /// modified within the expiry window before `now`.
    ///
    /// Swept records leave the Pending set, so running it again is a no-op for
    /// them. A failure on one record is logged and counted; the rest still run.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let cutoff = now - self.config.pending_expiry();
        let stale = self
            .gateway
            .query_all(Query::new(Collection::Reservations).filter(Filter::And(vec![
                Filter::property(
                    reservation_props::STATE,
                    Condition::SelectEquals(ReservationState::Pending.label().into()),
                ),
                Filter::LastEditedBefore(cutoff),
            ])))
            .await?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..SweepReport::default()
        };
        let mut units = BTreeSet::new();

        for record in &stale {
            match self
                .gateway
                .archive(&record.id, cancel_properties(CancelReason::Expired))
                .await
            {
                Ok(_) => {
                    report.cancelled += 1;
                    if let Ok(reservation) = reservation_from_record(record) {
                        units.insert(reservation.unit_id);
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Could not expire reservation {}: {e}", record.id);
                }
            }
        }

        for unit_id in &units {
            keys::invalidate_unit(&self.cache, unit_id).await;
        }
        report.units_invalidated = units.len();

        info!(
            "Expiry sweep: {} stale, {} cancelled, {} failed",
            report.examined, report.cancelled, report.failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::UnitStatus;
    use crate::testing::{day, stay, Fixture};
    use tokio_test::{assert_err, assert_ok};
    use chrono::Duration;

    fn booking(unit: &str, check_in: &str, check_out: &str, beds: u32) -> NewReservation {
        NewReservation {
            unit_id: unit.into(),
            requester_id: Some("team-1".into()),
            stay: stay(check_in, check_out),
            beds_requested: beds,
            price: Some(120.0),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cabin_create_respects_half_open_boundary() {
        let fx = Fixture::new();
        let manager = fx.manager();
        fx.cabin("c1");
        fx.reservation("r1", "c1", "2025-06-01", "2025-06-05", 1, ReservationState::Confirmed);

        let err = manager
            .create(booking("c1", "2025-06-04", "2025-06-08", 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);
        assert!(matches!(
            err,
            BookingError::Capacity(CapacityShortfall::UnitTaken { .. })
        ));

        let created = manager
            .create(booking("c1", "2025-06-05", "2025-06-08", 1))
            .await
            .unwrap();
        assert_eq!(created.state, ReservationState::Pending);
        assert_eq!(created.requester_id.as_deref(), Some("team-1"));
        assert_eq!(created.beds_requested, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hostel_capacity_reports_shortfall() {
        let fx = Fixture::new();
        let manager = fx.manager();
        fx.hostel("h1", 10);
        fx.reservation("r1", "h1", "2025-06-01", "2025-06-02", 4, ReservationState::Confirmed);
        fx.reservation("r2", "h1", "2025-06-01", "2025-06-02", 5, ReservationState::Confirmed);

        let err = manager
            .create(booking("h1", "2025-06-01", "2025-06-02", 2))
            .await
            .unwrap_err();
        match err {
            BookingError::Capacity(short) => {
                assert_eq!(short.shortfall(), 1);
                assert!(short.to_string().contains("only 1 beds available"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let one = manager
            .create(booking("h1", "2025-06-01", "2025-06-02", 1))
            .await
            .unwrap();
        let confirmed = manager.confirm(&one.id).await.unwrap();
        assert_eq!(confirmed.state, ReservationState::Confirmed);

        let zero = manager.create(booking("h1", "2025-06-03", "2025-06-04", 0)).await;
        assert_eq!(zero.unwrap_err().kind(), ErrorKind::Validation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_rechecks_against_later_confirmations() {
        let fx = Fixture::new();
        let manager = fx.manager();
        fx.cabin("c1");

        let first = manager.create(booking("c1", "2025-07-01", "2025-07-04", 1)).await.unwrap();
        let second = manager.create(booking("c1", "2025-07-02", "2025-07-05", 1)).await.unwrap();

        manager.confirm(&second.id).await.unwrap();
        let err = manager.confirm(&first.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);
        assert_eq!(manager.get(&first.id).await.unwrap().state, ReservationState::Pending);

        // Confirming twice is a no-op
        let again = manager.confirm(&second.id).await.unwrap();
        assert_eq!(again.state, ReservationState::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_states_reject_transitions() {
        let fx = Fixture::new();
        let manager = fx.manager();
        fx.cabin("c1");
        let r = manager.create(booking("c1", "2025-08-01", "2025-08-03", 1)).await.unwrap();

        assert!(matches!(
            manager.complete(&r.id).await,
            Err(BookingError::InvalidTransition { .. })
        ));
        manager.confirm(&r.id).await.unwrap();
        let done = manager.complete(&r.id).await.unwrap();
        assert_eq!(done.state, ReservationState::Completed);

        for result in [
            manager.cancel(&r.id).await,
            manager.confirm(&r.id).await,
        ] {
            assert!(matches!(result, Err(BookingError::InvalidTransition { .. })));
        }
        assert_eq!(
            manager.update(&r.id, ReservationUpdate::default()).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_frees_the_unit() {
        let fx = Fixture::new();
        let manager = fx.manager();
        fx.cabin("c1");
        let r = manager.create(booking("c1", "2025-09-01", "2025-09-03", 1)).await.unwrap();
        manager.confirm(&r.id).await.unwrap();

        let clash = manager.create(booking("c1", "2025-09-02", "2025-09-04", 1)).await;
        assert_err!(clash);

        let cancelled = manager.cancel(&r.id).await.unwrap();
        assert_eq!(cancelled.state, ReservationState::Cancelled);
        assert_eq!(cancelled.cancel_reason, Some(CancelReason::Requested));
        assert_ok!(manager.create(booking("c1", "2025-09-02", "2025-09-04", 1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_moves_between_units() {
        let fx = Fixture::new();
        let manager = fx.manager();
        fx.cabin("c1");
        fx.cabin("c2");
        fx.reservation("busy", "c2", "2025-10-01", "2025-10-05", 1, ReservationState::Confirmed);
        let r = manager.create(booking("c1", "2025-10-01", "2025-10-03", 1)).await.unwrap();
        manager.confirm(&r.id).await.unwrap();

        // Own dates never conflict with themselves
        let extended = manager
            .update(
                &r.id,
                ReservationUpdate {
                    stay: Some(stay("2025-10-01", "2025-10-04")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(extended.stay.check_out, day("2025-10-04"));

        let moved = manager
            .update(
                &r.id,
                ReservationUpdate {
                    unit_id: Some("c2".into()),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(moved.unwrap_err().kind(), ErrorKind::Capacity);

        fx.cache
            .set(&keys::unit_status("c1"), &UnitStatus::Occupied, keys::ttl(30))
            .await;
        let repriced = manager
            .update(
                &r.id,
                ReservationUpdate {
                    unit_id: Some("c1".into()),
                    stay: Some(stay("2025-10-10", "2025-10-12")),
                    price: Some(99.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(repriced.price, Some(99.0));
        assert!(fx
            .cache
            .get::<UnitStatus>(&keys::unit_status("c1"))
            .await
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_archives_as_cancelled() {
        let fx = Fixture::new();
        let manager = fx.manager();
        fx.cabin("c1");
        let r = manager.create(booking("c1", "2025-11-01", "2025-11-03", 1)).await.unwrap();

        manager.delete(&r.id).await.unwrap();
        let gone = manager.get(&r.id).await.unwrap();
        assert_eq!(gone.state, ReservationState::Cancelled);
        assert!(fx.store.snapshot(&r.id).unwrap().archived);
        assert!(manager.list_for_unit("c1").await.unwrap().is_empty());

        assert!(matches!(
            manager.get("missing").await,
            Err(BookingError::NotFound { kind: EntityKind::Reservation, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_respects_expiry_window() {
        let fx = Fixture::new();
        let manager = fx.manager();
        fx.cabin("c1");
        fx.reservation("p1", "c1", "2025-12-01", "2025-12-03", 1, ReservationState::Pending);
        fx.reservation("k1", "c1", "2025-12-05", "2025-12-07", 1, ReservationState::Confirmed);
        let t = Utc::now();

        let early = manager.sweep_expired_at(t + Duration::hours(1)).await.unwrap();
        assert_eq!(early, SweepReport::default());
        assert_eq!(manager.get("p1").await.unwrap().state, ReservationState::Pending);

        let late = manager.sweep_expired_at(t + Duration::hours(25)).await.unwrap();
        assert_eq!(late.examined, 1);
        assert_eq!(late.cancelled, 1);
        assert_eq!(late.units_invalidated, 1);

        let swept = manager.get("p1").await.unwrap();
        assert_eq!(swept.state, ReservationState::Cancelled);
        assert_eq!(swept.cancel_reason, Some(CancelReason::Expired));
        assert_eq!(manager.get("k1").await.unwrap().state, ReservationState::Confirmed);

        // Idempotent
        let rerun = manager.sweep_expired_at(t + Duration::hours(26)).await.unwrap();
        assert_eq!(rerun.examined, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_continues_past_a_failing_record() {
        let fx = Fixture::new();
        let manager = fx.manager();
        fx.cabin("c1");
        fx.cabin("c2");
        fx.reservation("p1", "c1", "2025-12-01", "2025-12-03", 1, ReservationState::Pending);
        fx.reservation("p2", "c2", "2025-12-01", "2025-12-03", 1, ReservationState::Pending);
        fx.store.fail_writes_to("p1");

        let report = manager
            .sweep_expired_at(Utc::now() + Duration::hours(30))
            .await
            .unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(manager.get("p2").await.unwrap().state, ReservationState::Cancelled);

        fx.store.clear_write_failures();
        let retry = manager
            .sweep_expired_at(Utc::now() + Duration::hours(30))
            .await
            .unwrap();
        assert_eq!(retry.cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_queries() {
        let fx = Fixture::new();
        let manager = fx.manager();
        fx.cabin("c1");
        fx.reservation("a", "c1", "2025-06-01", "2025-06-05", 1, ReservationState::Confirmed);
        fx.reservation("b", "c1", "2025-06-10", "2025-06-12", 1, ReservationState::Confirmed);
        fx.reservation("c", "c1", "2025-06-02", "2025-06-03", 1, ReservationState::Pending);

        let active: Vec<_> = manager
            .list_active(day("2025-06-04"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(active, vec!["a"]);
        assert!(manager.list_active(day("2025-06-05")).await.unwrap().is_empty());

        let upcoming = manager.list_upcoming(day("2025-06-05")).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, "b");

        let all: Vec<_> = manager
            .list_for_unit("c1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(all, vec!["a", "c", "b"]);

        let created = manager
            .create(booking("c1", "2025-07-01", "2025-07-02", 1))
            .await
            .unwrap();
        let mine = manager.list_for_requester("team-1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, created.id);
    }
}
