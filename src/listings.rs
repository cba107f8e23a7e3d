// Unit listings enriched with advisory occupancy
//
// The status shown here is informational only. A unit whose status could not be
// determined is reported as Unknown and, for cabins, still listed as available.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::availability::AvailabilityEngine;
use crate::cache::keys::{self, ttl, TTL_SHORT};
use crate::cache::CacheFacade;
use crate::error::StoreError;
use crate::model::{AccommodationType, Occupancy, Unit, UnitStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitListing {
    pub unit: Unit,
    pub reservation_status: UnitStatus,
    pub available_beds: Option<u32>,
    pub occupied_beds: Option<u32>,
}

impl UnitListing {
    fn new(unit: Unit, occupancy: Occupancy) -> Self {
        Self {
            unit,
            reservation_status: occupancy.status,
            available_beds: occupancy.available_beds,
            occupied_beds: occupancy.occupied_beds,
        }
    }

    pub fn accommodation_type(&self) -> AccommodationType {
        self.unit.accommodation_type()
    }

    fn is_bookable(&self) -> bool {
        match self.accommodation_type() {
            AccommodationType::SharedCapacity => self.available_beds.unwrap_or(0) > 0,
            AccommodationType::Exclusive => matches!(
                self.reservation_status,
                UnitStatus::Available | UnitStatus::Unknown
            ),
        }
    }

    fn is_taken(&self) -> bool {
        match self.accommodation_type() {
            AccommodationType::SharedCapacity => self.occupied_beds.unwrap_or(0) > 0,
            AccommodationType::Exclusive => matches!(
                self.reservation_status,
                UnitStatus::Reserved | UnitStatus::Occupied
            ),
        }
    }
}

#[derive(Clone)]
pub struct ListingService {
    cache: Arc<CacheFacade>,
    engine: AvailabilityEngine,
}

impl ListingService {
    pub fn new(cache: Arc<CacheFacade>, engine: AvailabilityEngine) -> Self {
        Self { cache, engine }
    }

    async fn enrich(&self, units: Vec<Unit>) -> Vec<UnitListing> {
        let occupancies = join_all(units.iter().map(|u| self.engine.advisory_occupancy(u))).await;
        units
            .into_iter()
            .zip(occupancies)
            .map(|(unit, occupancy)| UnitListing::new(unit, occupancy))
            .collect()
    }

    pub async fn list_units(&self) -> Result<Vec<UnitListing>, StoreError> {
        if let Some(cached) = self.cache.get::<Vec<UnitListing>>(keys::ALL_UNITS).await {
            return Ok(cached);
        }

        let units = self.engine.catalog().list_units(None).await?;
        let listings = self.enrich(units).await;

        let expiry = self.cache.default_ttl();
        self.cache.set(keys::ALL_UNITS, &listings, expiry).await;
        for accommodation in [AccommodationType::Exclusive, AccommodationType::SharedCapacity] {
            let subset: Vec<&UnitListing> = listings
                .iter()
                .filter(|l| l.accommodation_type() == accommodation)
                .collect();
            self.cache.set(keys::by_type(accommodation), &subset, expiry).await;
        }
        debug!("Built listing of {} units", listings.len());
        Ok(listings)
    }

    pub async fn list_by_type(
        &self,
        accommodation: AccommodationType,
    ) -> Result<Vec<UnitListing>, StoreError> {
        let key = keys::by_type(accommodation);
        if let Some(cached) = self.cache.get::<Vec<UnitListing>>(key).await {
            return Ok(cached);
        }

        let listings: Vec<UnitListing> = self
            .list_units()
            .await?
            .into_iter()
            .filter(|l| l.accommodation_type() == accommodation)
            .collect();
        self.cache.set(key, &listings, self.cache.default_ttl()).await;
        Ok(listings)
    }

    async fn list_where(
        &self,
        base_key: &str,
        accommodation: Option<AccommodationType>,
        keep: fn(&UnitListing) -> bool,
    ) -> Result<Vec<UnitListing>, StoreError> {
        let key = keys::scoped(base_key, accommodation);
        if let Some(cached) = self.cache.get::<Vec<UnitListing>>(&key).await {
            return Ok(cached);
        }

        let listings: Vec<UnitListing> = self
            .list_units()
            .await?
            .into_iter()
            .filter(|l| accommodation.map_or(true, |t| l.accommodation_type() == t))
            .filter(keep)
            .collect();
        self.cache.set(&key, &listings, ttl(TTL_SHORT)).await;
        Ok(listings)
    }

    // Cabins that are free (or whose status is unknown) and hostels with a free bed today
    pub async fn list_available(
        &self,
        accommodation: Option<AccommodationType>,
    ) -> Result<Vec<UnitListing>, StoreError> {
        self.list_where(keys::AVAILABLE_UNITS, accommodation, UnitListing::is_bookable)
            .await
    }

    // Cabins reserved or occupied and hostels with at least one occupied bed
    pub async fn list_reserved(
        &self,
        accommodation: Option<AccommodationType>,
    ) -> Result<Vec<UnitListing>, StoreError> {
        self.list_where(keys::RESERVED_UNITS, accommodation, UnitListing::is_taken)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReservationState;
    use crate::store::memory::StoreMode;
    use crate::testing::Fixture;
    use chrono::{Duration, Utc};

    fn iso(offset_days: i64) -> String {
        (Utc::now().date_naive() + Duration::days(offset_days))
            .format("%Y-%m-%d")
            .to_string()
    }

    fn ids(listings: &[UnitListing]) -> Vec<&str> {
        listings.iter().map(|l| l.unit.id.as_str()).collect()
    }

    fn seed_town(fx: &Fixture) {
        fx.cabin("free");
        fx.cabin("future");
        fx.cabin("now");
        fx.hostel("hostel-full", 2);
        fx.hostel("hostel-part", 4);
        fx.reservation("r1", "future", &iso(5), &iso(7), 1, ReservationState::Confirmed);
        fx.reservation("r2", "now", &iso(-1), &iso(2), 1, ReservationState::Confirmed);
        fx.reservation("r3", "hostel-full", &iso(0), &iso(1), 2, ReservationState::Confirmed);
        fx.reservation("r4", "hostel-part", &iso(-2), &iso(3), 1, ReservationState::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_statuses() {
        let fx = Fixture::new();
        seed_town(&fx);
        let listings = fx.listings();

        let all = listings.list_units().await.unwrap();
        let status = |id: &str| {
            all.iter()
                .find(|l| l.unit.id == id)
                .map(|l| l.reservation_status)
                .unwrap()
        };
        assert_eq!(status("free"), UnitStatus::Available);
        assert_eq!(status("future"), UnitStatus::Reserved);
        assert_eq!(status("now"), UnitStatus::Occupied);
        assert_eq!(status("hostel-full"), UnitStatus::Full);
        assert_eq!(status("hostel-part"), UnitStatus::PartiallyOccupied);

        let mut available = ids(&listings.list_available(None).await.unwrap())
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        available.sort();
        assert_eq!(available, vec!["free", "hostel-part"]);

        let reserved = listings
            .list_reserved(Some(AccommodationType::Exclusive))
            .await
            .unwrap();
        let mut reserved: Vec<&str> = ids(&reserved);
        reserved.sort();
        assert_eq!(reserved, vec!["future", "now"]);

        let hostels = listings
            .list_by_type(AccommodationType::SharedCapacity)
            .await
            .unwrap();
        assert_eq!(hostels.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_is_served_from_cache() {
        let fx = Fixture::new();
        seed_town(&fx);
        let listings = fx.listings();

        listings.list_units().await.unwrap();
        let requests = fx.store.request_count();
        listings.list_by_type(AccommodationType::Exclusive).await.unwrap();
        listings.list_units().await.unwrap();
        assert_eq!(fx.store.request_count(), requests);

        keys::invalidate_listings(&fx.cache).await;
        listings.list_units().await.unwrap();
        assert!(fx.store.request_count() > requests);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_keeps_cabin_listed() {
        let fx = Fixture::new();
        fx.cabin("c1");
        fx.hostel("h1", 4);
        // Units resolve, but every reservation query fails
        let units = fx.engine.catalog().list_units(None).await.unwrap();
        fx.store.set_mode(StoreMode::CompleteOutage);

        let enriched = fx.listings().enrich(units).await;
        assert!(enriched
            .iter()
            .all(|l| l.reservation_status == UnitStatus::Unknown));
        let bookable: Vec<&str> = enriched
            .iter()
            .filter(|l| l.is_bookable())
            .map(|l| l.unit.id.as_str())
            .collect();
        assert_eq!(bookable, vec!["c1"]);
    }
}
