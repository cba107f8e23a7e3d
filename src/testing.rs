// Shared fixtures for unit tests

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use crate::availability::AvailabilityEngine;
use crate::cache::CacheFacade;
use crate::catalog::UnitCatalog;
use crate::config::{ReservationConfig, RetryConfig};
use crate::gateway::StoreGateway;
use crate::lifecycle::ReservationManager;
use crate::listings::ListingService;
use crate::model::{DateRange, InventoryModel, ReservationState, Unit};
use crate::queue::RequestQueue;
use crate::retry::RetryPolicy;
use crate::store::memory::InMemoryStore;
use crate::store::schema::{new_reservation_properties, state_properties, unit_properties};
use crate::store::Collection;

pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn stay(check_in: &str, check_out: &str) -> DateRange {
    DateRange::parse(check_in, check_out).unwrap()
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<CacheFacade>,
    pub gateway: StoreGateway,
    pub engine: AvailabilityEngine,
}

impl Fixture {
    // Must be called inside a (paused) tokio runtime
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(CacheFacade::local_only());
        let gateway = StoreGateway::new(
            store.clone(),
            Arc::new(RequestQueue::new(Duration::from_millis(500))),
            RetryPolicy::new(RetryConfig::default()),
            100,
        );
        let catalog = UnitCatalog::new(gateway.clone(), cache.clone());
        let engine = AvailabilityEngine::new(gateway.clone(), cache.clone(), catalog);
        Self {
            store,
            cache,
            gateway,
            engine,
        }
    }

    pub fn manager(&self) -> ReservationManager {
        ReservationManager::new(
            self.gateway.clone(),
            self.cache.clone(),
            self.engine.clone(),
            ReservationConfig::default(),
        )
    }

    pub fn listings(&self) -> ListingService {
        ListingService::new(self.cache.clone(), self.engine.clone())
    }

    fn unit(&self, id: &str, inventory: InventoryModel) {
        let unit = Unit {
            id: id.into(),
            name: format!("Unit {id}"),
            slug: id.into(),
            amenities: vec![],
            inventory,
        };
        self.store
            .seed(Collection::Units, id, unit_properties(&unit));
    }

    pub fn cabin(&self, id: &str) {
        self.unit(id, InventoryModel::Exclusive);
    }

    pub fn hostel(&self, id: &str, total_capacity: u32) {
        self.unit(id, InventoryModel::SharedCapacity { total_capacity });
    }

    pub fn reservation(
        &self,
        id: &str,
        unit_id: &str,
        check_in: &str,
        check_out: &str,
        beds: u32,
        state: ReservationState,
    ) {
        let mut props =
            new_reservation_properties(unit_id, None, &stay(check_in, check_out), beds, None);
        state_properties(&mut props, state);
        self.store.seed(Collection::Reservations, id, props);
    }
}
