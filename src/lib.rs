// Lodging reservation core: tiered cache, paced store access, availability and
// the reservation lifecycle

pub mod availability;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod lifecycle;
pub mod listings;
pub mod model;
pub mod queue;
pub mod retry;
pub mod store;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use availability::AvailabilityEngine;
pub use cache::{CacheFacade, CacheHealth};
pub use catalog::UnitCatalog;
pub use config::LodgingConfig;
pub use error::{BookingError, CacheError, ConfigError, ErrorKind, StoreError};
pub use gateway::StoreGateway;
pub use jobs::Scheduler;
pub use lifecycle::{NewReservation, ReservationManager, ReservationUpdate, SweepReport};
pub use listings::{ListingService, UnitListing};
pub use model::{
    AccommodationType, AvailabilityResult, DateRange, InventoryModel, Reservation,
    ReservationState, Unit, UnitStatus,
};
pub use queue::RequestQueue;
pub use retry::RetryPolicy;
pub use store::RecordStore;
