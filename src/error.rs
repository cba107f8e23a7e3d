// Error types shared across the reservation core

use std::time::Duration;

use thiserror::Error;

use crate::model::{ReservationState, UnitId};

// Errors raised by the backing record-store (or by the gateway in front of it)
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Rate limited by backing store (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {status} - {message}")]
    Api {
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Malformed record {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("Request queue closed")]
    QueueClosed,
}

impl StoreError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, StoreError::RateLimited { .. })
    }

    // Whether the retry wrapper should try the operation again
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::RateLimited { .. } | StoreError::Network(_) => true,
            StoreError::Api { retryable, .. } => *retryable,
            StoreError::NotFound(_) | StoreError::Malformed { .. } | StoreError::QueueClosed => {
                false
            }
        }
    }
}

// What is missing when a lookup fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Unit,
    Reservation,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Unit => write!(f, "unit"),
            EntityKind::Reservation => write!(f, "reservation"),
        }
    }
}

// Why a booking could not be admitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapacityShortfall {
    UnitTaken {
        unit_id: UnitId,
    },
    NotEnoughBeds {
        unit_id: UnitId,
        requested: u32,
        available: u32,
    },
}

impl CapacityShortfall {
    // Beds missing to satisfy the request; an exclusive unit is short by one whole unit
    pub fn shortfall(&self) -> u32 {
        match self {
            CapacityShortfall::UnitTaken { .. } => 1,
            CapacityShortfall::NotEnoughBeds {
                requested,
                available,
                ..
            } => requested.saturating_sub(*available),
        }
    }
}

impl std::fmt::Display for CapacityShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapacityShortfall::UnitTaken { unit_id } => {
                write!(f, "cabin {unit_id} is not available for the selected dates")
            }
            CapacityShortfall::NotEnoughBeds {
                available,
                requested,
                ..
            } => write!(
                f,
                "not enough beds: only {available} beds available ({requested} requested)"
            ),
        }
    }
}

// Coarse classification used by callers (and any HTTP layer) to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Capacity,
    Upstream,
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Capacity error: {0}")]
    Capacity(CapacityShortfall),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ReservationState,
        to: ReservationState,
    },

    #[error("Upstream error: {0}")]
    Upstream(#[from] StoreError),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation(_) | BookingError::InvalidTransition { .. } => {
                ErrorKind::Validation
            }
            BookingError::NotFound { .. } => ErrorKind::NotFound,
            BookingError::Capacity(_) => ErrorKind::Capacity,
            BookingError::Upstream(_) => ErrorKind::Upstream,
        }
    }

    // Turns a store-level NotFound into the business-level one for the given entity
    pub fn from_lookup(kind: EntityKind, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => BookingError::NotFound { kind, id },
            other => BookingError::Upstream(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    Connection(String),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache not available")]
    Unavailable,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(StoreError::RateLimited { retry_after: None }.is_retryable());
        assert!(StoreError::Network("reset".into()).is_retryable());
        assert!(!StoreError::NotFound("r1".into()).is_retryable());
        assert!(!StoreError::Api {
            status: 400,
            message: "bad filter".into(),
            retryable: false
        }
        .is_retryable());
    }

    #[test]
    fn test_lookup_maps_not_found() {
        let err = BookingError::from_lookup(EntityKind::Unit, StoreError::NotFound("u9".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = BookingError::from_lookup(EntityKind::Unit, StoreError::Network("down".into()));
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn test_shortfall_is_numeric_for_beds() {
        let short = CapacityShortfall::NotEnoughBeds {
            unit_id: "h1".into(),
            requested: 2,
            available: 1,
        };
        assert_eq!(short.shortfall(), 1);
        assert!(short.to_string().contains("only 1 beds available"));
    }
}
