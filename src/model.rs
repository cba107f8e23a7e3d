// Domain model: units, reservations and the derived availability views

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

pub type UnitId = String;
pub type ReservationId = String;
pub type RequesterId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccommodationType {
    // Booked as a whole (cabin)
    Exclusive,
    // Bed pool (hostel)
    SharedCapacity,
}

impl AccommodationType {
    pub fn label(&self) -> &'static str {
        match self {
            AccommodationType::Exclusive => "cabins",
            AccommodationType::SharedCapacity => "hostels",
        }
    }
}

/// How a unit's inventory is counted.
///
/// Both models share the same "overlapping confirmed reservations" input; only
/// the satisfiability predicate differs, see [`InventoryModel::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InventoryModel {
    Exclusive,
    SharedCapacity { total_capacity: u32 },
}

// Outcome of applying an inventory model to a conflict set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub is_available: bool,
    pub available_beds: Option<u32>,
    pub occupied_beds: Option<u32>,
}

impl InventoryModel {
    pub fn accommodation_type(&self) -> AccommodationType {
        match self {
            InventoryModel::Exclusive => AccommodationType::Exclusive,
            InventoryModel::SharedCapacity { .. } => AccommodationType::SharedCapacity,
        }
    }

    pub fn total_capacity(&self) -> Option<u32> {
        match self {
            InventoryModel::Exclusive => None,
            InventoryModel::SharedCapacity { total_capacity } => Some(*total_capacity),
        }
    }

    pub fn evaluate(&self, conflicts: &[Reservation], beds_requested: u32) -> Verdict {
        match self {
            InventoryModel::Exclusive => Verdict {
                is_available: conflicts.is_empty(),
                available_beds: None,
                occupied_beds: None,
            },
            InventoryModel::SharedCapacity { total_capacity } => {
                let occupied = conflicts
                    .iter()
                    .map(|r| r.beds_requested.max(1))
                    .fold(0u32, |acc, beds| acc.saturating_add(beds));
                let available = total_capacity.saturating_sub(occupied);
                Verdict {
                    is_available: available >= beds_requested,
                    available_beds: Some(available),
                    occupied_beds: Some(occupied),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    pub inventory: InventoryModel,
}

impl Unit {
    pub fn accommodation_type(&self) -> AccommodationType {
        self.inventory.accommodation_type()
    }
}

/// A stay expressed as the half-open interval `[check_in, check_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, BookingError> {
        if check_in >= check_out {
            return Err(BookingError::Validation(format!(
                "check-in {check_in} must be before check-out {check_out}"
            )));
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }

    // Parses two YYYY-MM-DD strings
    pub fn parse(check_in: &str, check_out: &str) -> Result<Self, BookingError> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| BookingError::Validation(format!("invalid date '{s}': {e}")))
        };
        Self::new(parse(check_in)?, parse(check_out)?)
    }

    // [a,b) and [c,d) overlap iff a < d && c < b
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.check_in <= day && day < self.check_out
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationState {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationState {
    pub fn label(&self) -> &'static str {
        match self {
            ReservationState::Pending => "Pending",
            ReservationState::Confirmed => "Confirmed",
            ReservationState::Cancelled => "Cancelled",
            ReservationState::Completed => "Completed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Pending" => Some(ReservationState::Pending),
            "Confirmed" => Some(ReservationState::Confirmed),
            "Cancelled" => Some(ReservationState::Cancelled),
            "Completed" => Some(ReservationState::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationState::Cancelled | ReservationState::Completed
        )
    }

    pub fn can_transition_to(&self, next: ReservationState) -> bool {
        use ReservationState::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
        )
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    Requested,
    Expired,
}

impl CancelReason {
    pub fn label(&self) -> &'static str {
        match self {
            CancelReason::Requested => "requested",
            CancelReason::Expired => "expired",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "requested" => Some(CancelReason::Requested),
            "expired" => Some(CancelReason::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    pub unit_id: UnitId,
    pub requester_id: Option<RequesterId>,
    pub stay: DateRange,
    pub beds_requested: u32,
    pub price: Option<f64>,
    pub state: ReservationState,
    pub cancel_reason: Option<CancelReason>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResult {
    pub is_available: bool,
    pub conflicting_reservations: Vec<Reservation>,
    pub available_beds: Option<u32>,
    pub total_capacity: Option<u32>,
}

/// Coarse, advisory occupancy label shown in listings.
///
/// Never an input to a booking decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStatus {
    #[serde(rename = "Disponible")]
    Available,
    #[serde(rename = "Completo")]
    Full,
    #[serde(rename = "Parcialmente Ocupado")]
    PartiallyOccupied,
    #[serde(rename = "Ocupada")]
    Occupied,
    #[serde(rename = "Reservada")]
    Reserved,
    #[serde(rename = "Desconocido")]
    Unknown,
}

impl UnitStatus {
    pub fn label(&self) -> &'static str {
        match self {
            UnitStatus::Available => "Disponible",
            UnitStatus::Full => "Completo",
            UnitStatus::PartiallyOccupied => "Parcialmente Ocupado",
            UnitStatus::Occupied => "Ocupada",
            UnitStatus::Reserved => "Reservada",
            UnitStatus::Unknown => "Desconocido",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occupancy {
    pub status: UnitStatus,
    pub available_beds: Option<u32>,
    pub occupied_beds: Option<u32>,
}
