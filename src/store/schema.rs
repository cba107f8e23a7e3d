// Mapping between store records and domain types
//
// The store schema is flexible: properties may be missing or empty, and older
// records may use a different relation name for the requester. Reads default
// what they can and only reject records without a unit or stay dates.

use chrono::NaiveDate;

use super::{Properties, PropertyValue, Record};
use crate::error::StoreError;
use crate::model::{
    CancelReason, DateRange, InventoryModel, Reservation, ReservationState, Unit,
};

pub mod unit_props {
    pub const NAME: &str = "Name";
    pub const SLUG: &str = "Slug";
    pub const ACCOMMODATION_TYPE: &str = "AccommodationType";
    pub const TOTAL_CAPACITY: &str = "TotalCapacity";
    pub const AMENITIES: &str = "Amenities";

    pub const TYPE_CABIN: &str = "Cabin";
    pub const TYPE_HOSTEL: &str = "Hostel";
}

pub mod reservation_props {
    pub const UNIT: &str = "Unit";
    pub const REQUESTER: &str = "ReservedBy";
    // Older records carry the requester under this name
    pub const REQUESTER_LEGACY: &str = "Requester";
    pub const CHECK_IN: &str = "CheckIn";
    pub const CHECK_OUT: &str = "CheckOut";
    pub const BEDS: &str = "Beds";
    pub const PRICE: &str = "Price";
    pub const STATE: &str = "State";
    pub const CANCEL_REASON: &str = "CancelReason";
}

fn malformed(record: &Record, reason: impl Into<String>) -> StoreError {
    StoreError::Malformed {
        id: record.id.clone(),
        reason: reason.into(),
    }
}

fn text(record: &Record, name: &str) -> Option<String> {
    match record.property(name) {
        Some(PropertyValue::Title(s)) | Some(PropertyValue::Text(s)) => Some(s.clone()),
        _ => None,
    }
}

fn number(record: &Record, name: &str) -> Option<f64> {
    match record.property(name) {
        Some(PropertyValue::Number(n)) => *n,
        _ => None,
    }
}

fn select(record: &Record, name: &str) -> Option<String> {
    match record.property(name) {
        Some(PropertyValue::Select(s)) => s.clone(),
        _ => None,
    }
}

fn date(record: &Record, name: &str) -> Option<NaiveDate> {
    match record.property(name) {
        Some(PropertyValue::Date(d)) => *d,
        _ => None,
    }
}

fn first_relation(record: &Record, name: &str) -> Option<String> {
    match record.property(name) {
        Some(PropertyValue::Relation(ids)) => ids.first().cloned(),
        _ => None,
    }
}

pub fn unit_from_record(record: &Record) -> Result<Unit, StoreError> {
    use unit_props::*;

    let inventory = match select(record, ACCOMMODATION_TYPE).as_deref() {
        Some(TYPE_HOSTEL) => {
            let capacity = number(record, TOTAL_CAPACITY).unwrap_or(0.0);
            if capacity < 1.0 {
                return Err(malformed(record, "hostel without a positive total capacity"));
            }
            InventoryModel::SharedCapacity {
                total_capacity: capacity as u32,
            }
        }
        _ => InventoryModel::Exclusive,
    };

    let amenities = match record.property(AMENITIES) {
        Some(PropertyValue::MultiSelect(tags)) => tags.clone(),
        _ => Vec::new(),
    };

    Ok(Unit {
        id: record.id.clone(),
        name: text(record, NAME).unwrap_or_default(),
        slug: text(record, SLUG).unwrap_or_default(),
        amenities,
        inventory,
    })
}

pub fn unit_properties(unit: &Unit) -> Properties {
    use unit_props::*;

    let mut props = Properties::new();
    props.insert(NAME.into(), PropertyValue::Title(unit.name.clone()));
    props.insert(SLUG.into(), PropertyValue::Text(unit.slug.clone()));
    props.insert(
        AMENITIES.into(),
        PropertyValue::MultiSelect(unit.amenities.clone()),
    );
    match unit.inventory {
        InventoryModel::Exclusive => {
            props.insert(
                ACCOMMODATION_TYPE.into(),
                PropertyValue::Select(Some(TYPE_CABIN.into())),
            );
        }
        InventoryModel::SharedCapacity { total_capacity } => {
            props.insert(
                ACCOMMODATION_TYPE.into(),
                PropertyValue::Select(Some(TYPE_HOSTEL.into())),
            );
            props.insert(
                TOTAL_CAPACITY.into(),
                PropertyValue::Number(Some(total_capacity as f64)),
            );
        }
    }
    props
}

pub fn reservation_from_record(record: &Record) -> Result<Reservation, StoreError> {
    use reservation_props::*;

    let unit_id = first_relation(record, UNIT).ok_or_else(|| malformed(record, "no unit"))?;
    let check_in = date(record, CHECK_IN).ok_or_else(|| malformed(record, "no check-in"))?;
    let check_out = date(record, CHECK_OUT).ok_or_else(|| malformed(record, "no check-out"))?;
    let stay = DateRange::new(check_in, check_out)
        .map_err(|_| malformed(record, "check-in is not before check-out"))?;

    let requester_id =
        first_relation(record, REQUESTER).or_else(|| first_relation(record, REQUESTER_LEGACY));

    let beds_requested = number(record, BEDS)
        .filter(|n| *n >= 1.0)
        .map(|n| n as u32)
        .unwrap_or(1);

    let state = select(record, STATE)
        .and_then(|s| ReservationState::from_label(&s))
        .unwrap_or(ReservationState::Pending);

    Ok(Reservation {
        id: record.id.clone(),
        unit_id,
        requester_id,
        stay,
        beds_requested,
        price: number(record, PRICE),
        state,
        cancel_reason: select(record, CANCEL_REASON).and_then(|s| CancelReason::from_label(&s)),
        last_modified: record.last_edited_time,
    })
}

pub fn stay_properties(props: &mut Properties, stay: &DateRange) {
    use reservation_props::*;
    props.insert(CHECK_IN.into(), PropertyValue::Date(Some(stay.check_in)));
    props.insert(CHECK_OUT.into(), PropertyValue::Date(Some(stay.check_out)));
}

pub fn state_properties(props: &mut Properties, state: ReservationState) {
    props.insert(
        reservation_props::STATE.into(),
        PropertyValue::Select(Some(state.label().into())),
    );
}

pub fn cancel_properties(reason: CancelReason) -> Properties {
    let mut props = Properties::new();
    state_properties(&mut props, ReservationState::Cancelled);
    props.insert(
        reservation_props::CANCEL_REASON.into(),
        PropertyValue::Select(Some(reason.label().into())),
    );
    props
}

pub fn new_reservation_properties(
    unit_id: &str,
    requester_id: Option<&str>,
    stay: &DateRange,
    beds: u32,
    price: Option<f64>,
) -> Properties {
    use reservation_props::*;

    let mut props = Properties::new();
    props.insert(UNIT.into(), PropertyValue::Relation(vec![unit_id.to_string()]));
    if let Some(requester) = requester_id {
        props.insert(
            REQUESTER.into(),
            PropertyValue::Relation(vec![requester.to_string()]),
        );
    }
    stay_properties(&mut props, stay);
    props.insert(BEDS.into(), PropertyValue::Number(Some(beds as f64)));
    if let Some(price) = price {
        props.insert(PRICE.into(), PropertyValue::Number(Some(price)));
    }
    state_properties(&mut props, ReservationState::Pending);
    props
}
