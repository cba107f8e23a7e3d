// Backing record-store boundary
//
// The store is an opaque, rate-limited CRUD + query service keyed by record ids,
// where each record carries a loose bag of typed "properties". Queries only
// understand simple comparison filters combined with AND/OR.

pub mod memory;
pub mod schema;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub type RecordId = String;
pub type Properties = BTreeMap<String, PropertyValue>;

// Record collections ("databases") exposed by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Units,
    Reservations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Title(String),
    Text(String),
    Number(Option<f64>),
    Select(Option<String>),
    MultiSelect(Vec<String>),
    Date(Option<NaiveDate>),
    Relation(Vec<RecordId>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub collection: Collection,
    pub properties: Properties,
    pub created_time: DateTime<Utc>,
    pub last_edited_time: DateTime<Utc>,
    pub archived: bool,
}

impl Record {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DateCondition {
    Before(NaiveDate),
    After(NaiveDate),
    OnOrBefore(NaiveDate),
    OnOrAfter(NaiveDate),
    Equals(NaiveDate),
}

impl DateCondition {
    fn holds(&self, value: NaiveDate) -> bool {
        match self {
            DateCondition::Before(d) => value < *d,
            DateCondition::After(d) => value > *d,
            DateCondition::OnOrBefore(d) => value <= *d,
            DateCondition::OnOrAfter(d) => value >= *d,
            DateCondition::Equals(d) => value == *d,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    RelationContains(RecordId),
    SelectEquals(String),
    SelectDoesNotEqual(String),
    TextEquals(String),
    NumberEquals(f64),
    Date(DateCondition),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Property { name: String, condition: Condition },
    LastEditedBefore(DateTime<Utc>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn property(name: &str, condition: Condition) -> Self {
        Filter::Property {
            name: name.to_string(),
            condition,
        }
    }

    pub fn date(name: &str, condition: DateCondition) -> Self {
        Self::property(name, Condition::Date(condition))
    }

    // Evaluates the filter the way the store does; a missing or empty property never matches
    // except for "does not equal"
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
            Filter::LastEditedBefore(ts) => record.last_edited_time < *ts,
            Filter::Property { name, condition } => {
                let value = record.property(name);
                match (condition, value) {
                    (Condition::RelationContains(id), Some(PropertyValue::Relation(ids))) => {
                        ids.contains(id)
                    }
                    (Condition::SelectEquals(s), Some(PropertyValue::Select(Some(v)))) => v == s,
                    (Condition::SelectDoesNotEqual(s), Some(PropertyValue::Select(v))) => {
                        v.as_deref() != Some(s.as_str())
                    }
                    (Condition::SelectDoesNotEqual(_), None) => true,
                    (Condition::TextEquals(s), Some(PropertyValue::Text(v)))
                    | (Condition::TextEquals(s), Some(PropertyValue::Title(v))) => v == s,
                    (Condition::NumberEquals(n), Some(PropertyValue::Number(Some(v)))) => v == n,
                    (Condition::Date(cond), Some(PropertyValue::Date(Some(d)))) => cond.holds(*d),
                    _ => false,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub property: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    pub filter: Option<Filter>,
    pub sort: Option<Sort>,
    pub start_cursor: Option<String>,
    pub page_size: usize,
}

impl Query {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            filter: None,
            sort: None,
            start_cursor: None,
            page_size: 100,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort_ascending(mut self, property: &str) -> Self {
        self.sort = Some(Sort {
            property: property.to_string(),
            direction: SortDirection::Ascending,
        });
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    pub next_cursor: Option<String>,
}

// Client for the remote record store
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    // One page of records matching the query; follow `next_cursor` for the rest
    async fn query(&self, query: Query) -> Result<Page, StoreError>;

    async fn retrieve(&self, id: &str) -> Result<Record, StoreError>;

    async fn create(&self, collection: Collection, properties: Properties)
        -> Result<Record, StoreError>;

    // Partial update: only the given properties change
    async fn update(&self, id: &str, properties: Properties) -> Result<Record, StoreError>;

    async fn archive(&self, id: &str, properties: Properties) -> Result<Record, StoreError>;
}
