// In-process record store with the failure modes of the real service
//
// Enforces a sliding-window request limit, can simulate outages and injected
// failures, and paginates query results with an opaque cursor.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use ulid::Ulid;

use super::{Collection, Page, Properties, PropertyValue, Query, Record, RecordStore, SortDirection};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Normal,
    CompleteOutage,
}

pub struct InMemoryStore {
    mode: AtomicU8,
    records: RwLock<BTreeMap<String, Record>>,
    request_count: AtomicUsize,
    fail_next_requests: AtomicUsize,
    rate_limit_next_requests: AtomicUsize,
    rate_limit: AtomicUsize,
    rate_limit_window_ms: AtomicUsize,
    recent_requests: Mutex<Vec<Instant>>,
    failing_records: Mutex<HashSet<String>>,
    dropped_request_count: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            mode: AtomicU8::new(0),
            records: RwLock::new(BTreeMap::new()),
            request_count: AtomicUsize::new(0),
            fail_next_requests: AtomicUsize::new(0),
            rate_limit_next_requests: AtomicUsize::new(0),
            // Roughly what the hosted service allows on average
            rate_limit: AtomicUsize::new(3),
            rate_limit_window_ms: AtomicUsize::new(1000),
            recent_requests: Mutex::new(Vec::new()),
            failing_records: Mutex::new(HashSet::new()),
            dropped_request_count: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: StoreMode) {
        let mode_value = match mode {
            StoreMode::Normal => 0,
            StoreMode::CompleteOutage => 1,
        };
        self.mode.store(mode_value, Ordering::SeqCst);
    }

    pub fn set_rate_limit(&self, limit: usize, window_ms: usize) {
        self.rate_limit.store(limit, Ordering::SeqCst);
        self.rate_limit_window_ms.store(window_ms, Ordering::SeqCst);
    }

    // The next `count` requests fail with a retryable 500
    pub fn fail_next_requests(&self, count: usize) {
        self.fail_next_requests.store(count, Ordering::SeqCst);
    }

    // The next `count` requests are rejected as rate limited
    pub fn rate_limit_next_requests(&self, count: usize) {
        self.rate_limit_next_requests.store(count, Ordering::SeqCst);
    }

    // Writes to this record fail with a non-retryable error until cleared
    pub fn fail_writes_to(&self, id: &str) {
        self.failing_records.lock().insert(id.to_string());
    }

    pub fn clear_write_failures(&self) {
        self.failing_records.lock().clear();
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn dropped_request_count(&self) -> usize {
        self.dropped_request_count.load(Ordering::SeqCst)
    }

    // Inserts a record directly, bypassing limits and failure injection
    pub fn seed(&self, collection: Collection, id: &str, properties: Properties) -> Record {
        let now = Utc::now();
        let record = Record {
            id: id.to_string(),
            collection,
            properties,
            created_time: now,
            last_edited_time: now,
            archived: false,
        };
        self.records.write().insert(id.to_string(), record.clone());
        record
    }

    pub fn snapshot(&self, id: &str) -> Option<Record> {
        self.records.read().get(id).cloned()
    }

    fn admit(&self) -> Result<(), StoreError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        if self.mode.load(Ordering::SeqCst) == 1 {
            return Err(StoreError::Network("Service unavailable".to_string()));
        }

        let forced = self.rate_limit_next_requests.load(Ordering::SeqCst);
        if forced > 0 {
            self.rate_limit_next_requests
                .store(forced - 1, Ordering::SeqCst);
            self.dropped_request_count.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::RateLimited {
                retry_after: Some(Duration::from_secs(1)),
            });
        }

        // Sliding window rate limit
        let now = Instant::now();
        let limit = self.rate_limit.load(Ordering::SeqCst);
        let window = Duration::from_millis(self.rate_limit_window_ms.load(Ordering::SeqCst) as u64);
        {
            let mut recent = self.recent_requests.lock();
            recent.retain(|ts| now.duration_since(*ts) < window);
            if recent.len() >= limit {
                self.dropped_request_count.fetch_add(1, Ordering::SeqCst);
                let oldest = recent.first().copied().unwrap_or(now);
                return Err(StoreError::RateLimited {
                    retry_after: Some(window.saturating_sub(now.duration_since(oldest))),
                });
            }
            recent.push(now);
        }

        let fail_count = self.fail_next_requests.load(Ordering::SeqCst);
        if fail_count > 0 {
            self.fail_next_requests
                .store(fail_count - 1, Ordering::SeqCst);
            return Err(StoreError::Api {
                status: 500,
                message: "Internal Server Error".to_string(),
                retryable: true,
            });
        }

        Ok(())
    }

    fn check_writable(&self, id: &str) -> Result<(), StoreError> {
        if self.failing_records.lock().contains(id) {
            return Err(StoreError::Api {
                status: 409,
                message: format!("conflict while saving {id}"),
                retryable: false,
            });
        }
        Ok(())
    }

    fn apply(&self, id: &str, properties: Properties, archive: bool) -> Result<Record, StoreError> {
        self.check_writable(id)?;
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.properties.extend(properties);
        record.last_edited_time = Utc::now();
        if archive {
            record.archived = true;
        }
        Ok(record.clone())
    }
}

fn sort_key(record: &Record, property: &str) -> String {
    match record.property(property) {
        Some(PropertyValue::Date(Some(d))) => d.format("%Y-%m-%d").to_string(),
        Some(PropertyValue::Title(s)) | Some(PropertyValue::Text(s)) => s.clone(),
        Some(PropertyValue::Number(Some(n))) => format!("{n:020.4}"),
        Some(PropertyValue::Select(Some(s))) => s.clone(),
        _ => String::new(),
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn query(&self, query: Query) -> Result<Page, StoreError> {
        self.admit()?;

        let mut matching: Vec<Record> = self
            .records
            .read()
            .values()
            .filter(|r| r.collection == query.collection && !r.archived)
            .filter(|r| query.filter.as_ref().map_or(true, |f| f.matches(r)))
            .cloned()
            .collect();

        if let Some(sort) = &query.sort {
            matching.sort_by_key(|r| sort_key(r, &sort.property));
            if sort.direction == SortDirection::Descending {
                matching.reverse();
            }
        }

        let offset = match &query.start_cursor {
            Some(cursor) => cursor.parse::<usize>().map_err(|_| StoreError::Api {
                status: 400,
                message: format!("invalid cursor {cursor}"),
                retryable: false,
            })?,
            None => 0,
        };
        let page_size = query.page_size.max(1);
        let end = (offset + page_size).min(matching.len());
        let records = matching
            .get(offset.min(end)..end)
            .map(|slice| slice.to_vec())
            .unwrap_or_default();
        let next_cursor = (end < matching.len()).then(|| end.to_string());

        Ok(Page {
            records,
            next_cursor,
        })
    }

    async fn retrieve(&self, id: &str) -> Result<Record, StoreError> {
        self.admit()?;
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn create(
        &self,
        collection: Collection,
        properties: Properties,
    ) -> Result<Record, StoreError> {
        self.admit()?;
        let id = Ulid::new().to_string().to_lowercase();
        let now = Utc::now();
        let record = Record {
            id: id.clone(),
            collection,
            properties,
            created_time: now,
            last_edited_time: now,
            archived: false,
        };
        self.records.write().insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, properties: Properties) -> Result<Record, StoreError> {
        self.admit()?;
        self.apply(id, properties, false)
    }

    async fn archive(&self, id: &str, properties: Properties) -> Result<Record, StoreError> {
        self.admit()?;
        self.apply(id, properties, true)
    }
}
