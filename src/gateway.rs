// Paced, retried access to the backing record-store
//
// Every attempt of every call is admitted through the shared request queue, so
// retries are paced like first tries and never exceed the sustained call rate.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::error::StoreError;
use crate::queue::RequestQueue;
use crate::retry::RetryPolicy;
use crate::store::{Collection, Page, Properties, Query, Record, RecordStore};

#[derive(Clone)]
pub struct StoreGateway {
    store: Arc<dyn RecordStore>,
    queue: Arc<RequestQueue>,
    retry: RetryPolicy,
    page_size: usize,
}

impl StoreGateway {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: Arc<RequestQueue>,
        retry: RetryPolicy,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            queue,
            retry,
            page_size: page_size.max(1),
        }
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    // One logical store call: each attempt is queued, failures go through the retry policy
    async fn call<F, Fut, T>(&self, label: &str, operation: F) -> Result<T, StoreError>
    where
        F: Fn(Arc<dyn RecordStore>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
        T: Send + 'static,
    {
        self.retry
            .run(label, || {
                let queue = self.queue.clone();
                let store = self.store.clone();
                let operation = operation.clone();
                async move { queue.enqueue(move || operation(store)).await }
            })
            .await
    }

    pub async fn query_page(&self, query: Query) -> Result<Page, StoreError> {
        self.call("store query", move |store| {
            let query = query.clone();
            async move { store.query(query).await }
        })
        .await
    }

    // Follows the continuation cursor until the result set is exhausted
    pub async fn query_all(&self, mut query: Query) -> Result<Vec<Record>, StoreError> {
        query.page_size = self.page_size;
        let mut records = Vec::new();
        let mut pages = 0usize;

        loop {
            let page = self.query_page(query.clone()).await?;
            pages += 1;
            records.extend(page.records);
            match page.next_cursor {
                Some(cursor) => query.start_cursor = Some(cursor),
                None => break,
            }
        }

        debug!(
            "Fetched {} {:?} records in {pages} pages",
            records.len(),
            query.collection
        );
        Ok(records)
    }

    pub async fn retrieve(&self, id: &str) -> Result<Record, StoreError> {
        let id = id.to_string();
        self.call("store retrieve", move |store| {
            let id = id.clone();
            async move { store.retrieve(&id).await }
        })
        .await
    }

    pub async fn create(
        &self,
        collection: Collection,
        properties: Properties,
    ) -> Result<Record, StoreError> {
        self.call("store create", move |store| {
            let properties = properties.clone();
            async move { store.create(collection, properties).await }
        })
        .await
    }

    pub async fn update(&self, id: &str, properties: Properties) -> Result<Record, StoreError> {
        let id = id.to_string();
        self.call("store update", move |store| {
            let id = id.clone();
            let properties = properties.clone();
            async move { store.update(&id, properties).await }
        })
        .await
    }

    pub async fn archive(&self, id: &str, properties: Properties) -> Result<Record, StoreError> {
        let id = id.to_string();
        self.call("store archive", move |store| {
            let id = id.clone();
            let properties = properties.clone();
            async move { store.archive(&id, properties).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::store::memory::InMemoryStore;
    use crate::store::PropertyValue;
    use tokio_test::assert_ok;
    use std::time::Duration;

    fn gateway(store: Arc<InMemoryStore>, page_size: usize) -> StoreGateway {
        StoreGateway::new(
            store,
            Arc::new(RequestQueue::new(Duration::from_millis(500))),
            RetryPolicy::new(RetryConfig::default()),
            page_size,
        )
    }

    fn named(name: &str) -> Properties {
        let mut props = Properties::new();
        props.insert("Name".into(), PropertyValue::Title(name.into()));
        props
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_all_walks_every_page() {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..7 {
            store.seed(Collection::Units, &format!("u{i}"), named("x"));
        }
        let gw = gateway(store.clone(), 3);

        let all = gw.query_all(Query::new(Collection::Units)).await.unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(store.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_through_queue() {
        let store = Arc::new(InMemoryStore::new());
        store.seed(Collection::Units, "u1", named("one"));
        store.fail_next_requests(2);
        let gw = gateway(store.clone(), 100);

        let record = gw.retrieve("u1").await.unwrap();
        assert_eq!(record.id, "u1");
        assert_eq!(store.request_count(), 3);
        assert_eq!(gw.queue().stats().failed.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_recovers() {
        let store = Arc::new(InMemoryStore::new());
        store.seed(Collection::Units, "u1", named("one"));
        store.rate_limit_next_requests(2);
        let gw = gateway(store.clone(), 100);

        assert_ok!(gw.retrieve("u1").await);
        assert_eq!(store.dropped_request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let store = Arc::new(InMemoryStore::new());
        let gw = gateway(store.clone(), 100);

        assert!(matches!(
            gw.retrieve("nope").await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.request_count(), 1);
    }
}
