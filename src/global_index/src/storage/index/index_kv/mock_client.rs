//! Mock key-value store client for testing.
//!
//! Stores rows in a `HashMap`, records every call and can be told to fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use super::client::{KvStoreClient, KvStoreConnector, Mutation};
use super::config::KvIndexConfig;
use super::entry::IndexEntry;
use super::error::{KvIndexError, KvIndexResult};
use crate::storage::location::RecordKey;

/// In-memory index table.
///
/// # Example
///
/// ```rust,ignore
/// let mock = MockKvStoreClient::new(3);
/// mock.insert_entry("key-1", IndexEntry::new("001", "fg-1", "p"));
/// let values = mock.multi_get(&[RecordKey::new("key-1")]).await?;
/// assert_eq!(mock.get_calls(), 1);
/// ```
pub struct MockKvStoreClient {
    rows: RwLock<HashMap<RecordKey, Bytes>>,
    num_region_servers: AtomicUsize,
    get_batches: Mutex<Vec<usize>>,
    mutate_batches: Mutex<Vec<usize>>,
    /// Number of upcoming `multi_get` calls that fail.
    failing_gets: AtomicUsize,
    /// `multi_mutate` fails once this many calls have succeeded.
    fail_mutate_after: Mutex<Option<usize>>,
    closed: AtomicBool,
}

impl MockKvStoreClient {
    pub fn new(num_region_servers: usize) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            num_region_servers: AtomicUsize::new(num_region_servers),
            get_batches: Mutex::new(Vec::new()),
            mutate_batches: Mutex::new(Vec::new()),
            failing_gets: AtomicUsize::new(0),
            fail_mutate_after: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn insert_entry(&self, key: &str, entry: IndexEntry) {
        let value = entry.encode().unwrap();
        self.rows.write().insert(RecordKey::new(key), value);
    }

    pub fn insert_raw(&self, key: &str, value: Bytes) {
        self.rows.write().insert(RecordKey::new(key), value);
    }

    pub fn entry(&self, key: &str) -> Option<IndexEntry> {
        self.rows
            .read()
            .get(&RecordKey::new(key))
            .map(|value| IndexEntry::decode(key, value).unwrap())
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn set_num_region_servers(&self, num: usize) {
        self.num_region_servers.store(num, Ordering::SeqCst);
    }

    pub fn fail_next_gets(&self, count: usize) {
        self.failing_gets.store(count, Ordering::SeqCst);
    }

    pub fn fail_mutate_after(&self, successful_calls: usize) {
        *self.fail_mutate_after.lock() = Some(successful_calls);
    }

    pub fn get_calls(&self) -> usize {
        self.get_batches.lock().len()
    }

    pub fn get_batch_sizes(&self) -> Vec<usize> {
        self.get_batches.lock().clone()
    }

    pub fn mutate_calls(&self) -> usize {
        self.mutate_batches.lock().len()
    }

    pub fn mutate_batch_sizes(&self) -> Vec<usize> {
        self.mutate_batches.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.get_batches.lock().clear();
        self.mutate_batches.lock().clear();
    }
}

#[async_trait]
impl KvStoreClient for MockKvStoreClient {
    async fn multi_get(&self, keys: &[RecordKey]) -> KvIndexResult<Vec<Option<Bytes>>> {
        self.get_batches.lock().push(keys.len());
        let failing = self
            .failing_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(KvIndexError::transient("multi_get", "injected timeout"));
        }
        let rows = self.rows.read();
        Ok(keys.iter().map(|key| rows.get(key).cloned()).collect())
    }

    async fn multi_mutate(&self, mutations: Vec<Mutation>) -> KvIndexResult<()> {
        {
            let mut batches = self.mutate_batches.lock();
            if let Some(limit) = *self.fail_mutate_after.lock() {
                if batches.len() >= limit {
                    return Err(KvIndexError::transient("multi_mutate", "injected timeout"));
                }
            }
            batches.push(mutations.len());
        }
        let mut rows = self.rows.write();
        for mutation in mutations {
            match mutation {
                Mutation::Put { key, value } => {
                    rows.insert(key, value);
                }
                Mutation::Delete { key } => {
                    rows.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn num_region_servers(&self) -> KvIndexResult<usize> {
        Ok(self.num_region_servers.load(Ordering::SeqCst))
    }

    async fn close(&self) -> KvIndexResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out one shared mock client and counting connects.
pub struct MockKvStoreConnector {
    pub client: Arc<MockKvStoreClient>,
    pub connects: AtomicUsize,
}

impl MockKvStoreConnector {
    pub fn new(client: Arc<MockKvStoreClient>) -> Self {
        Self {
            client,
            connects: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl KvStoreConnector for MockKvStoreConnector {
    async fn connect(&self, _config: &KvIndexConfig) -> KvIndexResult<Arc<dyn KvStoreClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let client: Arc<dyn KvStoreClient> = self.client.clone();
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_put_get_delete() {
        let client = MockKvStoreClient::new(1);
        let key = RecordKey::new("k");
        let value = IndexEntry::new("001", "fg", "p").encode().unwrap();

        client
            .multi_mutate(vec![Mutation::Put {
                key: key.clone(),
                value: value.clone(),
            }])
            .await
            .unwrap();
        let values = client
            .multi_get(&[key.clone(), RecordKey::new("missing")])
            .await
            .unwrap();
        assert_eq!(values, vec![Some(value), None]);

        client
            .multi_mutate(vec![Mutation::Delete { key: key.clone() }])
            .await
            .unwrap();
        assert_eq!(client.len(), 0);

        // Deleting an absent key is not an error.
        client
            .multi_mutate(vec![Mutation::Delete { key }])
            .await
            .unwrap();
        assert_eq!(client.mutate_batch_sizes(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_mock_injected_failures() {
        let client = MockKvStoreClient::new(1);
        client.fail_next_gets(1);
        assert!(client.multi_get(&[RecordKey::new("k")]).await.is_err());
        assert!(client.multi_get(&[RecordKey::new("k")]).await.is_ok());

        client.fail_mutate_after(0);
        let result = client.multi_mutate(vec![]).await;
        assert!(matches!(result, Err(KvIndexError::StoreOperation { retryable: true, .. })));
    }
}
