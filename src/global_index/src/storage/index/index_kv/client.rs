//! Store client traits.
//!
//! [`KvStoreClient`] abstracts the wire protocol of the external key-value
//! store so that the index can run against a production client or an
//! in-memory mock. [`KvStoreConnector`] creates a client lazily from the
//! index configuration.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::config::KvIndexConfig;
use super::error::KvIndexResult;
use crate::storage::location::RecordKey;

/// A single write against the index table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Store `value` under `key`, replacing any previous value.
    Put { key: RecordKey, value: Bytes },
    /// Remove the row for `key`. Removing an absent key is not an error.
    Delete { key: RecordKey },
}

impl Mutation {
    pub fn key(&self) -> &RecordKey {
        match self {
            Mutation::Put { key, .. } | Mutation::Delete { key } => key,
        }
    }
}

/// Client for the external key-value store holding index rows.
///
/// Every method is one round trip and counts against the store's
/// queries-per-second ceiling. Errors should be marked retryable when the
/// failure is transient (network, timeout, region moving).
#[async_trait]
pub trait KvStoreClient: Send + Sync {
    /// Look up many keys in one call.
    ///
    /// Returns one slot per input key, in input order. A missing key yields
    /// `None`; it is not an error.
    async fn multi_get(&self, keys: &[RecordKey]) -> KvIndexResult<Vec<Option<Bytes>>>;

    /// Apply many puts and deletes in one call.
    ///
    /// Mutations are idempotent: re-applying the same batch after a retry
    /// leaves the table in the same state.
    async fn multi_mutate(&self, mutations: Vec<Mutation>) -> KvIndexResult<()>;

    /// Number of live servers hosting the index table.
    async fn num_region_servers(&self) -> KvIndexResult<usize>;

    /// Release the underlying connection.
    async fn close(&self) -> KvIndexResult<()> {
        Ok(())
    }
}

/// Factory for store clients.
#[async_trait]
pub trait KvStoreConnector: Send + Sync {
    async fn connect(&self, config: &KvIndexConfig) -> KvIndexResult<Arc<dyn KvStoreClient>>;
}
