//! Locate engine.
//!
//! Resolves the current location of every record in one partition:
//!
//! ```text
//! 1. acquire QPS permit (qps_fraction)
//! 2. size batches from the granted fraction and the live cluster shape
//! 3. multi_get distinct keys, one call per batch, pausing between calls
//! 4. keep an entry only if the timeline reports its commit as COMPLETED
//! 5. tag records, release permit
//! ```
//!
//! Entries whose commit is requested, inflight, rolled back or unknown are
//! treated exactly like absent keys: the record stays untagged and the write
//! path handles it as an insert.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::batch_sizer::{bounded_batch_size, compute_batch_size};
use super::client::KvStoreClient;
use super::config::KvIndexConfig;
use super::entry::IndexEntry;
use super::error::{KvIndexError, KvIndexResult};
use super::qps_allocator::{QpsPermit, QpsResourceAllocator};
use crate::storage::location::{IndexedRecord, RecordKey};
use crate::storage::timeline::{CommitTimelineView, InstantState};

/// Cluster inputs to batch sizing, sampled once per invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterShape {
    pub num_region_servers: usize,
    pub num_executors: usize,
}

impl ClusterShape {
    /// Requests per second the whole store can absorb.
    pub fn total_capacity(&self, config: &KvIndexConfig) -> f64 {
        self.num_region_servers as f64 * config.max_qps_per_region_server
    }
}

/// Per-partition result of a locate run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LocateStats {
    pub distinct_keys: usize,
    pub batch_size: usize,
    pub store_calls: usize,
    pub tagged: usize,
    /// Entries found in the store but ignored because their commit is not
    /// completed.
    pub invalid_entries: usize,
}

/// Everything one locate task needs. Cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct Locator {
    pub(crate) client: Arc<dyn KvStoreClient>,
    pub(crate) allocator: Arc<dyn QpsResourceAllocator>,
    pub(crate) timeline: Arc<dyn CommitTimelineView>,
    pub(crate) config: Arc<KvIndexConfig>,
    pub(crate) shape: ClusterShape,
    /// Number of partitions located concurrently.
    pub(crate) num_tasks: usize,
}

impl Locator {
    /// Tag the records of one partition, returning them together with run
    /// statistics.
    pub async fn locate(
        &self,
        mut records: Vec<IndexedRecord>,
    ) -> KvIndexResult<(Vec<IndexedRecord>, LocateStats)> {
        if records.is_empty() {
            return Ok((records, LocateStats::default()));
        }

        let permit = QpsPermit::acquire(
            &self.allocator,
            self.config.qps_fraction,
            self.shape.total_capacity(&self.config),
        );
        let batch_size = bounded_batch_size(
            compute_batch_size(
                self.shape.num_region_servers,
                self.config.max_qps_per_region_server,
                self.num_tasks,
                self.shape.num_executors,
                self.config.sleep_ms_for_get_batch,
                permit.fraction(),
            ),
            self.config.get_batch_size,
        );

        let keys = distinct_keys(&records);
        let mut stats = LocateStats {
            distinct_keys: keys.len(),
            batch_size,
            ..Default::default()
        };
        let mut resolved: HashMap<RecordKey, IndexEntry> = HashMap::new();
        let mut instant_states: HashMap<String, InstantState> = HashMap::new();
        let pause = Duration::from_millis(self.config.sleep_ms_for_get_batch);

        for (batch_idx, batch) in keys.chunks(batch_size).enumerate() {
            if batch_idx > 0 {
                tokio::time::sleep(pause).await;
            }
            let values = self.client.multi_get(batch).await?;
            stats.store_calls += 1;
            if values.len() != batch.len() {
                return Err(KvIndexError::internal(format!(
                    "multi_get returned {} values for {} keys",
                    values.len(),
                    batch.len()
                )));
            }

            for (key, value) in batch.iter().zip(values) {
                let Some(value) = value else {
                    continue;
                };
                let entry = IndexEntry::decode(key.as_str(), &value)?;
                let state = *instant_states
                    .entry(entry.commit_ts.clone())
                    .or_insert_with(|| self.timeline.state(&entry.commit_ts));
                if state.is_completed() {
                    resolved.insert(key.clone(), entry);
                } else {
                    debug!(
                        key = %key,
                        commit_ts = %entry.commit_ts,
                        %state,
                        "ignoring index entry of uncommitted instant"
                    );
                    stats.invalid_entries += 1;
                }
            }
        }
        drop(permit);

        for record in records.iter_mut() {
            if let Some(entry) = resolved.get(&record.key) {
                record.set_current_location(entry.location(), entry.partition_path.clone());
                stats.tagged += 1;
            }
        }

        info!(
            records = records.len(),
            distinct_keys = stats.distinct_keys,
            batch_size = stats.batch_size,
            store_calls = stats.store_calls,
            tagged = stats.tagged,
            invalid_entries = stats.invalid_entries,
            "located partition"
        );
        Ok((records, stats))
    }
}

/// Record keys in first-seen order, each once.
fn distinct_keys(records: &[IndexedRecord]) -> Vec<RecordKey> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .filter(|record| seen.insert(&record.key))
        .map(|record| record.key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_keys_keeps_first_seen_order() {
        let records = vec![
            IndexedRecord::new("b", "p1"),
            IndexedRecord::new("a", "p1"),
            IndexedRecord::new("b", "p2"),
            IndexedRecord::new("c", "p1"),
        ];
        let keys: Vec<_> = distinct_keys(&records)
            .into_iter()
            .map(|k| k.as_str().to_string())
            .collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_total_capacity() {
        let config = KvIndexConfig::builder()
            .zk_quorum("localhost")
            .table_name("t")
            .max_qps_per_region_server(500.0)
            .build();
        let shape = ClusterShape {
            num_region_servers: 4,
            num_executors: 2,
        };
        assert_eq!(shape.total_capacity(&config), 2000.0);
    }
}
