//! Commit-apply engine.
//!
//! Persists the index changes of a completed commit. For each record the
//! write path reported:
//!
//! | current location | new location          | mutation |
//! |------------------|-----------------------|----------|
//! | none             | some (inserting group)| put      |
//! | some(f)          | some(g), g != f       | put      |
//! | some(f)          | some(f)               | none     |
//! | some(f)          | none                  | delete   |
//!
//! Records whose write failed are skipped, and so are new records whose file
//! group reported no inserts; both are counted. Mutations are deduplicated
//! per key and ordered by file group before being cut into batches, one
//! `multi_mutate` call per batch.
//!
//! Every partition is planned and the commit checked against the timeline
//! before any partition task starts writing, so a refused commit leaves the
//! store untouched.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::batch_sizer::{bounded_batch_size, compute_batch_size};
use super::client::{KvStoreClient, Mutation};
use super::config::KvIndexConfig;
use super::entry::IndexEntry;
use super::error::KvIndexResult;
use super::locate::ClusterShape;
use super::qps_allocator::{QpsPermit, QpsResourceAllocator};
use crate::storage::location::{IndexedRecord, RecordKey, WriteOutcome};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub puts: usize,
    pub deletes: usize,
    pub skipped_failed: usize,
    /// New records whose file group reported no inserts in the same batch.
    pub skipped_unowned: usize,
    pub batch_size: usize,
    pub store_calls: usize,
}

/// Mutations planned for one partition, ready to be batched.
#[derive(Debug, Default)]
pub(crate) struct MutationPlan {
    pub mutations: Vec<Mutation>,
    /// Instants referenced by planned puts.
    pub instants: BTreeSet<String>,
    pub skipped_failed: usize,
    pub skipped_unowned: usize,
}

/// Everything one commit-apply task needs. Cheap to clone into spawned tasks.
///
/// The commit has already been checked against the timeline by the caller;
/// an `Applier` only writes.
#[derive(Clone)]
pub struct Applier {
    pub(crate) client: Arc<dyn KvStoreClient>,
    pub(crate) allocator: Arc<dyn QpsResourceAllocator>,
    pub(crate) config: Arc<KvIndexConfig>,
    pub(crate) shape: ClusterShape,
    /// Put-access parallelism of the whole commit.
    pub(crate) put_parallelism: usize,
}

impl Applier {
    /// Write the planned mutations of one partition.
    ///
    /// Any failed store call aborts the partition. Already applied batches
    /// stay in place; they are idempotent and a rerun converges.
    pub(crate) async fn apply(&self, plan: MutationPlan) -> KvIndexResult<ApplyStats> {
        let mut stats = ApplyStats {
            skipped_failed: plan.skipped_failed,
            skipped_unowned: plan.skipped_unowned,
            ..Default::default()
        };
        if plan.mutations.is_empty() {
            return Ok(stats);
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
                self.put_parallelism.max(1),
                self.shape.num_executors,
                self.config.sleep_ms_for_put_batch,
                permit.fraction(),
            ),
            self.config.put_batch_size,
        );
        stats.batch_size = batch_size;
        let pause = Duration::from_millis(self.config.sleep_ms_for_put_batch);

        let mut mutations = plan.mutations.into_iter().peekable();
        while mutations.peek().is_some() {
            if stats.store_calls > 0 {
                tokio::time::sleep(pause).await;
            }
            let batch: Vec<Mutation> = mutations.by_ref().take(batch_size).collect();
            for mutation in &batch {
                match mutation {
                    Mutation::Put { .. } => stats.puts += 1,
                    Mutation::Delete { .. } => stats.deletes += 1,
                }
            }
            debug!(size = batch.len(), "issuing index mutation batch");
            self.client.multi_mutate(batch).await?;
            stats.store_calls += 1;
        }
        drop(permit);

        info!(
            puts = stats.puts,
            deletes = stats.deletes,
            skipped_failed = stats.skipped_failed,
            skipped_unowned = stats.skipped_unowned,
            batch_size = stats.batch_size,
            store_calls = stats.store_calls,
            "applied index updates"
        );
        Ok(stats)
    }
}

/// Decide which index rows change for the given records.
pub(crate) fn plan_mutations(
    outcomes: &[WriteOutcome],
    records: &[IndexedRecord],
) -> KvIndexResult<MutationPlan> {
    let by_file: HashMap<&str, &WriteOutcome> = outcomes
        .iter()
        .map(|outcome| (outcome.file_id.as_str(), outcome))
        .collect();
    let is_failed = |file_id: &str, key: &RecordKey| {
        by_file
            .get(file_id)
            .is_some_and(|outcome| outcome.is_failed(key))
    };

    // key -> (file group, mutation); the last record for a key wins.
    let mut latest: HashMap<RecordKey, (String, Mutation)> = HashMap::new();
    let mut plan = MutationPlan::default();

    for record in records {
        match (&record.current_location, &record.new_location) {
            (current, Some(new)) => {
                if is_failed(&new.file_id, &record.key) {
                    warn!(key = %record.key, file_id = %new.file_id, "skipping failed record");
                    plan.skipped_failed += 1;
                    continue;
                }
                let relocated = match current {
                    None => {
                        let owned = by_file
                            .get(new.file_id.as_str())
                            .is_some_and(|outcome| outcome.has_inserts());
                        if !owned {
                            warn!(
                                key = %record.key,
                                file_id = %new.file_id,
                                "skipping new record without an inserting write outcome"
                            );
                            plan.skipped_unowned += 1;
                            continue;
                        }
                        true
                    }
                    Some(current) => current.file_id != new.file_id,
                };
                if !relocated {
                    continue;
                }
                let value = IndexEntry::from_location(new, record.partition_path.clone()).encode()?;
                plan.instants.insert(new.instant_time.clone());
                latest.insert(
                    record.key.clone(),
                    (
                        new.file_id.clone(),
                        Mutation::Put {
                            key: record.key.clone(),
                            value,
                        },
                    ),
                );
            }
            (Some(current), None) => {
                if is_failed(&current.file_id, &record.key) {
                    warn!(key = %record.key, file_id = %current.file_id, "skipping failed delete");
                    plan.skipped_failed += 1;
                    continue;
                }
                latest.insert(
                    record.key.clone(),
                    (
                        current.file_id.clone(),
                        Mutation::Delete {
                            key: record.key.clone(),
                        },
                    ),
                );
            }
            (None, None) => {}
        }
    }

    let mut grouped: Vec<(String, Mutation)> = latest.into_values().collect();
    grouped.sort_by(|(a_file, a), (b_file, b)| a_file.cmp(b_file).then_with(|| a.key().cmp(b.key())));
    plan.mutations = grouped.into_iter().map(|(_, mutation)| mutation).collect();
    Ok(plan)
}
