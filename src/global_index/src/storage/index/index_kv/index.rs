//! Key-value global index - the main index structure.
//!
//! `KvGlobalIndex` fans locate and commit-apply work out to one task per
//! execution partition. All tasks share a lazily created store client and a
//! QPS allocator owned by the index instance.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::info;

use super::apply::{plan_mutations, ApplyStats, Applier};
use super::client::{KvStoreClient, KvStoreConnector};
use super::config::{ExecutionContext, KvIndexConfig};
use super::error::{KvIndexError, KvIndexResult};
use super::locate::{ClusterShape, LocateStats, Locator};
use super::parallelism::estimate_put_access;
use super::qps_allocator::{create_qps_allocator, QpsResourceAllocator};
use crate::storage::index::{CommitBatch, IndexType, RecordIndex};
use crate::storage::location::{IndexedRecord, WriteOutcome};
use crate::storage::timeline::CommitTimelineView;

/// Global record index stored in an external key-value store.
///
/// # Thread Safety
///
/// `KvGlobalIndex` is cheap to clone and safe to share across tasks. The
/// store client is created once, on first use, and then shared read-only.
///
/// # Example
///
/// ```rust,ignore
/// let index = KvGlobalIndex::new(config, ExecutionContext::new(8)?, connector)?;
///
/// // Before the write: tag records that already have a committed location.
/// let tagged = index.locate(partitions, timeline.clone()).await?;
///
/// // After the commit completed: remember where new records landed.
/// index.apply("20240101120000", commit_batches, timeline).await?;
/// ```
#[derive(Clone)]
pub struct KvGlobalIndex {
    inner: Arc<KvGlobalIndexInner>,
}

struct KvGlobalIndexInner {
    config: Arc<KvIndexConfig>,
    /// Read on every invocation; replaced when the substrate scales.
    execution: RwLock<ExecutionContext>,
    allocator: Arc<dyn QpsResourceAllocator>,
    connector: Option<Arc<dyn KvStoreConnector>>,
    client: OnceCell<Arc<dyn KvStoreClient>>,
}

impl KvGlobalIndex {
    /// Create an index that connects through `connector` on first use.
    ///
    /// Fails if `config` does not validate.
    pub fn new(
        config: KvIndexConfig,
        execution: ExecutionContext,
        connector: Arc<dyn KvStoreConnector>,
    ) -> KvIndexResult<Self> {
        Self::build(config, execution, Some(connector), None)
    }

    /// Create an index over an already connected client.
    pub fn with_client(
        config: KvIndexConfig,
        execution: ExecutionContext,
        client: Arc<dyn KvStoreClient>,
    ) -> KvIndexResult<Self> {
        Self::build(config, execution, None, Some(client))
    }

    fn build(
        config: KvIndexConfig,
        execution: ExecutionContext,
        connector: Option<Arc<dyn KvStoreConnector>>,
        client: Option<Arc<dyn KvStoreClient>>,
    ) -> KvIndexResult<Self> {
        config.validate()?;
        execution.validate()?;
        let allocator = create_qps_allocator(&config)?;
        Ok(Self {
            inner: Arc::new(KvGlobalIndexInner {
                config: Arc::new(config),
                execution: RwLock::new(execution),
                allocator,
                connector,
                client: OnceCell::new_with(client),
            }),
        })
    }

    pub fn config(&self) -> &KvIndexConfig {
        &self.inner.config
    }

    pub fn qps_allocator(&self) -> &Arc<dyn QpsResourceAllocator> {
        &self.inner.allocator
    }

    pub fn execution(&self) -> ExecutionContext {
        *self.inner.execution.read()
    }

    /// Replace the execution shape, e.g. after the executor pool grew or
    /// shrank. Takes effect on the next invocation; running ones keep the
    /// batch sizes they started with.
    pub fn update_execution(&self, execution: ExecutionContext) -> KvIndexResult<()> {
        execution.validate()?;
        info!(
            max_executors = execution.max_executors(),
            "updated index execution context"
        );
        *self.inner.execution.write() = execution;
        Ok(())
    }

    async fn client(&self) -> KvIndexResult<Arc<dyn KvStoreClient>> {
        let client = self
            .inner
            .client
            .get_or_try_init(|| async {
                let Some(connector) = self.inner.connector.as_ref() else {
                    return Err(KvIndexError::internal(
                        "index has neither a client nor a connector",
                    ));
                };
                info!(
                    zk_quorum = %self.inner.config.zk_quorum,
                    table = %self.inner.config.table_name,
                    "connecting to index store"
                );
                connector.connect(&self.inner.config).await
            })
            .await?;
        Ok(Arc::clone(client))
    }

    /// Sample the live cluster shape for this invocation.
    async fn cluster_shape(&self, client: &dyn KvStoreClient) -> KvIndexResult<ClusterShape> {
        let num_region_servers = client.num_region_servers().await?;
        if num_region_servers == 0 {
            return Err(KvIndexError::transient(
                "num_region_servers",
                format!("no live servers for table {}", self.inner.config.table_name),
            ));
        }
        Ok(ClusterShape {
            num_region_servers,
            num_executors: self.inner.execution.read().max_executors(),
        })
    }

    /// Tag every record with its verified current location.
    ///
    /// Each non-empty partition is located by its own task. The call fails
    /// as a whole if any partition fails.
    pub async fn locate(
        &self,
        partitions: Vec<Vec<IndexedRecord>>,
        timeline: Arc<dyn CommitTimelineView>,
    ) -> KvIndexResult<Vec<Vec<IndexedRecord>>> {
        let num_tasks = partitions.iter().filter(|p| !p.is_empty()).count();
        if num_tasks == 0 {
            return Ok(partitions);
        }

        let client = self.client().await?;
        let locator = Locator {
            shape: self.cluster_shape(client.as_ref()).await?,
            client,
            allocator: Arc::clone(&self.inner.allocator),
            timeline,
            config: Arc::clone(&self.inner.config),
            num_tasks,
        };

        let mut results: Vec<Vec<IndexedRecord>> = Vec::with_capacity(partitions.len());
        let mut tasks = JoinSet::new();
        for (idx, partition) in partitions.into_iter().enumerate() {
            results.push(Vec::new());
            if partition.is_empty() {
                continue;
            }
            let locator = locator.clone();
            tasks.spawn(async move { (idx, locator.locate(partition).await) });
        }

        let mut total = LocateStats::default();
        while let Some(joined) = tasks.join_next().await {
            let (idx, located) = joined?;
            let (records, stats) = located?;
            total.distinct_keys += stats.distinct_keys;
            total.store_calls += stats.store_calls;
            total.tagged += stats.tagged;
            total.invalid_entries += stats.invalid_entries;
            results[idx] = records;
        }

        info!(
            partitions = results.len(),
            tasks = num_tasks,
            distinct_keys = total.distinct_keys,
            store_calls = total.store_calls,
            tagged = total.tagged,
            invalid_entries = total.invalid_entries,
            "located records"
        );
        Ok(results)
    }

    /// Persist the index changes of the completed commit `instant_time`.
    ///
    /// Every batch is planned first. If the commit, or any instant a planned
    /// put refers to, is not completed, the call fails before anything is
    /// written. The put-access parallelism is estimated over the outcomes of
    /// all batches, then each batch is applied by its own task.
    pub async fn apply(
        &self,
        instant_time: &str,
        batches: Vec<CommitBatch>,
        timeline: Arc<dyn CommitTimelineView>,
    ) -> KvIndexResult<ApplyStats> {
        let all_outcomes: Vec<WriteOutcome> = batches
            .iter()
            .flat_map(|batch| batch.outcomes.iter().cloned())
            .collect();
        let estimate = estimate_put_access(&all_outcomes, batches.len());

        let mut instants = BTreeSet::from([instant_time.to_string()]);
        let mut plans = Vec::with_capacity(batches.len());
        for batch in &batches {
            let plan = plan_mutations(&batch.outcomes, &batch.records)?;
            instants.extend(plan.instants.iter().cloned());
            plans.push(plan);
        }
        for instant in &instants {
            let state = timeline.state(instant);
            if !state.is_completed() {
                return Err(KvIndexError::CommitNotCompleted {
                    instant_time: instant.clone(),
                    state: state.to_string(),
                });
            }
        }

        let mut total = ApplyStats::default();
        for plan in &plans {
            total.skipped_failed += plan.skipped_failed;
            total.skipped_unowned += plan.skipped_unowned;
        }
        if plans.iter().all(|plan| plan.mutations.is_empty()) {
            return Ok(total);
        }

        let client = self.client().await?;
        let applier = Applier {
            shape: self.cluster_shape(client.as_ref()).await?,
            client,
            allocator: Arc::clone(&self.inner.allocator),
            config: Arc::clone(&self.inner.config),
            put_parallelism: estimate.put_parallelism,
        };

        let mut tasks = JoinSet::new();
        for plan in plans {
            if plan.mutations.is_empty() {
                continue;
            }
            let applier = applier.clone();
            tasks.spawn(async move { applier.apply(plan).await });
        }

        while let Some(joined) = tasks.join_next().await {
            let stats = joined??;
            total.puts += stats.puts;
            total.deletes += stats.deletes;
            total.store_calls += stats.store_calls;
            total.batch_size = total.batch_size.max(stats.batch_size);
        }

        info!(
            instant_time,
            total_puts = estimate.total_puts,
            put_parallelism = estimate.put_parallelism,
            partitions = estimate.num_partitions,
            puts = total.puts,
            deletes = total.deletes,
            skipped_failed = total.skipped_failed,
            skipped_unowned = total.skipped_unowned,
            store_calls = total.store_calls,
            "updated index locations"
        );
        Ok(total)
    }

    /// Close the store client if one was created.
    pub async fn close(&self) -> KvIndexResult<()> {
        match self.inner.client.get() {
            Some(client) => client.close().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordIndex for KvGlobalIndex {
    type Error = KvIndexError;

    async fn tag_location(
        &self,
        partitions: Vec<Vec<IndexedRecord>>,
        timeline: Arc<dyn CommitTimelineView>,
    ) -> KvIndexResult<Vec<Vec<IndexedRecord>>> {
        self.locate(partitions, timeline).await
    }

    async fn update_location(
        &self,
        instant_time: &str,
        batches: Vec<CommitBatch>,
        timeline: Arc<dyn CommitTimelineView>,
    ) -> KvIndexResult<()> {
        self.apply(instant_time, batches, timeline).await.map(|_| ())
    }

    /// Rows written by the rolled back commit stay in the store; lookups
    /// drop them because the timeline no longer reports the commit as
    /// completed.
    async fn rollback_commit(&self, instant_time: &str) -> KvIndexResult<bool> {
        info!(instant_time, "rollback leaves index rows for lazy invalidation");
        Ok(true)
    }

    fn is_global(&self) -> bool {
        true
    }

    fn can_index_log_files(&self) -> bool {
        false
    }

    fn is_implicit_with_storage(&self) -> bool {
        false
    }

    fn index_type(&self) -> IndexType {
        IndexType::KeyValue
    }

    async fn close(&self) -> KvIndexResult<()> {
        KvGlobalIndex::close(self).await
    }
}

impl std::fmt::Debug for KvGlobalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvGlobalIndex")
            .field("config", &self.inner.config)
            .field("execution", &*self.inner.execution.read())
            .field("connected", &self.inner.client.initialized())
            .finish()
    }
}
