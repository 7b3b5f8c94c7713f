//! Configuration for the key-value index.
//!
//! ## QPS Budget
//!
//! The backing store tolerates roughly `max_qps_per_region_server` requests
//! per second on each live server. This index may use `qps_fraction` of that
//! capacity, shared by every concurrently running task:
//!
//! ```text
//! budget/sec = num_region_servers * max_qps_per_region_server * qps_fraction
//! ```
//!
//! Each task issues one batch call and then pauses for
//! `sleep_ms_for_{get,put}_batch`; batch sizes are derived so the aggregate
//! request rate stays inside the budget, and are never larger than
//! `get_batch_size` / `put_batch_size`.
//!
//! ## Example
//!
//! ```rust,ignore
//! let config = KvIndexConfig::builder()
//!     .zk_quorum("zk1,zk2,zk3")
//!     .table_name("record_index")
//!     .qps_fraction(0.2)
//!     .build();
//! config.validate()?;
//! ```

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use super::error::{KvIndexError, KvIndexResult};

/// Which allocator hands out QPS fractions to tasks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QpsAllocatorKind {
    /// Grant exactly what is requested.
    #[default]
    Default,
    /// Clamp requests into `[min_qps_fraction, max_qps_fraction]`.
    Bounded,
}

#[derive(Clone, Debug, PartialEq, TypedBuilder, Serialize, Deserialize)]
pub struct KvIndexConfig {
    /// Coordination quorum used to reach the store.
    #[builder(setter(into))]
    pub zk_quorum: String,

    #[builder(default = KvIndexConfig::DEFAULT_ZK_PORT)]
    #[serde(default = "KvIndexConfig::default_zk_port")]
    pub zk_port: u16,

    #[builder(default = KvIndexConfig::DEFAULT_ZK_NODE_PATH.to_string(), setter(into))]
    #[serde(default = "KvIndexConfig::default_zk_node_path")]
    pub zk_node_path: String,

    /// Store table holding `record key -> location` rows.
    #[builder(setter(into))]
    pub table_name: String,

    /// Upper bound on keys per `multi_get` call.
    #[builder(default = KvIndexConfig::DEFAULT_BATCH_SIZE)]
    #[serde(default = "KvIndexConfig::default_batch_size")]
    pub get_batch_size: usize,

    /// Upper bound on mutations per `multi_mutate` call.
    #[builder(default = KvIndexConfig::DEFAULT_BATCH_SIZE)]
    #[serde(default = "KvIndexConfig::default_batch_size")]
    pub put_batch_size: usize,

    /// Share of the store's query capacity this index may use, in (0, 1].
    #[builder(default = KvIndexConfig::DEFAULT_QPS_FRACTION)]
    #[serde(default = "KvIndexConfig::default_qps_fraction")]
    pub qps_fraction: f64,

    #[builder(default = KvIndexConfig::DEFAULT_MAX_QPS_PER_REGION_SERVER)]
    #[serde(default = "KvIndexConfig::default_max_qps_per_region_server")]
    pub max_qps_per_region_server: f64,

    /// Pause between consecutive get batches of one task.
    #[builder(default = KvIndexConfig::DEFAULT_SLEEP_MS)]
    #[serde(default = "KvIndexConfig::default_sleep_ms")]
    pub sleep_ms_for_get_batch: u64,

    /// Pause between consecutive put batches of one task.
    #[builder(default = KvIndexConfig::DEFAULT_SLEEP_MS)]
    #[serde(default = "KvIndexConfig::default_sleep_ms")]
    pub sleep_ms_for_put_batch: u64,

    #[builder(default)]
    #[serde(default)]
    pub qps_allocator: QpsAllocatorKind,

    /// Lower clamp for [`QpsAllocatorKind::Bounded`].
    #[builder(default = KvIndexConfig::DEFAULT_MIN_QPS_FRACTION)]
    #[serde(default = "KvIndexConfig::default_min_qps_fraction")]
    pub min_qps_fraction: f64,

    /// Upper clamp for [`QpsAllocatorKind::Bounded`].
    #[builder(default = KvIndexConfig::DEFAULT_MAX_QPS_FRACTION)]
    #[serde(default = "KvIndexConfig::default_max_qps_fraction")]
    pub max_qps_fraction: f64,
}

impl KvIndexConfig {
    pub const DEFAULT_ZK_PORT: u16 = 2181;
    pub const DEFAULT_ZK_NODE_PATH: &'static str = "/hbase";
    pub const DEFAULT_BATCH_SIZE: usize = 100;
    pub const DEFAULT_QPS_FRACTION: f64 = 0.5;
    pub const DEFAULT_MAX_QPS_PER_REGION_SERVER: f64 = 1000.0;
    pub const DEFAULT_SLEEP_MS: u64 = 100;
    pub const DEFAULT_MIN_QPS_FRACTION: f64 = 0.002;
    pub const DEFAULT_MAX_QPS_FRACTION: f64 = 0.06;

    pub fn default_zk_port() -> u16 {
        Self::DEFAULT_ZK_PORT
    }

    pub fn default_zk_node_path() -> String {
        Self::DEFAULT_ZK_NODE_PATH.to_string()
    }

    pub fn default_batch_size() -> usize {
        Self::DEFAULT_BATCH_SIZE
    }

    pub fn default_qps_fraction() -> f64 {
        Self::DEFAULT_QPS_FRACTION
    }

    pub fn default_max_qps_per_region_server() -> f64 {
        Self::DEFAULT_MAX_QPS_PER_REGION_SERVER
    }

    pub fn default_sleep_ms() -> u64 {
        Self::DEFAULT_SLEEP_MS
    }

    pub fn default_min_qps_fraction() -> f64 {
        Self::DEFAULT_MIN_QPS_FRACTION
    }

    pub fn default_max_qps_fraction() -> f64 {
        Self::DEFAULT_MAX_QPS_FRACTION
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(data: &[u8]) -> KvIndexResult<Self> {
        let config: Self = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the batch sizing cannot work with.
    ///
    /// Runs once when an index is constructed, so the sizing math never sees
    /// a zero pause, an empty budget or a zero batch bound.
    pub fn validate(&self) -> KvIndexResult<()> {
        if self.table_name.is_empty() {
            return Err(KvIndexError::invalid_config("table_name must not be empty"));
        }
        if !(self.qps_fraction > 0.0 && self.qps_fraction <= 1.0) {
            return Err(KvIndexError::invalid_config(format!(
                "qps_fraction must be in (0, 1], got {}",
                self.qps_fraction
            )));
        }
        if !(self.max_qps_per_region_server > 0.0) {
            return Err(KvIndexError::invalid_config(format!(
                "max_qps_per_region_server must be > 0, got {}",
                self.max_qps_per_region_server
            )));
        }
        if self.sleep_ms_for_get_batch == 0 || self.sleep_ms_for_put_batch == 0 {
            return Err(KvIndexError::invalid_config(
                "sleep_ms_for_get_batch and sleep_ms_for_put_batch must be > 0",
            ));
        }
        if self.get_batch_size == 0 || self.put_batch_size == 0 {
            return Err(KvIndexError::invalid_config(
                "get_batch_size and put_batch_size must be > 0",
            ));
        }
        if self.qps_allocator == QpsAllocatorKind::Bounded
            && !(self.min_qps_fraction > 0.0
                && self.min_qps_fraction <= self.max_qps_fraction
                && self.max_qps_fraction <= 1.0)
        {
            return Err(KvIndexError::invalid_config(format!(
                "bounded allocator needs 0 < min_qps_fraction <= max_qps_fraction <= 1, got [{}, {}]",
                self.min_qps_fraction, self.max_qps_fraction
            )));
        }
        Ok(())
    }
}

/// Shape of the execution substrate running the index tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    executor_instances: usize,
    dynamic_allocation_enabled: bool,
    dynamic_allocation_max_executors: usize,
}

impl ExecutionContext {
    /// A fixed pool of `executor_instances` workers.
    pub fn new(executor_instances: usize) -> KvIndexResult<Self> {
        let context = Self {
            executor_instances,
            dynamic_allocation_enabled: false,
            dynamic_allocation_max_executors: executor_instances,
        };
        context.validate()?;
        Ok(context)
    }

    /// Reject a context with no executors.
    ///
    /// Deserialized contexts bypass [`ExecutionContext::new`], so every
    /// context is checked again before an index uses it.
    pub fn validate(&self) -> KvIndexResult<()> {
        if self.executor_instances == 0 {
            return Err(KvIndexError::invalid_config(
                "executor_instances must be >= 1",
            ));
        }
        Ok(())
    }

    /// Allow the substrate to scale up to `max_executors` workers.
    pub fn with_dynamic_allocation(mut self, max_executors: usize) -> Self {
        self.dynamic_allocation_enabled = true;
        self.dynamic_allocation_max_executors = max_executors;
        self
    }

    /// Largest number of workers that may run index tasks at once.
    pub fn max_executors(&self) -> usize {
        if self.dynamic_allocation_enabled {
            self.executor_instances
                .max(self.dynamic_allocation_max_executors)
        } else {
            self.executor_instances
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            executor_instances: 1,
            dynamic_allocation_enabled: false,
            dynamic_allocation_max_executors: 1,
        }
    }
}
