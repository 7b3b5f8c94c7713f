//! # Record Index
//!
//! An index resolves, for a batch of incoming records, which file group
//! currently holds each record, and remembers new locations once a commit
//! has completed.
//!
//! ## Write Cycle
//!
//! ```text
//! incoming records
//!       │
//!       ▼
//! ┌──────────────────┐   current_location set only when the
//! │  tag_location    │   owning commit is COMPLETED
//! └────────┬─────────┘
//!          ▼
//!    write path (external) assigns new_location, produces WriteOutcomes
//!          │
//!          ▼
//!    commit marked COMPLETED on the timeline (external)
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ update_location  │   persists new locations, deletes removed keys
//! └──────────────────┘
//! ```
//!
//! ## Rollback
//!
//! Index entries written by a commit that is later rolled back stay in the
//! backing store. They are ignored at lookup time because the timeline no
//! longer reports their instant as completed, and they are overwritten by the
//! next completed commit touching the same key.
//!
//! ## Modules
//!
//! - [`index_kv`]: global index backed by an external key-value store with a
//!   queries-per-second ceiling.

pub mod index_kv;

use std::sync::Arc;

use async_trait::async_trait;

use crate::storage::location::{IndexedRecord, WriteOutcome};
use crate::storage::timeline::CommitTimelineView;

/// Which backend an index uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexType {
    /// External key-value store, global across partitions.
    KeyValue,
}

/// Write outcomes and the records written by one execution partition.
#[derive(Clone, Debug, Default)]
pub struct CommitBatch {
    pub outcomes: Vec<WriteOutcome>,
    pub records: Vec<IndexedRecord>,
}

impl CommitBatch {
    pub fn new(outcomes: Vec<WriteOutcome>, records: Vec<IndexedRecord>) -> Self {
        Self { outcomes, records }
    }
}

/// Interface shared by every index backend.
///
/// Inputs are partitioned the way the execution substrate partitioned them;
/// each partition is processed by an independent task.
#[async_trait]
pub trait RecordIndex: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Tag each record with its verified current location, if it has one.
    async fn tag_location(
        &self,
        partitions: Vec<Vec<IndexedRecord>>,
        timeline: Arc<dyn CommitTimelineView>,
    ) -> Result<Vec<Vec<IndexedRecord>>, Self::Error>;

    /// Persist the locations written by the commit `instant_time`.
    ///
    /// Fails without touching the index unless the timeline reports the
    /// commit as completed.
    async fn update_location(
        &self,
        instant_time: &str,
        batches: Vec<CommitBatch>,
        timeline: Arc<dyn CommitTimelineView>,
    ) -> Result<(), Self::Error>;

    /// Undo the effect of a commit on the index. Returns whether the index
    /// is consistent afterwards.
    async fn rollback_commit(&self, instant_time: &str) -> Result<bool, Self::Error>;

    /// Whether a key maps to one location across all partition paths.
    fn is_global(&self) -> bool;

    /// Whether records written to log files can be located.
    fn can_index_log_files(&self) -> bool;

    /// Whether the index is derived from the data files themselves.
    fn is_implicit_with_storage(&self) -> bool;

    fn index_type(&self) -> IndexType;

    /// Release backend resources.
    async fn close(&self) -> Result<(), Self::Error>;
}
