//! # Key-Value Global Index
//!
//! A global `record key -> (file id, commit instant)` index stored in an
//! external key-value store that has a hard queries-per-second ceiling shared
//! by many concurrent writers.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        KvGlobalIndex                           │
//! │  lazily connected KvStoreClient, QpsResourceAllocator          │
//! ├───────────────────────────────┬────────────────────────────────┤
//! │ locate (one task / partition) │ apply                          │
//! │  ├─ QpsPermit                 │  ├─ estimate_put_access        │
//! │  ├─ compute_batch_size        │  ├─ plan_mutations (all)       │
//! │  ├─ multi_get per batch       │  ├─ timeline gate (all)        │
//! │  └─ timeline gate             │  └─ one task / partition:      │
//! │                               │     ├─ QpsPermit               │
//! │                               │     ├─ compute_batch_size      │
//! │                               │     └─ multi_mutate per batch  │
//! └───────────────────────────────┴────────────────────────────────┘
//! ```
//!
//! ## Visibility
//!
//! A stored row is only trusted when the timeline reports the instant that
//! wrote it as completed. Rows of in-flight or rolled back commits are
//! ignored at read time and overwritten later; nothing is eagerly deleted.
//!
//! ## Rate Control
//!
//! Each task holds a fraction of the store's capacity for the whole
//! invocation, sends one batch per call and pauses between calls. Batch
//! sizes are recomputed from the live server count and executor count on
//! every invocation; see [`compute_batch_size`].

mod apply;
mod batch_sizer;
mod client;
mod config;
mod entry;
mod error;
mod index;
mod locate;
mod parallelism;
mod qps_allocator;

pub use apply::{ApplyStats, Applier};
pub use batch_sizer::{bounded_batch_size, compute_batch_size};
pub use client::{KvStoreClient, KvStoreConnector, Mutation};
pub use config::{ExecutionContext, KvIndexConfig, QpsAllocatorKind};
pub use entry::{IndexEntry, ENTRY_FORMAT_VERSION};
pub use error::{KvIndexError, KvIndexResult};
pub use index::KvGlobalIndex;
pub use locate::{ClusterShape, LocateStats, Locator};
pub use parallelism::{estimate_put_access, PutAccessEstimate};
pub use qps_allocator::{
    create_qps_allocator, BoundedQpsResourceAllocator, DefaultQpsResourceAllocator, QpsAllocatorStats,
    QpsPermit, QpsResourceAllocator,
};

#[cfg(test)]
pub(crate) mod mock_client;
