//! Global record index for a multi-versioned, file-group organized table.
//!
//! The index maps a record key to the file group holding its latest version
//! and lives in an external key-value store. Lookups are gated by the commit
//! timeline so that entries written by rolled back or in-flight commits never
//! surface as valid locations.

pub mod storage;

pub use storage::index::index_kv::{
    KvGlobalIndex, KvIndexConfig, KvIndexError, KvIndexResult, KvStoreClient, KvStoreConnector,
};
pub use storage::index::RecordIndex;
pub use storage::location::{IndexedRecord, Location, RecordKey, WriteOutcome};
pub use storage::timeline::{CommitInstant, CommitTimelineView, InstantState};
