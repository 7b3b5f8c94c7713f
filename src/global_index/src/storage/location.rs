//! # Location Model
//!
//! Value types shared by the write path and the index:
//!
//! ```text
//! IndexedRecord
//! ├─ key:              RecordKey        (logical identity)
//! ├─ partition_path:   String           (rewritten by a global lookup)
//! ├─ current_location: Option<Location> (set by locate, verified)
//! └─ new_location:     Option<Location> (set by the write path)
//!
//! Location = (file_id, instant_time)
//! ```
//!
//! [`WriteOutcome`] summarizes what one file group wrote during a commit and
//! drives how much put work the commit-apply step has to do.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identity of a logical record.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for RecordKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Physical location of a record version.
///
/// A location names the file group holding the record and the commit
/// instant that wrote it. Whether the location is usable depends on the
/// state of that instant on the timeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File group id.
    pub file_id: String,
    /// Commit instant that wrote this version.
    pub instant_time: String,
}

impl Location {
    pub fn new(file_id: impl Into<String>, instant_time: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            instant_time: instant_time.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.file_id, self.instant_time)
    }
}

/// A record flowing through one write/commit cycle.
///
/// # Lifecycle
///
/// 1. Created by the write path with only `key` and `partition_path` set.
/// 2. `locate` sets `current_location` when the index holds a committed entry.
/// 3. The write path assigns `new_location` (or leaves it empty for a delete).
/// 4. After the commit completes, commit-apply persists `new_location`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedRecord {
    pub key: RecordKey,
    pub partition_path: String,
    /// Verified location of the latest committed version, if any.
    pub current_location: Option<Location>,
    /// Location assigned by the write path for this commit.
    pub new_location: Option<Location>,
}

impl IndexedRecord {
    pub fn new(key: impl Into<RecordKey>, partition_path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            partition_path: partition_path.into(),
            current_location: None,
            new_location: None,
        }
    }

    pub fn with_new_location(mut self, location: Location) -> Self {
        self.new_location = Some(location);
        self
    }

    pub fn with_current_location(mut self, location: Location) -> Self {
        self.current_location = Some(location);
        self
    }

    pub fn is_current_location_known(&self) -> bool {
        self.current_location.is_some()
    }

    /// Tag the record with a verified location, adopting the partition path
    /// the index recorded for it.
    pub fn set_current_location(&mut self, location: Location, partition_path: String) {
        self.current_location = Some(location);
        self.partition_path = partition_path;
    }
}

/// Per file group summary of a write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub file_id: String,
    pub partition_path: String,
    pub num_inserts: u64,
    pub num_update_writes: u64,
    pub has_errors: bool,
    /// Keys whose write failed inside this file group.
    pub failed_keys: HashSet<RecordKey>,
}

impl WriteOutcome {
    pub fn new(file_id: impl Into<String>, num_inserts: u64, num_update_writes: u64) -> Self {
        Self {
            file_id: file_id.into(),
            num_inserts,
            num_update_writes,
            ..Default::default()
        }
    }

    pub fn with_partition_path(mut self, partition_path: impl Into<String>) -> Self {
        self.partition_path = partition_path.into();
        self
    }

    /// Mark a key as failed, which also flags the outcome as errored.
    pub fn with_failed_key(mut self, key: impl Into<RecordKey>) -> Self {
        self.failed_keys.insert(key.into());
        self.has_errors = true;
        self
    }

    pub fn has_inserts(&self) -> bool {
        self.num_inserts > 0
    }

    pub fn is_failed(&self, key: &RecordKey) -> bool {
        self.failed_keys.contains(key)
    }
}
