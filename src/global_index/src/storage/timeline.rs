//! Read-only view of the commit timeline.
//!
//! The index never owns the timeline; it only asks for the state of the
//! instant that wrote an entry. Instant lifecycle:
//!
//! ```text
//! REQUESTED ──► INFLIGHT ──► COMPLETED
//!     │            │             │
//!     └────────────┴─────────────┴──► ROLLED_BACK
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a commit instant as reported by the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstantState {
    Requested,
    Inflight,
    Completed,
    RolledBack,
    /// The timeline has no record of the instant.
    Unknown,
}

impl InstantState {
    pub fn is_completed(self) -> bool {
        matches!(self, InstantState::Completed)
    }
}

impl fmt::Display for InstantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstantState::Requested => "REQUESTED",
            InstantState::Inflight => "INFLIGHT",
            InstantState::Completed => "COMPLETED",
            InstantState::RolledBack => "ROLLED_BACK",
            InstantState::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A timestamped transaction on the timeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInstant {
    pub time: String,
    pub state: InstantState,
}

impl CommitInstant {
    pub fn new(time: impl Into<String>, state: InstantState) -> Self {
        Self {
            time: time.into(),
            state,
        }
    }
}

/// Query interface onto the commit timeline.
///
/// Implementations must reflect a rollback immediately: once a rollback of an
/// instant has finished, `state` must never return `Completed` for it again.
/// Lookup failures should be reported as [`InstantState::Unknown`].
pub trait CommitTimelineView: Send + Sync {
    fn state(&self, instant_time: &str) -> InstantState;
}
