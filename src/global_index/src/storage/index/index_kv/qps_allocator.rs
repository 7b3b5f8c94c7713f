//! QPS resource allocation.
//!
//! Every locate or commit-apply task asks the allocator for a share of the
//! store's query capacity before issuing any call, and gives it back when it
//! finishes. Tasks hold the share through a [`QpsPermit`], which releases on
//! drop so that an early return or an error cannot leak quota.
//!
//! ```text
//! task ──acquire(0.5, capacity)──► allocator ──► QpsPermit { fraction: 0.5 }
//!   │                                                  │
//!   │  batches sized with permit.fraction()            │
//!   ▼                                                  ▼
//! exit (Ok or Err) ──────────── drop ─────────► release(0.5)
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::config::{KvIndexConfig, QpsAllocatorKind};
use super::error::{KvIndexError, KvIndexResult};

/// Snapshot of grants currently held by tasks.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QpsAllocatorStats {
    pub outstanding_grants: usize,
    pub outstanding_fraction: f64,
    pub total_grants: u64,
}

/// Hands out fractions of the store's query capacity.
///
/// Implementations must tolerate concurrent calls from many tasks.
pub trait QpsResourceAllocator: Send + Sync {
    /// Grant a fraction of `total_capacity` (requests per second across the
    /// store) in response to a request for `desired_fraction`.
    fn acquire_qps_resources(&self, desired_fraction: f64, total_capacity: f64) -> f64;

    /// Return a fraction previously granted by `acquire_qps_resources`.
    fn release_qps_resources(&self, granted_fraction: f64);

    fn stats(&self) -> QpsAllocatorStats;
}

/// Grant accounting shared by the allocator implementations.
#[derive(Default)]
struct GrantLedger {
    state: Mutex<QpsAllocatorStats>,
}

impl GrantLedger {
    fn record_grant(&self, fraction: f64) {
        let mut state = self.state.lock();
        state.outstanding_grants += 1;
        state.outstanding_fraction += fraction;
        state.total_grants += 1;
    }

    fn record_release(&self, fraction: f64) {
        let mut state = self.state.lock();
        state.outstanding_grants = state.outstanding_grants.saturating_sub(1);
        if state.outstanding_grants == 0 {
            state.outstanding_fraction = 0.0;
        } else {
            state.outstanding_fraction = (state.outstanding_fraction - fraction).max(0.0);
        }
    }

    fn snapshot(&self) -> QpsAllocatorStats {
        *self.state.lock()
    }
}

/// Static allocation: every task gets exactly what it asks for.
#[derive(Default)]
pub struct DefaultQpsResourceAllocator {
    ledger: GrantLedger,
}

impl DefaultQpsResourceAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QpsResourceAllocator for DefaultQpsResourceAllocator {
    fn acquire_qps_resources(&self, desired_fraction: f64, total_capacity: f64) -> f64 {
        debug!(
            desired_fraction,
            total_capacity, "granting requested qps fraction"
        );
        self.ledger.record_grant(desired_fraction);
        desired_fraction
    }

    fn release_qps_resources(&self, granted_fraction: f64) {
        self.ledger.record_release(granted_fraction);
    }

    fn stats(&self) -> QpsAllocatorStats {
        self.ledger.snapshot()
    }
}

/// Clamps every request into a configured `[min, max]` range.
pub struct BoundedQpsResourceAllocator {
    min_fraction: f64,
    max_fraction: f64,
    ledger: GrantLedger,
}

impl BoundedQpsResourceAllocator {
    /// Fails unless `0 < min_fraction <= max_fraction <= 1`.
    pub fn new(min_fraction: f64, max_fraction: f64) -> KvIndexResult<Self> {
        if !(min_fraction > 0.0 && min_fraction <= max_fraction && max_fraction <= 1.0) {
            return Err(KvIndexError::invalid_config(format!(
                "bounded allocator needs 0 < min <= max <= 1, got [{min_fraction}, {max_fraction}]"
            )));
        }
        Ok(Self {
            min_fraction,
            max_fraction,
            ledger: GrantLedger::default(),
        })
    }
}

impl QpsResourceAllocator for BoundedQpsResourceAllocator {
    fn acquire_qps_resources(&self, desired_fraction: f64, total_capacity: f64) -> f64 {
        let granted = desired_fraction.clamp(self.min_fraction, self.max_fraction);
        debug!(
            desired_fraction,
            granted,
            total_capacity,
            "granting bounded qps fraction"
        );
        self.ledger.record_grant(granted);
        granted
    }

    fn release_qps_resources(&self, granted_fraction: f64) {
        self.ledger.record_release(granted_fraction);
    }

    fn stats(&self) -> QpsAllocatorStats {
        self.ledger.snapshot()
    }
}

/// Build the allocator selected by `config.qps_allocator`.
pub fn create_qps_allocator(config: &KvIndexConfig) -> KvIndexResult<Arc<dyn QpsResourceAllocator>> {
    let allocator: Arc<dyn QpsResourceAllocator> = match config.qps_allocator {
        QpsAllocatorKind::Default => Arc::new(DefaultQpsResourceAllocator::new()),
        QpsAllocatorKind::Bounded => Arc::new(BoundedQpsResourceAllocator::new(
            config.min_qps_fraction,
            config.max_qps_fraction,
        )?),
    };
    Ok(allocator)
}

/// A granted QPS fraction, released when dropped.
pub struct QpsPermit {
    allocator: Arc<dyn QpsResourceAllocator>,
    fraction: f64,
}

impl QpsPermit {
    pub fn acquire(
        allocator: &Arc<dyn QpsResourceAllocator>,
        desired_fraction: f64,
        total_capacity: f64,
    ) -> Self {
        let fraction = allocator.acquire_qps_resources(desired_fraction, total_capacity);
        Self {
            allocator: Arc::clone(allocator),
            fraction,
        }
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }
}

impl Drop for QpsPermit {
    fn drop(&mut self) {
        self.allocator.release_qps_resources(self.fraction);
    }
}
