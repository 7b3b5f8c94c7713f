//! Adaptive batch sizing.
//!
//! Converts a cluster-wide QPS budget into the number of keys one task may
//! send per store call:
//!
//! ```text
//! parallelism        = min(num_tasks, num_executors)
//! batches_per_second = 1000 / sleep_time_ms
//! budget             = num_region_servers * max_qps_per_server * qps_fraction
//! batch_size         = floor(budget / (parallelism * batches_per_second))
//! ```
//!
//! With `parallelism` tasks each sending one batch every `sleep_time_ms`,
//! the aggregate rate is `batch_size * parallelism * batches_per_second`,
//! which never exceeds `budget`.
//!
//! The result depends only on the arguments. Callers re-run it on every
//! invocation because executor and server counts change over time.

/// Largest per-call batch size that keeps the aggregate rate within budget.
///
/// `num_tasks` and `num_executors` must both be at least one; a zero
/// parallelism yields zero.
pub fn compute_batch_size(
    num_region_servers: usize,
    max_qps_per_region_server: f64,
    num_tasks: usize,
    num_executors: usize,
    sleep_time_ms: u64,
    qps_fraction: f64,
) -> usize {
    let parallelism = num_tasks.min(num_executors);
    debug_assert!(parallelism > 0, "batch sizing needs at least one task");
    debug_assert!(sleep_time_ms > 0, "batch sizing needs a positive pause");
    if parallelism == 0 || sleep_time_ms == 0 {
        return 0;
    }

    let budget = num_region_servers as f64 * max_qps_per_region_server * qps_fraction;
    let batch_size = budget * sleep_time_ms as f64 / (1000.0 * parallelism as f64);
    // Absorb rounding noise so exact quotients do not drop by one.
    (batch_size + 1e-9).floor().max(0.0) as usize
}

/// Clamp a computed batch size into `[1, upper_bound]`.
pub fn bounded_batch_size(computed: usize, upper_bound: usize) -> usize {
    computed.max(1).min(upper_bound.max(1))
}
