//! Put access estimation.
//!
//! Only file groups that inserted records need new index rows; an updated
//! record keeps the location it already has. The put path is therefore sized
//! by the file groups with inserts, not by the number of execution
//! partitions:
//!
//! ```text
//! outcomes:  [fg-1: 1 insert] [fg-2: 0 inserts] [fg-3: 10 inserts]
//! total_puts      = 1 + 0 + 10 = 11
//! put_parallelism = 2            (fg-1, fg-3)
//! ```

use crate::storage::location::WriteOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PutAccessEstimate {
    /// Sum of inserts over all outcomes.
    pub total_puts: u64,
    /// Number of outcomes with at least one insert.
    pub put_parallelism: usize,
    /// Execution partitions the outcomes were spread over.
    pub num_partitions: usize,
}

/// Derive put volume and parallelism from every outcome of one write.
pub fn estimate_put_access(outcomes: &[WriteOutcome], num_partitions: usize) -> PutAccessEstimate {
    let (total_puts, put_parallelism) = outcomes
        .iter()
        .filter(|outcome| outcome.has_inserts())
        .fold((0u64, 0usize), |(puts, tasks), outcome| {
            (puts + outcome.num_inserts, tasks + 1)
        });
    PutAccessEstimate {
        total_puts,
        put_parallelism,
        num_partitions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_access_parallelism() {
        let outcomes = vec![
            WriteOutcome::new("fg-1", 1, 2),
            WriteOutcome::new("fg-2", 0, 3),
            WriteOutcome::new("fg-3", 10, 0),
        ];
        let estimate = estimate_put_access(&outcomes, 10);
        assert_eq!(estimate.num_partitions, 10);
        assert_eq!(estimate.put_parallelism, 2);
        assert_eq!(estimate.total_puts, 11);
    }

    #[test]
    fn test_updates_only() {
        let outcomes = vec![WriteOutcome::new("fg-1", 0, 7), WriteOutcome::new("fg-2", 0, 1)];
        let estimate = estimate_put_access(&outcomes, 2);
        assert_eq!(estimate.total_puts, 0);
        assert_eq!(estimate.put_parallelism, 0);
    }

    #[test]
    fn test_empty() {
        let estimate = estimate_put_access(&[], 0);
        assert_eq!(estimate.total_puts, 0);
        assert_eq!(estimate.put_parallelism, 0);
    }
}
