//! Aggregate task statistics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task counts partitioned by lifecycle bucket.
///
/// `in_progress` covers the three TDD phases.
///
/// # Example
///
/// ```
/// use autodev::tracker::LoopStatistics;
///
/// let stats = LoopStatistics {
///     pending: 2,
///     in_progress: 1,
///     completed: 3,
///     blocked: 1,
/// };
/// assert_eq!(stats.total(), 7);
/// assert!(!stats.all_done());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStatistics {
    pub pending: u32,
    pub in_progress: u32,
    pub completed: u32,
    pub blocked: u32,
}

impl LoopStatistics {
    /// Get total task count.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.pending + self.in_progress + self.completed + self.blocked
    }

    /// Check if every task reached a terminal status.
    #[must_use]
    pub fn all_done(&self) -> bool {
        self.pending == 0 && self.in_progress == 0
    }

    /// Completed share in percent; 0 for an empty register.
    #[must_use]
    pub fn completion_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => f64::from(self.completed) * 100.0 / f64::from(total),
        }
    }
}

impl fmt::Display for LoopStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total: {} completed, {} in progress, {} blocked, {} pending",
            self.total(),
            self.completed,
            self.in_progress,
            self.blocked,
            self.pending
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_default() {
        let stats = LoopStatistics::default();
        assert_eq!(stats.total(), 0);
        assert!(stats.all_done());
        assert_eq!(stats.completion_rate(), 0.0);
    }

    #[test]
    fn test_statistics_all_done_with_blocked() {
        let stats = LoopStatistics {
            completed: 3,
            blocked: 1,
            ..Default::default()
        };
        assert!(stats.all_done());
        assert_eq!(stats.completion_rate(), 75.0);
    }

    #[test]
    fn test_statistics_display() {
        let stats = LoopStatistics {
            pending: 1,
            in_progress: 2,
            completed: 3,
            blocked: 0,
        };
        assert_eq!(
            stats.to_string(),
            "6 total: 3 completed, 2 in progress, 0 blocked, 1 pending"
        );
    }
}
