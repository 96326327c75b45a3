//! Consecutive-failure tracking per target.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Consecutive failures needed before a failure alert fires.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Failure streak of one target since its last success.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FailureStreak {
    pub consecutive_failures: u32,
    /// Whether a failure alert already fired for this streak.
    pub notified: bool,
}

/// Alert to emit after recording an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakAlert {
    None,
    Failure { consecutive_failures: u32 },
    Recovery,
}

impl FailureStreak {
    /// Apply one check outcome and return the alert it triggers.
    pub fn observe(&mut self, success: bool) -> StreakAlert {
        if success {
            let was_notified = self.notified;
            *self = Self::default();
            return if was_notified {
                StreakAlert::Recovery
            } else {
                StreakAlert::None
            };
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= FAILURE_THRESHOLD && !self.notified {
            self.notified = true;
            return StreakAlert::Failure {
                consecutive_failures: self.consecutive_failures,
            };
        }

        StreakAlert::None
    }
}

/// Streaks for all targets, keyed by url.
///
/// Each update happens under one lock, so overlapping checks of the same
/// target cannot lose updates.
#[derive(Debug, Default)]
pub struct FailureTracker {
    streaks: Mutex<HashMap<String, FailureStreak>>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome for `url`, creating its streak on first sight.
    pub fn record(&self, url: &str, success: bool) -> StreakAlert {
        let mut streaks = self.streaks.lock().unwrap_or_else(PoisonError::into_inner);
        streaks.entry(url.to_string()).or_default().observe(success)
    }

    /// Current streak for `url`, if it has been observed.
    pub fn streak(&self, url: &str) -> Option<FailureStreak> {
        let streaks = self.streaks.lock().unwrap_or_else(PoisonError::into_inner);
        streaks.get(url).copied()
    }
}
