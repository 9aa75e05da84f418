//! `time_spent` threshold tracking.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;
use waypoint_rules::{FocusFilterBundle, TimeThreshold};

/// Re-check interval once the first threshold is due.
pub const RECHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Fires each armed threshold at most once per page view.
///
/// One deadline is armed at the smallest threshold; after that the tracker
/// re-checks every [`RECHECK_INTERVAL`] until every threshold has fired.
#[derive(Debug, Default)]
pub struct TimeTracker {
    thresholds: Vec<TimeThreshold>,
    fired: BTreeSet<TimeThreshold>,
    page_start: Option<Instant>,
    next_check: Option<Instant>,
}

impl TimeTracker {
    /// Arm from the `time_spent` bundle, counting from `page_start`.
    /// Clears any previous state.
    pub fn arm(&mut self, bundle: Option<&FocusFilterBundle>, page_start: Instant) {
        self.thresholds = bundle
            .map(|b| b.armed_thresholds().copied().collect())
            .unwrap_or_default();
        self.fired.clear();
        self.page_start = Some(page_start);
        self.next_check = self
            .thresholds
            .iter()
            .map(TimeThreshold::due_at_ms)
            .min()
            .map(|ms| page_start + Duration::from_millis(ms));
    }

    /// Forget everything; nothing fires until re-armed.
    pub fn disarm(&mut self) {
        self.thresholds.clear();
        self.fired.clear();
        self.page_start = None;
        self.next_check = None;
    }

    /// Next instant the actor should wake the tracker.
    pub fn deadline(&self) -> Option<Instant> {
        self.next_check
    }

    /// Lowest crossed, unfired threshold at `now`, without consuming it.
    pub fn due(&self, now: Instant) -> Option<TimeThreshold> {
        let start = self.page_start?;
        let elapsed = elapsed_ms(start, now);
        self.thresholds
            .iter()
            .find(|t| !self.fired.contains(t) && t.is_crossed(elapsed))
            .copied()
    }

    /// Mark `threshold` as fired.
    pub fn mark_fired(&mut self, threshold: TimeThreshold) {
        let _ = self.fired.insert(threshold);
    }

    /// Schedule the next check after a tick at `now`.
    pub fn reschedule(&mut self, now: Instant) {
        self.next_check = if self.fired.len() < self.thresholds.len() {
            Some(now + RECHECK_INTERVAL)
        } else {
            None
        };
    }
}

fn elapsed_ms(start: Instant, now: Instant) -> u64 {
    u64::try_from(now.saturating_duration_since(start).as_millis()).unwrap_or(u64::MAX)
}
