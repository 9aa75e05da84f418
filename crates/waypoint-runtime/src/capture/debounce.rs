//! Trailing debounce.

use std::time::Duration;

use tokio::time::Instant;

/// Holds at most one pending item and the instant it becomes due.
///
/// Every [`schedule`](Self::schedule) replaces the pending item and pushes
/// the deadline out again, so a burst collapses into its last item.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    /// Debouncer with a `window` quiet period.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Replace the pending item; due `window` after `now`.
    pub fn schedule(&mut self, item: T, now: Instant) {
        self.pending = Some((now + self.window, item));
    }

    /// When the pending item becomes due.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(at, _)| *at)
    }

    /// Take the pending item if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((at, _)) if *at <= now => self.pending.take().map(|(_, item)| item),
            _ => None,
        }
    }

    /// Drop the pending item.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
