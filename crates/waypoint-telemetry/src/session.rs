//! Per-visit interaction counters.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

/// Counters for the current page view and visit.
///
/// Uses `tokio::time::Instant` so paused-clock tests can advance time.
/// [`reset_page`](Self::reset_page) clears everything except the site
/// start, which survives in-page route changes.
#[derive(Clone, Debug)]
pub struct SessionCounters {
    site_start: Instant,
    page_start: Instant,
    clicks: u64,
    max_scroll_depth: u8,
}

impl SessionCounters {
    /// Counters starting now.
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            site_start: now,
            page_start: now,
            clicks: 0,
            max_scroll_depth: 0,
        }
    }

    /// Count one click.
    pub fn record_click(&mut self) {
        self.clicks = self.clicks.saturating_add(1);
    }

    /// Record a scroll position as a percentage of the scrollable height.
    /// Only the maximum is kept; out-of-range values clamp.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn record_scroll(&mut self, depth_percent: f64) {
        let depth = if depth_percent.is_finite() {
            depth_percent.clamp(0.0, 100.0).round() as u8
        } else {
            0
        };
        self.max_scroll_depth = self.max_scroll_depth.max(depth);
    }

    /// Time since the current page view started.
    #[must_use]
    pub fn time_on_page(&self) -> Duration {
        self.page_start.elapsed()
    }

    /// Time since the assistant started on this site.
    #[must_use]
    pub fn time_on_site(&self) -> Duration {
        self.site_start.elapsed()
    }

    /// When the current page view started.
    #[must_use]
    pub fn page_started_at(&self) -> Instant {
        self.page_start
    }

    /// Reset per-page counters after a route change.
    pub fn reset_page(&mut self) {
        self.page_start = Instant::now();
        self.clicks = 0;
        self.max_scroll_depth = 0;
    }

    /// Point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            time_on_page: self.time_on_page().as_secs(),
            click_count: self.clicks,
            scroll_depth: self.max_scroll_depth,
            time_on_site: self.time_on_site().as_secs(),
        }
    }
}

impl Default for SessionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at one instant. Times are whole seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Seconds on the current page view.
    pub time_on_page: u64,
    /// Clicks on the current page view.
    pub click_count: u64,
    /// Maximum scroll depth, percent.
    pub scroll_depth: u8,
    /// Seconds since the visit started.
    pub time_on_site: u64,
}

impl SessionSnapshot {
    /// As a JSON object, for session condition evaluation.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let _ = map.insert("timeOnPage".into(), self.time_on_page.into());
        let _ = map.insert("clickCount".into(), self.click_count.into());
        let _ = map.insert("scrollDepth".into(), self.scroll_depth.into());
        let _ = map.insert("timeOnSite".into(), self.time_on_site.into());
        map
    }

    /// Merge into a telemetry attribute map as strings.
    pub fn merge_into(&self, attributes: &mut BTreeMap<String, Option<String>>) {
        for (key, value) in self.to_map() {
            let _ = attributes.insert(key, Some(value.to_string()));
        }
    }
}
