//! The event capture state machine.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};
use waypoint_core::EventKind;
use waypoint_core::telemetry::TelemetryRecord;
use waypoint_dom::{Document, NodeId};
use waypoint_rules::RuleFocusIndex;
use waypoint_telemetry::{SessionCounters, synthesize};

use super::debounce::Debouncer;
use super::gate::{GateDecision, admit};
use super::mutation::MutationScope;
use super::time::TimeTracker;

/// An interaction forwarded by the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PageEvent {
    /// `click` on `target`.
    Click {
        /// Clicked element.
        target: Option<NodeId>,
    },
    /// `input`/`change` on a form control.
    Input {
        /// Edited control.
        target: NodeId,
    },
    /// `submit` of a form.
    Submit {
        /// Submitted form.
        target: Option<NodeId>,
    },
    /// Text or value mutation observed inside the mutation scope.
    Mutation {
        /// Mutated element.
        target: NodeId,
    },
    /// Scroll position as a percentage of the scrollable height.
    Scroll {
        /// 0..=100
        depth_percent: f64,
    },
}

/// An evaluation waiting to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capture {
    /// Event kind sent to the backend.
    pub kind: EventKind,
    /// Element the telemetry is built from.
    pub target: Option<NodeId>,
}

/// Gating, debounce and timers for one page view.
///
/// The engine never runs evaluations itself. The assistant asks it for due
/// captures and owns the in-flight slot.
#[derive(Debug)]
pub struct CaptureEngine {
    index: RuleFocusIndex,
    ready: bool,
    debouncer: Debouncer<Capture>,
    time: TimeTracker,
    mutation_scope: Option<MutationScope>,
    counters: SessionCounters,
}

impl CaptureEngine {
    /// Engine with a `debounce` window, not yet ready.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            index: RuleFocusIndex::permissive(),
            ready: false,
            debouncer: Debouncer::new(debounce),
            time: TimeTracker::default(),
            mutation_scope: None,
            counters: SessionCounters::new(),
        }
    }

    /// Install a freshly built index and arm its timers. Events are
    /// accepted from now on.
    pub fn install_index(&mut self, index: RuleFocusIndex) {
        self.mutation_scope = MutationScope::from_index(&index);
        self.time.arm(
            index.bundle(EventKind::TimeSpent),
            self.counters.page_started_at(),
        );
        info!(
            kinds = ?index.allowed_kinds(),
            fallback = index.is_fallback(),
            mutation_scope = self.mutation_scope.is_some(),
            "capture engine ready"
        );
        self.index = index;
        self.ready = true;
    }

    /// Current focus index.
    pub fn index(&self) -> &RuleFocusIndex {
        &self.index
    }

    /// Whether an index is installed for this page view.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Scope for mutation observation, if the index allows any.
    pub fn mutation_scope(&self) -> Option<&MutationScope> {
        self.mutation_scope.as_ref()
    }

    /// Session counters.
    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    /// Route change: per-page counters, the pending capture and time
    /// thresholds reset; the engine waits for a new index.
    pub fn reset_page(&mut self) {
        self.counters.reset_page();
        self.debouncer.cancel();
        self.time.disarm();
        self.mutation_scope = None;
        self.ready = false;
    }

    /// Feed a host event. Returns the kind scheduled, if any.
    pub fn on_page_event(
        &mut self,
        event: PageEvent,
        doc: &dyn Document,
        now: Instant,
    ) -> Option<EventKind> {
        let (kind, target) = match event {
            PageEvent::Click { target } => {
                self.counters.record_click();
                (EventKind::DomClick, target)
            }
            PageEvent::Input { target } => (EventKind::InputChange, Some(target)),
            PageEvent::Submit { target } => (EventKind::Submit, target),
            PageEvent::Mutation { target } => {
                let covered = self
                    .mutation_scope
                    .as_ref()
                    .is_some_and(|scope| scope.covers(doc, target));
                if !covered {
                    debug!(node = %target, "mutation outside scope");
                    return None;
                }
                (EventKind::InputChange, Some(target))
            }
            PageEvent::Scroll { depth_percent } => {
                self.counters.record_scroll(depth_percent);
                return None;
            }
        };
        self.schedule(kind, target, doc, now).then_some(kind)
    }

    /// Gate and debounce an event of `kind`. Returns whether it was
    /// scheduled.
    pub fn schedule(
        &mut self,
        kind: EventKind,
        target: Option<NodeId>,
        doc: &dyn Document,
        now: Instant,
    ) -> bool {
        if !self.ready {
            debug!(kind = %kind, "index not ready, event dropped");
            return false;
        }
        let session = self.counters.snapshot().to_map();
        if admit(&self.index, kind, doc, target, &session) != GateDecision::Pass {
            return false;
        }
        self.debouncer.schedule(Capture { kind, target }, now);
        true
    }

    /// When the pending capture becomes due.
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Take the pending capture if due.
    pub fn take_due(&mut self, now: Instant) -> Option<Capture> {
        self.debouncer.take_due(now)
    }

    /// When the time tracker wants to be woken.
    pub fn time_deadline(&self) -> Option<Instant> {
        if self.ready { self.time.deadline() } else { None }
    }

    /// Wake the time tracker. Returns a `time_spent` capture when a
    /// threshold fires; a threshold is only consumed when it fires.
    pub fn time_tick(&mut self, now: Instant, doc: &dyn Document, busy: bool) -> Option<Capture> {
        let due = self.time.due(now);
        let capture = match due {
            Some(_) if busy => {
                debug!("time threshold due while busy, deferring");
                None
            }
            Some(threshold) => {
                let session = self.counters.snapshot().to_map();
                match admit(&self.index, EventKind::TimeSpent, doc, None, &session) {
                    GateDecision::Pass => {
                        self.time.mark_fired(threshold);
                        info!(threshold_ms = threshold.millis, "time threshold crossed");
                        Some(Capture {
                            kind: EventKind::TimeSpent,
                            target: None,
                        })
                    }
                    _ => None,
                }
            }
            None => None,
        };
        self.time.reschedule(now);
        capture
    }

    /// Telemetry for `capture` as the page looks now.
    pub fn telemetry(&self, doc: &dyn Document, capture: &Capture) -> TelemetryRecord {
        let snapshot = self
            .index
            .tracks_session()
            .then(|| self.counters.snapshot());
        synthesize(doc, capture.target, snapshot.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use waypoint_core::rules::{RawCondition, RuleListItem, RuleTrigger};
    use waypoint_dom::MemoryDocument;

    const PAGE: &str = r#"<html><body>
<button id="add-to-cart">Add</button><button id="other">Other</button>
<div id="cart-count">0</div><p id="free">x</p>
</body></html>"#;

    fn rule(triggers: Vec<(&str, Vec<RawCondition>)>) -> RuleListItem {
        RuleListItem {
            id: "r1".into(),
            enabled: true,
            tracking: true,
            triggers: triggers
                .into_iter()
                .map(|(kind, conditions)| RuleTrigger {
                    event_kind: kind.into(),
                    conditions,
                })
                .collect(),
        }
    }

    fn id_eq(id: &str) -> RawCondition {
        RawCondition::new("telemetry.attributes.id", "equals", json!(id))
    }

    fn ready_engine(rules: &[RuleListItem]) -> CaptureEngine {
        let mut engine = CaptureEngine::new(Duration::from_millis(150));
        engine.install_index(RuleFocusIndex::build(rules));
        engine
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_clicks_yields_one_capture_with_last_target() {
        let doc = MemoryDocument::parse(PAGE, "https://shop.test/");
        let mut engine = ready_engine(&[rule(vec![("dom_click", vec![])])]);
        let first = doc.element_by_id("other");
        let last = doc.element_by_id("add-to-cart");

        for target in [first, first, last] {
            let scheduled = engine.on_page_event(PageEvent::Click { target }, &doc, Instant::now());
            assert_eq!(scheduled, Some(EventKind::DomClick));
            tokio::time::advance(Duration::from_millis(40)).await;
        }
        assert_eq!(engine.take_due(Instant::now()), None);

        tokio::time::advance(Duration::from_millis(110)).await;
        let capture = engine.take_due(Instant::now()).unwrap();
        assert_eq!(capture.target, last);
        assert_eq!(engine.take_due(Instant::now()), None);
        assert_eq!(engine.counters().snapshot().click_count, 3);
    }

    #[test]
    fn events_before_ready_are_dropped() {
        let doc = MemoryDocument::parse(PAGE, "https://shop.test/");
        let mut engine = CaptureEngine::new(Duration::from_millis(150));
        let scheduled = engine.on_page_event(PageEvent::Click { target: None }, &doc, Instant::now());
        assert_eq!(scheduled, None);
        assert!(engine.debounce_deadline().is_none());
    }

    #[test]
    fn mutation_bridges_only_inside_scope() {
        let doc = MemoryDocument::parse(PAGE, "https://shop.test/");
        let mut engine = ready_engine(&[rule(vec![("input_change", vec![id_eq("cart-count")])])]);
        assert!(engine.mutation_scope().is_some());

        let free = doc.element_by_id("free").unwrap();
        assert_eq!(
            engine.on_page_event(PageEvent::Mutation { target: free }, &doc, Instant::now()),
            None
        );
        let count = doc.element_by_id("cart-count").unwrap();
        assert_eq!(
            engine.on_page_event(PageEvent::Mutation { target: count }, &doc, Instant::now()),
            Some(EventKind::InputChange)
        );
    }

    #[test]
    fn scroll_only_updates_counters() {
        let doc = MemoryDocument::parse(PAGE, "https://shop.test/");
        let mut engine = ready_engine(&[rule(vec![("dom_click", vec![])])]);
        let scheduled = engine.on_page_event(
            PageEvent::Scroll { depth_percent: 62.4 },
            &doc,
            Instant::now(),
        );
        assert_eq!(scheduled, None);
        assert_eq!(engine.counters().snapshot().scroll_depth, 62);
    }

    #[tokio::test(start_paused = true)]
    async fn time_threshold_waits_for_idle_slot() {
        let doc = MemoryDocument::parse(PAGE, "https://shop.test/");
        let mut engine = ready_engine(&[rule(vec![(
            "time_spent",
            vec![RawCondition::new("session.timeOnPage", "gte", json!(5))],
        )])]);
        let deadline = engine.time_deadline().unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(Instant::now() >= deadline);

        assert_eq!(engine.time_tick(Instant::now(), &doc, true), None);
        tokio::time::advance(Duration::from_secs(1)).await;
        let capture = engine.time_tick(Instant::now(), &doc, false).unwrap();
        assert_eq!(capture.kind, EventKind::TimeSpent);
        assert_eq!(engine.time_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_page_clears_pending_and_waits_for_index() {
        let doc = MemoryDocument::parse(PAGE, "https://shop.test/");
        let mut engine = ready_engine(&[rule(vec![("dom_click", vec![])])]);
        let _ = engine.on_page_event(PageEvent::Click { target: None }, &doc, Instant::now());
        engine.reset_page();
        assert!(!engine.is_ready());
        assert!(engine.debounce_deadline().is_none());
        assert_eq!(engine.counters().snapshot().click_count, 0);
    }

    #[test]
    fn telemetry_carries_session_only_when_tracked() {
        let doc = MemoryDocument::parse(PAGE, "https://shop.test/");
        let capture = Capture {
            kind: EventKind::DomClick,
            target: doc.element_by_id("add-to-cart"),
        };

        let plain = ready_engine(&[rule(vec![("dom_click", vec![])])]);
        assert_eq!(plain.telemetry(&doc, &capture).attribute("clickCount"), None);

        let tracked = ready_engine(&[rule(vec![(
            "dom_click",
            vec![RawCondition::new("session.clickCount", "gte", json!(0))],
        )])]);
        let record = tracked.telemetry(&doc, &capture);
        assert_eq!(record.attribute("clickCount"), Some("0"));
        assert_eq!(record.attribute("path"), Some("/"));
    }
}
