//! The suggestion flow state machine.
//!
//! ```text
//! not-triggered ── match ──▶ rule-matched ── batch ──▶ suggestions-rendered
//!                                                        │        ▲
//!                                                      (CTA) ─────┘
//!                                                        │
//!                                                        ▼
//!                                                      closed
//! ```
//!
//! The controller is synchronous. Network calls are made by the assistant
//! task, which feeds results back through [`FlowController::on_first_batch`]
//! and [`FlowController::finish_cta`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use waypoint_core::api::MatchResult;
use waypoint_core::suggestion::{CtaSpec, Suggestion};
use waypoint_core::{AssistantEvent, ErrorStage};

use crate::errors::RuntimeError;
use crate::events::EventBus;
use crate::render::Renderer;

use super::cta::{CtaOutcome, CtaPlan};
use super::state::FlowState;
use super::steps;

/// A first-batch fetch the controller wants made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingFetch {
    /// Top matched rule.
    pub rule_id: String,
    /// Signature of the match that led here.
    pub signature: String,
}

/// Owns [`FlowState`] and the renderer.
pub struct FlowController {
    state: FlowState,
    renderer: Arc<dyn Renderer>,
    bus: EventBus,
    cooldown: Duration,
}

impl FlowController {
    /// Controller with a post-render `cooldown`.
    pub fn new(renderer: Arc<dyn Renderer>, bus: EventBus, cooldown: Duration) -> Self {
        Self {
            state: FlowState::default(),
            renderer,
            bus,
            cooldown,
        }
    }

    /// Current state.
    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Decide whether a rule match should fetch suggestions.
    pub fn on_match(&mut self, result: &MatchResult, now: Instant) -> Option<PendingFetch> {
        if !result.should_proceed {
            debug!(reason = ?result.reason, "backend declined");
            return None;
        }
        let Some(rule_id) = result.top_rule_id() else {
            debug!("proceed without matched rules");
            return None;
        };
        if self.state.triggered_rules.contains(rule_id) {
            debug!(rule_id, "rule already triggered on this page");
            return None;
        }
        let signature = result.signature();
        if self.state.in_cooldown(now)
            && self.state.last_match_signature.as_deref() == Some(signature.as_str())
        {
            debug!(rule_id, "same match during cooldown");
            return None;
        }
        if self.state.last_rule_id.as_deref() != Some(rule_id) {
            self.state.choice_input.clear();
        }
        Some(PendingFetch {
            rule_id: rule_id.to_owned(),
            signature,
        })
    }

    /// Apply the first batch for `fetch`.
    pub fn on_first_batch(
        &mut self,
        fetch: PendingFetch,
        batch: Result<Vec<Suggestion>, RuntimeError>,
        now: Instant,
    ) {
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                warn!(rule_id = %fetch.rule_id, error = %e, "suggestion fetch failed");
                self.bus
                    .emit(&AssistantEvent::error(ErrorStage::Suggest, e.to_string()));
                return;
            }
        };

        info!(rule_id = %fetch.rule_id, count = batch.len(), "suggestions received");
        let _ = self.state.triggered_rules.insert(fetch.rule_id.clone());
        self.state.last_rule_id = Some(fetch.rule_id);
        self.state.last_match_signature = Some(fetch.signature);
        self.state.replace_suggestions(batch);

        match steps::min_step(&self.state.last_suggestions) {
            Some(step) => self.show(step, now),
            None => self.close(),
        }
    }

    /// Resolve a click against the current batch.
    pub fn plan_cta(&self, cta: CtaSpec) -> CtaPlan {
        CtaPlan::resolve(cta, &self.state.last_suggestions, self.state.current_step)
    }

    /// Rule whose flow a CTA continues.
    pub fn active_rule(&self) -> Option<&str> {
        self.state.last_rule_id.as_deref()
    }

    /// Current choice input.
    pub fn choice_input(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.state.choice_input
    }

    /// Apply a finished CTA pipeline, then the clicked CTA's advancement.
    pub fn finish_cta(&mut self, plan: &CtaPlan, outcome: CtaOutcome, now: Instant) {
        self.state.choice_input = outcome.input;

        let mut target_step = None;
        if let Some(batch) = outcome.suggestions {
            self.state.replace_suggestions(batch);
            match steps::min_step(&self.state.last_suggestions) {
                Some(step) => target_step = Some(step),
                None => {
                    self.close();
                    return;
                }
            }
        }

        if let Some(e) = outcome.error {
            self.bus
                .emit(&AssistantEvent::error(ErrorStage::Cta, e.to_string()));
        } else {
            let clicked = &plan.clicked;
            if clicked.next_close {
                info!(label = %clicked.label, "flow closed");
                self.close();
                return;
            }
            if let Some(id) = clicked.next_id.as_deref() {
                match steps::step_of(&self.state.last_suggestions, id) {
                    Some(step) => target_step = Some(step),
                    None => warn!(next_id = id, "nextId not in current suggestions"),
                }
            } else if let Some(step) = clicked.step_target() {
                target_step = Some(step);
            }
        }

        if let Some(step) = target_step {
            if steps::at_step(&self.state.last_suggestions, step).is_empty() {
                warn!(step, "no suggestions at step");
            } else {
                self.show(step, now);
            }
        }
    }

    /// Per-page reset on route change.
    pub fn reset_for_route(&mut self) {
        self.state.reset_for_route();
    }

    fn show(&mut self, step: u32, now: Instant) {
        let visible = steps::at_step(&self.state.last_suggestions, step);
        let rendered = catch_unwind(AssertUnwindSafe(|| self.renderer.render(step, &visible)));
        match rendered {
            Ok(Ok(())) => {
                self.state.current_step = Some(step);
                self.state.cooldown_until = Some(now + self.cooldown);
                debug!(step, count = visible.len(), "rendered");
                self.bus.emit(&AssistantEvent::SuggestReady {
                    rule_id: self.state.last_rule_id.clone(),
                    step: Some(step),
                    suggestions: visible,
                });
            }
            Ok(Err(e)) => {
                warn!(step, error = %e, "render failed");
                self.bus
                    .emit(&AssistantEvent::error(ErrorStage::Render, e.to_string()));
            }
            Err(_) => {
                warn!(step, "renderer panicked");
                self.bus
                    .emit(&AssistantEvent::error(ErrorStage::Render, "renderer panicked"));
            }
        }
    }

    fn close(&mut self) {
        self.state.close();
        if catch_unwind(AssertUnwindSafe(|| self.renderer.clear())).is_err() {
            warn!("renderer panicked while clearing");
        }
    }
}

impl std::fmt::Debug for FlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowController")
            .field("state", &self.state)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MemoryRenderer;
    use assert_matches::assert_matches;
    use serde_json::{Map, json};
    use tokio::sync::broadcast;

    const COOLDOWN: Duration = Duration::from_secs(30);

    fn setup() -> (FlowController, Arc<MemoryRenderer>, broadcast::Receiver<AssistantEvent>) {
        let renderer = Arc::new(MemoryRenderer::new());
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let ctl = FlowController::new(Arc::clone(&renderer) as Arc<dyn Renderer>, bus, COOLDOWN);
        (ctl, renderer, rx)
    }

    fn matched(ids: &[&str]) -> MatchResult {
        MatchResult {
            should_proceed: true,
            matched_rule_ids: ids.iter().map(|s| (*s).to_owned()).collect(),
            reason: None,
        }
    }

    fn batch(value: serde_json::Value) -> Vec<Suggestion> {
        serde_json::from_value(value).unwrap()
    }

    fn two_step_batch() -> Vec<Suggestion> {
        batch(json!([
            {"id": "s1", "meta": {"step": 1}, "primaryCta": {"kind": "noop", "label": "Next", "nextId": "s3"}},
            {"id": "s2", "meta": {"step": 2}},
            {"id": "s3", "meta": {"step": 3}, "secondaryCta": [{"kind": "noop", "label": "Close", "nextClose": true}]}
        ]))
    }

    fn accept(ctl: &mut FlowController, ids: &[&str], suggestions: Vec<Suggestion>) {
        let fetch = ctl.on_match(&matched(ids), Instant::now()).unwrap();
        ctl.on_first_batch(fetch, Ok(suggestions), Instant::now());
    }

    fn outcome(ctl: &FlowController) -> CtaOutcome {
        CtaOutcome {
            input: ctl.choice_input().clone(),
            ..CtaOutcome::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn declined_match_does_nothing() {
        let (mut ctl, renderer, mut rx) = setup();
        let result = MatchResult {
            should_proceed: false,
            matched_rule_ids: vec!["r1".into()],
            reason: Some("no".into()),
        };
        assert_eq!(ctl.on_match(&result, Instant::now()), None);
        assert_eq!(renderer.render_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn first_batch_renders_minimum_step() {
        let (mut ctl, renderer, mut rx) = setup();
        accept(&mut ctl, &["generic", "r1"], two_step_batch());

        assert_eq!(renderer.visible_ids(), vec!["s1"]);
        assert_eq!(ctl.state().current_step, Some(1));
        assert_eq!(ctl.state().last_rule_id.as_deref(), Some("r1"));
        assert_eq!(ctl.state().last_match_signature.as_deref(), Some("generic|r1"));
        assert!(ctl.state().in_cooldown(Instant::now()));
        assert_matches!(
            rx.try_recv().unwrap(),
            AssistantEvent::SuggestReady { step: Some(1), ref rule_id, .. } if rule_id.as_deref() == Some("r1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn triggered_rule_is_not_refetched_until_route_change() {
        let (mut ctl, _renderer, _rx) = setup();
        accept(&mut ctl, &["r1"], two_step_batch());

        tokio::time::advance(COOLDOWN * 2).await;
        assert_eq!(ctl.on_match(&matched(&["r1"]), Instant::now()), None);

        ctl.reset_for_route();
        assert!(ctl.on_match(&matched(&["r1"]), Instant::now()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_blocks_same_signature_only() {
        let (mut ctl, _renderer, _rx) = setup();
        accept(&mut ctl, &["a", "r1"], two_step_batch());
        ctl.reset_for_route();

        assert_eq!(ctl.on_match(&matched(&["a", "r1"]), Instant::now()), None);
        let fetch = ctl.on_match(&matched(&["b", "r1"]), Instant::now()).unwrap();
        assert_eq!(fetch.signature, "b|r1");

        tokio::time::advance(COOLDOWN).await;
        assert!(ctl.on_match(&matched(&["a", "r1"]), Instant::now()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn new_rule_resets_choice_input() {
        let (mut ctl, _renderer, _rx) = setup();
        accept(&mut ctl, &["r1"], two_step_batch());
        ctl.state.choice_input = Map::from_iter([("size".to_owned(), json!("M"))]);

        let _ = ctl.on_match(&matched(&["r1"]), Instant::now());
        assert_eq!(ctl.choice_input().len(), 1, "same rule keeps input");

        let _ = ctl.on_match(&matched(&["r2"]), Instant::now());
        assert!(ctl.choice_input().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_does_not_mark_triggered() {
        let (mut ctl, renderer, mut rx) = setup();
        let fetch = ctl.on_match(&matched(&["r1"]), Instant::now()).unwrap();
        let err = RuntimeError::Cta("offline".into());
        ctl.on_first_batch(fetch, Err(err), Instant::now());

        assert!(ctl.state().triggered_rules.is_empty());
        assert_eq!(renderer.render_count(), 0);
        assert_matches!(rx.try_recv().unwrap(), AssistantEvent::Error { stage: ErrorStage::Suggest, .. });
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_clears_without_cooldown() {
        let (mut ctl, renderer, _rx) = setup();
        accept(&mut ctl, &["r1"], vec![]);
        assert!(renderer.current().is_none());
        assert!(!ctl.state().in_cooldown(Instant::now()));
        assert!(ctl.state().triggered_rules.contains("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn next_id_jumps_to_its_step() {
        let (mut ctl, renderer, _rx) = setup();
        accept(&mut ctl, &["r1"], two_step_batch());

        let cta = ctl.state().last_suggestions[0].primary_cta.clone().unwrap();
        let plan = ctl.plan_cta(cta);
        ctl.finish_cta(&plan, outcome(&ctl), Instant::now());

        assert_eq!(ctl.state().current_step, Some(3));
        assert_eq!(renderer.visible_ids(), vec!["s3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn next_close_clears_panel() {
        let (mut ctl, renderer, _rx) = setup();
        accept(&mut ctl, &["r1"], two_step_batch());

        let close: CtaSpec =
            serde_json::from_value(json!({"kind": "noop", "label": "Close", "nextClose": true})).unwrap();
        let plan = ctl.plan_cta(close);
        assert_eq!(plan.owner.as_ref().and_then(|s| s.id.as_deref()), Some("s3"));
        ctl.finish_cta(&plan, outcome(&ctl), Instant::now());

        assert!(renderer.current().is_none());
        assert_eq!(ctl.state().current_step, None);
    }

    #[tokio::test(start_paused = true)]
    async fn choose_batch_renders_from_its_minimum_step() {
        let (mut ctl, renderer, _rx) = setup();
        accept(&mut ctl, &["r1"], two_step_batch());

        let choose: CtaSpec = serde_json::from_value(
            json!({"kind": "choose", "label": "M", "payload": {"name": "size", "value": "M"}}),
        )
        .unwrap();
        let plan = ctl.plan_cta(choose);
        let done = CtaOutcome {
            input: Map::from_iter([("size".to_owned(), json!("M"))]),
            suggestions: Some(batch(json!([{"id": "n4", "meta": {"step": 4}}, {"id": "n5", "meta": {"step": 5}}]))),
            error: None,
        };
        ctl.finish_cta(&plan, done, Instant::now());

        assert_eq!(ctl.state().current_step, Some(4));
        assert_eq!(renderer.visible_ids(), vec!["n4"]);
        assert_eq!(ctl.choice_input()["size"], "M");
    }

    #[tokio::test(start_paused = true)]
    async fn cta_error_skips_advancement() {
        let (mut ctl, renderer, mut rx) = setup();
        accept(&mut ctl, &["r1"], two_step_batch());
        let _ = rx.try_recv();

        let cta = ctl.state().last_suggestions[0].primary_cta.clone().unwrap();
        let plan = ctl.plan_cta(cta);
        let failed = CtaOutcome {
            error: Some(RuntimeError::Cta("no element".into())),
            ..outcome(&ctl)
        };
        ctl.finish_cta(&plan, failed, Instant::now());

        assert_eq!(ctl.state().current_step, Some(1));
        assert_eq!(renderer.visible_ids(), vec!["s1"]);
        assert_matches!(rx.try_recv().unwrap(), AssistantEvent::Error { stage: ErrorStage::Cta, .. });
    }

    #[tokio::test(start_paused = true)]
    async fn renderer_panic_becomes_error_event() {
        struct Exploding;
        impl Renderer for Exploding {
            fn render(&self, _: u32, _: &[Suggestion]) -> crate::errors::Result<()> {
                panic!("bad template")
            }
            fn clear(&self) {}
        }

        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut ctl = FlowController::new(Arc::new(Exploding), bus, COOLDOWN);
        accept(&mut ctl, &["r1"], two_step_batch());

        assert_matches!(rx.try_recv().unwrap(), AssistantEvent::Error { stage: ErrorStage::Render, .. });
        assert!(!ctl.state().in_cooldown(Instant::now()));
    }
}
