//! Conversation state owned by the flow controller.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tokio::time::Instant;
use waypoint_core::suggestion::Suggestion;

/// Everything the controller remembers between events.
#[derive(Clone, Debug, Default)]
pub struct FlowState {
    /// Suggestions of the latest batch; replaced wholesale.
    pub last_suggestions: Vec<Suggestion>,
    /// Step being shown, `None` when the panel is closed.
    pub current_step: Option<u32>,
    /// Rule that produced the latest batch.
    pub last_rule_id: Option<String>,
    /// `matchedRules.join('|')` of the latest accepted match.
    pub last_match_signature: Option<String>,
    /// Rules already fetched on this page view.
    pub triggered_rules: BTreeSet<String>,
    /// Cumulative `choose` input for the current rule.
    pub choice_input: Map<String, Value>,
    /// End of the post-render quiet period.
    pub cooldown_until: Option<Instant>,
}

impl FlowState {
    /// Whether the panel is in its post-render cooldown at `now`.
    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Replace the batch. Nothing else about the flow changes.
    pub fn replace_suggestions(&mut self, suggestions: Vec<Suggestion>) {
        self.last_suggestions = suggestions;
    }

    /// Forget the visible panel.
    pub fn close(&mut self) {
        self.last_suggestions.clear();
        self.current_step = None;
    }

    /// Per-page reset on route change. The rendered panel and its cooldown
    /// survive; a rule may trigger again.
    pub fn reset_for_route(&mut self) {
        self.triggered_rules.clear();
        self.choice_input.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn cooldown_expires() {
        let mut state = FlowState::default();
        assert!(!state.in_cooldown(Instant::now()));
        state.cooldown_until = Some(Instant::now() + Duration::from_secs(30));
        assert!(state.in_cooldown(Instant::now()));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!state.in_cooldown(Instant::now()));
    }

    #[test]
    fn route_reset_keeps_panel() {
        let mut state = FlowState {
            current_step: Some(2),
            last_rule_id: Some("r".into()),
            ..FlowState::default()
        };
        let _ = state.triggered_rules.insert("r".into());
        let _ = state.choice_input.insert("size".into(), "M".into());
        state.reset_for_route();
        assert!(state.triggered_rules.is_empty());
        assert!(state.choice_input.is_empty());
        assert_eq!(state.current_step, Some(2));
    }
}
