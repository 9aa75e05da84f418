//! Step lookups over a suggestion batch.

use waypoint_core::suggestion::{CtaSpec, Suggestion};

/// Lowest step in the batch.
pub fn min_step(suggestions: &[Suggestion]) -> Option<u32> {
    suggestions.iter().map(Suggestion::step).min()
}

/// Suggestions of `step`, in batch order.
pub fn at_step(suggestions: &[Suggestion], step: u32) -> Vec<Suggestion> {
    suggestions
        .iter()
        .filter(|s| s.step() == step)
        .cloned()
        .collect()
}

/// Step of the suggestion with `id`.
pub fn step_of(suggestions: &[Suggestion], id: &str) -> Option<u32> {
    suggestions
        .iter()
        .find(|s| s.id.as_deref() == Some(id))
        .map(Suggestion::step)
}

/// Suggestion that owns `cta`. Visible steps are searched first so a CTA
/// repeated across steps resolves to the card the visitor saw.
pub fn owner_of<'a>(
    suggestions: &'a [Suggestion],
    cta: &CtaSpec,
    current_step: Option<u32>,
) -> Option<&'a Suggestion> {
    let visible = suggestions
        .iter()
        .filter(|s| Some(s.step()) == current_step)
        .find(|s| s.owns(cta));
    visible.or_else(|| suggestions.iter().find(|s| s.owns(cta)))
}
