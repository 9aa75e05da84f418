//! The rendering seam.

use parking_lot::Mutex;
use waypoint_core::suggestion::Suggestion;

use crate::errors::Result;

/// Draws suggestion cards. Visual design is entirely the host's.
///
/// The renderer receives only the active step. Clicks come back through
/// [`AssistantHandle::click_cta`](crate::AssistantHandle::click_cta) with the
/// same `CtaSpec` value it was given.
pub trait Renderer: Send + Sync {
    /// Show `suggestions`, all belonging to `step`, replacing whatever is
    /// shown.
    fn render(&self, step: u32, suggestions: &[Suggestion]) -> Result<()>;

    /// Hide the panel.
    fn clear(&self);
}

/// Last frame drawn by a [`MemoryRenderer`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    /// Rendered step.
    pub step: u32,
    /// Rendered suggestions.
    pub suggestions: Vec<Suggestion>,
}

/// Renderer that keeps what it was asked to draw.
#[derive(Debug, Default)]
pub struct MemoryRenderer {
    current: Mutex<Option<Frame>>,
    renders: Mutex<usize>,
}

impl MemoryRenderer {
    /// Empty renderer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// What is on screen, if anything.
    pub fn current(&self) -> Option<Frame> {
        self.current.lock().clone()
    }

    /// Ids of the visible suggestions.
    pub fn visible_ids(&self) -> Vec<String> {
        self.current
            .lock()
            .as_ref()
            .map(|frame| frame.suggestions.iter().filter_map(|s| s.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of `render` calls so far.
    pub fn render_count(&self) -> usize {
        *self.renders.lock()
    }
}

impl Renderer for MemoryRenderer {
    fn render(&self, step: u32, suggestions: &[Suggestion]) -> Result<()> {
        *self.current.lock() = Some(Frame {
            step,
            suggestions: suggestions.to_vec(),
        });
        *self.renders.lock() += 1;
        Ok(())
    }

    fn clear(&self) {
        *self.current.lock() = None;
    }
}
