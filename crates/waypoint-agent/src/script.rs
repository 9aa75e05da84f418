//! Scripted visitor sessions.
//!
//! A script is a JSON array of steps, each a single-key object:
//!
//! ```json
//! [
//!   {"wait": 500},
//!   {"click": "#add-to-cart"},
//!   {"input": {"selector": "#email", "value": "a@b.test"}},
//!   {"scroll": 60},
//!   {"cta": "Apply coupon"},
//!   {"navigate": "/cart"}
//! ]
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, info};
use waypoint_dom::{Document, MemoryDocument, NodeId};
use waypoint_runtime::{AssistantHandle, HistoryNavigation, MemoryRenderer, PageEvent};

/// One scripted visitor action.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    /// Pause for this many milliseconds.
    Wait(u64),
    /// Click the first element matching a selector.
    Click(String),
    /// Set a form control's value.
    Input {
        /// Control selector.
        selector: String,
        /// New value.
        value: String,
    },
    /// Submit the form matching a selector.
    Submit(String),
    /// Replace an element's text, as a host mutation observer would see it.
    Mutate {
        /// Element selector.
        selector: String,
        /// New text content.
        text: String,
    },
    /// Scroll to a depth percentage.
    Scroll(f64),
    /// `pushState` to a URL.
    Navigate(String),
    /// Back/forward to a URL.
    Pop(String),
    /// Click the rendered CTA with this label.
    Cta(String),
}

/// Read a script file.
pub fn load_script(path: &Path) -> Result<Vec<Step>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse script: {}", path.display()))
}

/// Plays steps against a page and a running assistant.
pub struct Replay {
    /// Page under test.
    pub doc: Arc<MemoryDocument>,
    /// History adapter the assistant watches.
    pub nav: Arc<HistoryNavigation>,
    /// Renderer the assistant draws into.
    pub renderer: Arc<MemoryRenderer>,
    /// Running assistant.
    pub handle: AssistantHandle,
}

impl Replay {
    /// Apply every step in order.
    pub async fn run(&self, steps: &[Step]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            debug!(index = i, ?step, "replay step");
            self.apply(step)
                .await
                .with_context(|| format!("step {i} failed"))?;
        }
        Ok(())
    }

    /// Apply one step.
    pub async fn apply(&self, step: &Step) -> Result<()> {
        match step {
            Step::Wait(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
            Step::Click(selector) => {
                let target = self.find(selector)?;
                self.handle.page_event(PageEvent::Click {
                    target: Some(target),
                })?;
            }
            Step::Input { selector, value } => {
                let target = self.find(selector)?;
                self.doc.set_form_value(target, value)?;
                self.handle.page_event(PageEvent::Input { target })?;
            }
            Step::Submit(selector) => {
                let target = self.find(selector)?;
                self.handle.page_event(PageEvent::Submit {
                    target: Some(target),
                })?;
            }
            Step::Mutate { selector, text } => {
                let target = self.find(selector)?;
                self.doc.set_text(target, text)?;
                self.handle.page_event(PageEvent::Mutation { target })?;
            }
            Step::Scroll(depth) => {
                self.handle.page_event(PageEvent::Scroll {
                    depth_percent: *depth,
                })?;
            }
            Step::Navigate(url) => self.nav.push_state(url)?,
            Step::Pop(url) => {
                self.doc.set_location(url);
                self.nav.pop_state();
            }
            Step::Cta(label) => {
                let frame = self
                    .renderer
                    .current()
                    .context("no suggestions on screen")?;
                let Some(cta) = frame
                    .suggestions
                    .iter()
                    .flat_map(|s| s.clickable_ctas())
                    .find(|c| c.label == *label)
                else {
                    bail!("no rendered CTA labelled {label:?}");
                };
                info!(label = %label, kind = cta.kind.as_str(), "clicking CTA");
                self.handle.click_cta(cta.clone())?;
            }
        }
        Ok(())
    }

    fn find(&self, selector: &str) -> Result<NodeId> {
        self.doc
            .query_selector(selector)?
            .with_context(|| format!("no element matches {selector}"))
    }
}
