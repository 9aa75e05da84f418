//! Host override for CTA handlers.

use async_trait::async_trait;
use waypoint_core::suggestion::{CtaSpec, Suggestion};

use crate::errors::Result;

/// Replaces the built-in CTA handlers.
///
/// A click is flattened into a pipeline before anything runs: the owner's
/// `primaryActions` when the clicked CTA is its `primaryCta`, otherwise the
/// clicked CTA followed by its `run` entries, depth first. `execute` is
/// called once per pipeline step, not once per click, and each step arrives
/// with its `run` list already emptied. The first error stops the pipeline.
///
/// `choose` steps reach the executor too; the built-in `/suggest/next` call
/// only happens without one. Step advancement (`nextId`, `nextStep`,
/// `nextClose`) is applied by the assistant once the pipeline finishes.
#[async_trait]
pub trait CtaExecutor: Send + Sync {
    /// Execute one pipeline step. `owner` is the suggestion the clicked CTA
    /// belongs to, when known, and is the same for every step of a click.
    async fn execute(&self, cta: &CtaSpec, owner: Option<&Suggestion>) -> Result<()>;
}
