//! CTA pipelines and the built-in handlers.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use waypoint_client::AssistApi;
use waypoint_core::api::SuggestNextRequest;
use waypoint_core::suggestion::{CtaKind, CtaSpec, Suggestion};
use waypoint_dom::{DomEventKind, Document};

use crate::errors::{Result, RuntimeError};
use crate::executor::CtaExecutor;
use crate::navigation::NavigationObserver;

use super::steps::owner_of;

/// What a click resolves to.
#[derive(Clone, Debug)]
pub struct CtaPlan {
    /// The clicked CTA; its advancement fields drive the flow afterwards.
    pub clicked: CtaSpec,
    /// Owning suggestion, when the CTA belongs to the current batch.
    pub owner: Option<Suggestion>,
    /// Handlers to run, in order, with every `run` sub-pipeline expanded.
    pub steps: Vec<CtaSpec>,
}

impl CtaPlan {
    /// Resolve `clicked` against the current batch.
    ///
    /// The owner's `primaryActions` replace the default handler when the
    /// clicked CTA is its `primaryCta`. Otherwise the CTA's own handler runs,
    /// followed by its `run` pipeline.
    pub fn resolve(clicked: CtaSpec, suggestions: &[Suggestion], current_step: Option<u32>) -> Self {
        let owner = owner_of(suggestions, &clicked, current_step).cloned();
        let mut steps = Vec::new();
        match &owner {
            Some(card) if card.runs_pipeline_for(&clicked) => {
                for action in &card.primary_actions {
                    flatten(action, &mut steps);
                }
            }
            _ => flatten(&clicked, &mut steps),
        }
        if owner.is_none() {
            warn!(kind = clicked.kind.as_str(), label = %clicked.label, "CTA not in current suggestions");
        }
        Self {
            clicked,
            owner,
            steps,
        }
    }
}

fn flatten(spec: &CtaSpec, out: &mut Vec<CtaSpec>) {
    let mut own = spec.clone();
    own.run.clear();
    out.push(own);
    for sub in &spec.run {
        flatten(sub, out);
    }
}

/// Collaborators a pipeline needs. Cheap to clone into a task.
#[derive(Clone)]
pub struct CtaContext {
    /// Host page.
    pub doc: Arc<dyn Document>,
    /// In-page navigation, when the host has one.
    pub navigation: Option<Arc<dyn NavigationObserver>>,
    /// Backend for `choose`.
    pub api: Arc<dyn AssistApi>,
    /// Host override for every handler.
    pub executor: Option<Arc<dyn CtaExecutor>>,
    /// Site id for `/suggest/next`.
    pub site_id: String,
    /// Rule driving the flow.
    pub rule_id: Option<String>,
}

/// Result of a pipeline run.
#[derive(Debug, Default)]
pub struct CtaOutcome {
    /// Choice input after every `choose` that ran.
    pub input: Map<String, Value>,
    /// Batch returned by the last `choose`, if one ran.
    pub suggestions: Option<Vec<Suggestion>>,
    /// First failure; later steps were skipped.
    pub error: Option<RuntimeError>,
}

/// Run `plan` to completion or first failure.
pub async fn run_pipeline(ctx: CtaContext, plan: CtaPlan, input: Map<String, Value>) -> CtaOutcome {
    let mut outcome = CtaOutcome {
        input,
        ..CtaOutcome::default()
    };
    for step in &plan.steps {
        let result = match &ctx.executor {
            Some(executor) => executor.execute(step, plan.owner.as_ref()).await,
            None if step.kind == CtaKind::Choose => {
                match choose(&ctx, step, &mut outcome.input).await {
                    Ok(Some(batch)) => {
                        outcome.suggestions = Some(batch);
                        Ok(())
                    }
                    Ok(None) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            None => run_builtin(&ctx, step),
        };
        if let Err(e) = result {
            warn!(kind = step.kind.as_str(), label = %step.label, error = %e, "CTA step failed");
            outcome.error = Some(e);
            break;
        }
    }
    outcome
}

/// Built-in handler for every kind except `choose`.
pub fn run_builtin(ctx: &CtaContext, cta: &CtaSpec) -> Result<()> {
    let doc = ctx.doc.as_ref();
    match &cta.kind {
        CtaKind::DomFill => {
            let node = select(doc, cta)?;
            let value = payload_value(cta).unwrap_or_default();
            doc.set_form_value(node, &value)?;
            doc.dispatch(node, DomEventKind::Input)?;
            doc.dispatch(node, DomEventKind::Change)?;
            debug!(node = %node, "dom_fill");
            Ok(())
        }
        CtaKind::Click => {
            let node = select(doc, cta)?;
            doc.dispatch(node, DomEventKind::Click)?;
            debug!(node = %node, "click");
            Ok(())
        }
        CtaKind::Open => {
            let url = destination(cta)?;
            info!(url, "open");
            Ok(doc.navigate(url, cta.target.as_deref())?)
        }
        CtaKind::Link => {
            let url = destination(cta)?;
            info!(url, target = ?cta.target, "link");
            Ok(doc.navigate(url, cta.target.as_deref())?)
        }
        CtaKind::Route => {
            let url = cta
                .route_target()
                .ok_or_else(|| RuntimeError::Cta("route CTA without a route".into()))?;
            info!(url, "route");
            match &ctx.navigation {
                Some(nav) => nav.route_to(url),
                None => Ok(doc.navigate(url, None)?),
            }
        }
        CtaKind::Noop => Ok(()),
        CtaKind::Choose => Err(RuntimeError::Cta("choose runs through the pipeline".into())),
        CtaKind::Other(kind) => {
            warn!(kind = %kind, "unsupported CTA kind ignored");
            Ok(())
        }
    }
}

/// Merge the choice into `input` and fetch the next batch.
///
/// `{name, value}` payloads set one key; any other object is merged as is.
/// A non-object payload is ignored.
async fn choose(
    ctx: &CtaContext,
    cta: &CtaSpec,
    input: &mut Map<String, Value>,
) -> Result<Option<Vec<Suggestion>>> {
    let Some(Value::Object(payload)) = &cta.payload else {
        warn!(label = %cta.label, "choose without an object payload ignored");
        return Ok(None);
    };
    match payload.get("name").and_then(Value::as_str) {
        Some(name) => {
            let value = payload.get("value").cloned().unwrap_or(Value::Null);
            let _ = input.insert(name.to_owned(), value);
        }
        None => {
            for (key, value) in payload {
                let _ = input.insert(key.clone(), value.clone());
            }
        }
    }

    let rule_id = ctx
        .rule_id
        .clone()
        .ok_or_else(|| RuntimeError::Cta("choose without an active rule".into()))?;
    let request = SuggestNextRequest {
        site_id: ctx.site_id.clone(),
        url: ctx.doc.location(),
        rule_id,
        input: input.clone(),
    };
    let batch = ctx.api.next_suggestions(&request).await?;
    info!(count = batch.len(), keys = input.len(), "choice recorded");
    Ok(Some(batch))
}

fn select(doc: &dyn Document, cta: &CtaSpec) -> Result<waypoint_dom::NodeId> {
    let selector = cta
        .payload_str("selector")
        .ok_or_else(|| RuntimeError::Cta(format!("{} CTA without a selector", cta.kind.as_str())))?;
    doc.query_selector(selector)?
        .ok_or_else(|| RuntimeError::Cta(format!("no element matches {selector}")))
}

fn payload_value(cta: &CtaSpec) -> Option<String> {
    match cta.payload.as_ref()?.get("value")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn destination(cta: &CtaSpec) -> Result<&str> {
    cta.destination()
        .ok_or_else(|| RuntimeError::Cta(format!("{} CTA without a url", cta.kind.as_str())))
}
