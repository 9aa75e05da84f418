//! `AutoAssistant`: the builder, the host handle and the actor task.
//!
//! One tokio task owns every piece of state (focus index, counters, flow
//! state) and consumes three inputs: host commands, route changes and its
//! own timers. Network work runs in a single in-flight slot polled by the
//! same `select!` loop, so evaluations, suggestion fetches and CTA
//! pipelines never overlap:
//!
//! - a debounced evaluation that comes due while the slot is busy is dropped
//! - a CTA click that arrives while the slot is busy is queued
//! - a rule-list refetch after a route change waits for the slot

use std::collections::VecDeque;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use waypoint_client::{ApiClient, ApiError, AssistApi};
use waypoint_core::api::{EventEnvelope, MatchResult, RuleCheckRequest, SuggestGetRequest};
use waypoint_core::rules::RuleListItem;
use waypoint_core::suggestion::{CtaSpec, Suggestion};
use waypoint_core::{AssistantEvent, ErrorStage, EventKind};
use waypoint_dom::{Document, NodeId};
use waypoint_rules::RuleFocusIndex;
use waypoint_settings::AssistantSettings;

use crate::capture::{Capture, CaptureEngine, PageEvent};
use crate::errors::{Result, RuntimeError};
use crate::events::EventBus;
use crate::executor::CtaExecutor;
use crate::flow::{CtaContext, CtaOutcome, CtaPlan, FlowController, PendingFetch, run_pipeline};
use crate::listeners::{ListenerRegistry, ListenerSet};
use crate::navigation::{NavigationObserver, RouteChange};
use crate::render::{MemoryRenderer, Renderer};

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point.
#[derive(Debug)]
pub struct AutoAssistant;

impl AutoAssistant {
    /// Start configuring an assistant.
    #[must_use]
    pub fn builder(settings: AssistantSettings) -> AssistantBuilder {
        AssistantBuilder {
            settings,
            api: None,
            document: None,
            renderer: None,
            listeners: None,
            navigation: None,
            executor: None,
            bus: EventBus::new(),
        }
    }
}

/// Collects collaborators, then spawns the actor.
pub struct AssistantBuilder {
    settings: AssistantSettings,
    api: Option<Arc<dyn AssistApi>>,
    document: Option<Arc<dyn Document>>,
    renderer: Option<Arc<dyn Renderer>>,
    listeners: Option<Arc<dyn ListenerRegistry>>,
    navigation: Option<Arc<dyn NavigationObserver>>,
    executor: Option<Arc<dyn CtaExecutor>>,
    bus: EventBus,
}

impl AssistantBuilder {
    /// Backend. Defaults to an [`ApiClient`] built from the settings.
    #[must_use]
    pub fn api(mut self, api: Arc<dyn AssistApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Host page. Required.
    #[must_use]
    pub fn document(mut self, document: Arc<dyn Document>) -> Self {
        self.document = Some(document);
        self
    }

    /// Renderer. Defaults to a [`MemoryRenderer`].
    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Listener registry. Defaults to a [`ListenerSet`].
    #[must_use]
    pub fn listeners(mut self, listeners: Arc<dyn ListenerRegistry>) -> Self {
        self.listeners = Some(listeners);
        self
    }

    /// Route change source. Without one, route changes are not detected.
    #[must_use]
    pub fn navigation(mut self, navigation: Arc<dyn NavigationObserver>) -> Self {
        self.navigation = Some(navigation);
        self
    }

    /// Host CTA executor replacing the built-in handlers.
    #[must_use]
    pub fn cta_executor(mut self, executor: Arc<dyn CtaExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Register an event callback before anything is emitted.
    #[must_use]
    pub fn on_event(self, callback: impl Fn(&AssistantEvent) + Send + Sync + 'static) -> Self {
        self.bus.on(callback);
        self
    }

    /// Validate, spawn the actor and return its handle. Must be called from
    /// within a tokio runtime.
    pub fn start(self) -> Result<AssistantHandle> {
        self.settings.validate()?;
        let document = self
            .document
            .ok_or_else(|| RuntimeError::Config("a document is required".into()))?;
        let api = match self.api {
            Some(api) => api,
            None => Arc::new(ApiClient::new(&self.settings)?),
        };
        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(MemoryRenderer::new()));
        let listeners = self
            .listeners
            .unwrap_or_else(|| Arc::new(ListenerSet::new()));

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (route_tx, route_rx) = mpsc::unbounded_channel();
        if let Some(nav) = &self.navigation {
            nav.watch(route_tx.clone());
        }

        let cancel = CancellationToken::new();
        let flow = FlowController::new(
            renderer,
            self.bus.clone(),
            Duration::from_millis(self.settings.final_cooldown_ms),
        );
        let actor = Actor {
            capture: CaptureEngine::new(Duration::from_millis(self.settings.debounce_ms)),
            current_url: document.location(),
            settings: self.settings,
            api,
            doc: document,
            listeners,
            navigation: self.navigation,
            executor: self.executor,
            bus: self.bus.clone(),
            flow,
            slot: None,
            cta_queue: VecDeque::new(),
            refetch_pending: false,
            generation: 0,
            commands: command_rx,
            routes: route_rx,
            _route_tx: route_tx,
            cancel: cancel.clone(),
        };

        info!(site_id = %actor.settings.site_id, "assistant starting");
        let task = tokio::spawn(actor.run());
        Ok(AssistantHandle {
            tx: command_tx,
            bus: self.bus,
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
        })
    }
}

impl std::fmt::Debug for AssistantBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantBuilder")
            .field("site_id", &self.settings.site_id)
            .field("has_document", &self.document.is_some())
            .field("has_navigation", &self.navigation.is_some())
            .field("has_executor", &self.executor.is_some())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Point-in-time view of a running assistant.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantStatus {
    /// Whether an index is installed for the current page.
    pub ready: bool,
    /// Kinds being captured.
    pub allowed_kinds: Vec<EventKind>,
    /// Whether the permissive fallback is in effect.
    pub fallback: bool,
    /// Whether the in-flight slot is occupied.
    pub busy: bool,
    /// CTA clicks waiting for the slot.
    pub queued_ctas: usize,
    /// Step on screen.
    pub current_step: Option<u32>,
    /// Ids of the suggestions on screen.
    pub visible: Vec<String>,
    /// Rules fetched on this page view.
    pub triggered_rules: Vec<String>,
    /// Whether the post-render cooldown holds.
    pub in_cooldown: bool,
    /// URL of the current page view.
    pub url: String,
}

enum Command {
    Page(PageEvent),
    Cta(CtaSpec),
    Status(oneshot::Sender<AssistantStatus>),
}

/// Host-side handle. Cheap to clone; dropping every clone stops the
/// assistant.
#[derive(Clone)]
pub struct AssistantHandle {
    tx: mpsc::UnboundedSender<Command>,
    bus: EventBus,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AssistantHandle {
    /// Forward a page interaction.
    pub fn page_event(&self, event: PageEvent) -> Result<()> {
        self.tx
            .send(Command::Page(event))
            .map_err(|_| RuntimeError::Stopped)
    }

    /// Execute a CTA the renderer was given.
    pub fn click_cta(&self, cta: CtaSpec) -> Result<()> {
        self.tx
            .send(Command::Cta(cta))
            .map_err(|_| RuntimeError::Stopped)
    }

    /// Receive events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AssistantEvent> {
        self.bus.subscribe()
    }

    /// Register an event callback.
    pub fn on_event(&self, callback: impl Fn(&AssistantEvent) + Send + Sync + 'static) {
        self.bus.on(callback);
    }

    /// Current status.
    pub async fn status(&self) -> Result<AssistantStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Status(tx))
            .map_err(|_| RuntimeError::Stopped)?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    /// Whether `stop` has been requested.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the assistant and wait for its task. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "assistant task ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for AssistantHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantHandle")
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

enum Completion {
    Rules {
        generation: u64,
        initial: bool,
        result: std::result::Result<Vec<RuleListItem>, ApiError>,
    },
    Check {
        generation: u64,
        kind: EventKind,
        result: std::result::Result<MatchResult, ApiError>,
    },
    Fetch {
        generation: u64,
        fetch: PendingFetch,
        result: std::result::Result<Vec<Suggestion>, ApiError>,
    },
    Cta {
        plan: CtaPlan,
        outcome: CtaOutcome,
    },
}

type Slot = Option<BoxFuture<'static, Completion>>;

/// Detaches host wiring however the actor exits, panics included.
struct ShutdownGuard {
    listeners: Arc<dyn ListenerRegistry>,
    navigation: Option<Arc<dyn NavigationObserver>>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.listeners.detach_all();
        if let Some(nav) = &self.navigation {
            nav.unwatch();
        }
        info!("assistant stopped");
    }
}

struct Actor {
    settings: AssistantSettings,
    api: Arc<dyn AssistApi>,
    doc: Arc<dyn Document>,
    listeners: Arc<dyn ListenerRegistry>,
    navigation: Option<Arc<dyn NavigationObserver>>,
    executor: Option<Arc<dyn CtaExecutor>>,
    bus: EventBus,
    capture: CaptureEngine,
    flow: FlowController,
    slot: Slot,
    cta_queue: VecDeque<CtaSpec>,
    refetch_pending: bool,
    generation: u64,
    current_url: String,
    commands: mpsc::UnboundedReceiver<Command>,
    routes: mpsc::UnboundedReceiver<RouteChange>,
    _route_tx: mpsc::UnboundedSender<RouteChange>,
    cancel: CancellationToken,
}

async fn poll_slot(slot: &mut Slot) -> Completion {
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

impl Actor {
    async fn run(mut self) {
        let _guard = ShutdownGuard {
            listeners: Arc::clone(&self.listeners),
            navigation: self.navigation.clone(),
        };
        self.start_rules(true);

        loop {
            let debounce_at = self.capture.debounce_deadline();
            let time_at = self.capture.time_deadline();
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                completion = poll_slot(&mut self.slot) => {
                    self.slot = None;
                    self.on_completion(completion);
                    self.drain();
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(route) = self.routes.recv() => self.on_route(route),
                () = sleep_opt(debounce_at) => self.on_debounce(),
                () = sleep_opt(time_at) => self.on_time_tick(),
            }
        }
        self.cancel.cancel();
    }

    fn busy(&self) -> bool {
        self.slot.is_some()
    }

    // ── Inputs ──────────────────────────────────────────────────────────────

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Page(event) => {
                let _ = self
                    .capture
                    .on_page_event(event, self.doc.as_ref(), Instant::now());
            }
            Command::Cta(cta) => {
                if self.busy() || self.refetch_pending {
                    debug!(label = %cta.label, "slot busy, CTA queued");
                    self.cta_queue.push_back(cta);
                } else {
                    self.start_cta(cta);
                }
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn on_route(&mut self, route: RouteChange) {
        if route.url == self.current_url {
            debug!(url = %route.url, "route unchanged");
            return;
        }
        info!(from = %self.current_url, to = %route.url, cause = ?route.cause, "route changed");
        self.current_url = route.url;
        self.generation += 1;
        self.capture.reset_page();
        self.flow.reset_for_route();
        if self.busy() {
            self.refetch_pending = true;
        } else {
            self.start_rules(false);
        }
    }

    fn on_debounce(&mut self) {
        let Some(capture) = self.capture.take_due(Instant::now()) else {
            return;
        };
        if self.busy() {
            debug!(kind = %capture.kind, "evaluation in flight, capture dropped");
            return;
        }
        self.start_check(capture);
    }

    fn on_time_tick(&mut self) {
        let busy = self.busy();
        if let Some(capture) = self
            .capture
            .time_tick(Instant::now(), self.doc.as_ref(), busy)
        {
            self.start_check(capture);
        }
    }

    // ── Jobs ────────────────────────────────────────────────────────────────

    fn start_rules(&mut self, initial: bool) {
        self.refetch_pending = false;
        let api = Arc::clone(&self.api);
        let site_id = self.settings.site_id.clone();
        let generation = self.generation;
        self.slot = Some(
            async move {
                let result = api.list_rules(&site_id).await;
                Completion::Rules {
                    generation,
                    initial,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn start_check(&mut self, capture: Capture) {
        let telemetry = self.capture.telemetry(self.doc.as_ref(), &capture);
        let request = RuleCheckRequest {
            site_id: self.settings.site_id.clone(),
            session_id: self.settings.session_id.clone(),
            event: EventEnvelope::now(capture.kind, telemetry),
            context: self.settings.base_context.clone(),
        };
        debug!(kind = %capture.kind, "evaluating");
        let api = Arc::clone(&self.api);
        let generation = self.generation;
        let kind = capture.kind;
        self.slot = Some(
            async move {
                let result = api.check_rule(&request).await;
                Completion::Check {
                    generation,
                    kind,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn start_fetch(&mut self, fetch: PendingFetch) {
        let request = SuggestGetRequest {
            site_id: self.settings.site_id.clone(),
            url: self.doc.location(),
            rule_id: fetch.rule_id.clone(),
        };
        let api = Arc::clone(&self.api);
        let generation = self.generation;
        self.slot = Some(
            async move {
                let result = api.fetch_suggestions(&request).await;
                Completion::Fetch {
                    generation,
                    fetch,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn start_cta(&mut self, cta: CtaSpec) {
        let plan = self.flow.plan_cta(cta);
        let ctx = CtaContext {
            doc: Arc::clone(&self.doc),
            navigation: self.navigation.clone(),
            api: Arc::clone(&self.api),
            executor: self.executor.clone(),
            site_id: self.settings.site_id.clone(),
            rule_id: self.flow.active_rule().map(str::to_owned),
        };
        let input = self.flow.choice_input().clone();
        debug!(kind = plan.clicked.kind.as_str(), steps = plan.steps.len(), "executing CTA");
        self.slot = Some(
            async move {
                let outcome = run_pipeline(ctx, plan.clone(), input).await;
                Completion::Cta { plan, outcome }
            }
            .boxed(),
        );
    }

    /// Start deferred work once the slot frees: a route refetch first, then
    /// queued CTAs in click order.
    fn drain(&mut self) {
        if self.busy() {
            return;
        }
        if self.refetch_pending {
            self.start_rules(false);
        } else if let Some(cta) = self.cta_queue.pop_front() {
            self.start_cta(cta);
        }
    }

    // ── Completions ─────────────────────────────────────────────────────────

    fn on_completion(&mut self, completion: Completion) {
        let now = Instant::now();
        match completion {
            Completion::Rules {
                generation,
                initial,
                result,
            } => {
                if generation != self.generation {
                    debug!(initial, "stale rule list discarded");
                    return;
                }
                self.install_rules(initial, result);
            }
            Completion::Check {
                generation,
                kind,
                result,
            } => {
                if generation != self.generation {
                    debug!(kind = %kind, "stale rule check discarded");
                    return;
                }
                match result {
                    Ok(result) => {
                        info!(
                            kind = %kind,
                            should_proceed = result.should_proceed,
                            matched = ?result.matched_rule_ids,
                            "rule checked"
                        );
                        self.bus.emit(&AssistantEvent::RuleChecked {
                            event_kind: kind,
                            should_proceed: result.should_proceed,
                            matched_rules: result.matched_rule_ids.clone(),
                            reason: result.reason.clone(),
                        });
                        if let Some(fetch) = self.flow.on_match(&result, now) {
                            self.start_fetch(fetch);
                        }
                    }
                    Err(e) => {
                        warn!(kind = %kind, error = %e, "rule check failed");
                        self.bus
                            .emit(&AssistantEvent::error(ErrorStage::RuleCheck, e.to_string()));
                    }
                }
            }
            Completion::Fetch {
                generation,
                fetch,
                result,
            } => {
                if generation != self.generation {
                    debug!(rule_id = %fetch.rule_id, "stale suggestion fetch discarded");
                    return;
                }
                self.flow
                    .on_first_batch(fetch, result.map_err(RuntimeError::from), now);
            }
            Completion::Cta { plan, outcome } => self.flow.finish_cta(&plan, outcome, now),
        }
    }

    fn install_rules(
        &mut self,
        initial: bool,
        result: std::result::Result<Vec<RuleListItem>, ApiError>,
    ) {
        let (index, rule_count) = match result {
            Ok(rules) => (RuleFocusIndex::build(&rules), rules.len()),
            Err(e) => {
                warn!(error = %e, "rule list unavailable, using permissive fallback");
                self.bus
                    .emit(&AssistantEvent::error(ErrorStage::Rules, e.to_string()));
                (RuleFocusIndex::permissive(), 0)
            }
        };
        let allowed = index.allowed_kinds();
        let listener_kinds: Vec<EventKind> = allowed
            .iter()
            .copied()
            .filter(|k| k.is_listener_driven())
            .collect();
        let fallback = index.is_fallback();

        self.capture.install_index(index);
        self.listeners.attach(&listener_kinds);
        self.listeners
            .observe_mutations(self.capture.mutation_scope());
        self.bus.emit(&AssistantEvent::RuleReady {
            allowed_kinds: allowed,
            rule_count,
            fallback,
        });

        let now = Instant::now();
        let doc = Arc::clone(&self.doc);
        if initial {
            let target = self.focus_target();
            let _ = self
                .capture
                .schedule(EventKind::PageLoad, target, doc.as_ref(), now);
        } else {
            let _ = self
                .capture
                .schedule(EventKind::RouteChange, None, doc.as_ref(), now);
        }
    }

    fn focus_target(&self) -> Option<NodeId> {
        if let Some(selector) = self.settings.focus_selector.as_deref() {
            match self.doc.query_selector(selector) {
                Ok(Some(node)) => return Some(node),
                Ok(None) => debug!(selector, "focus element not found, using body"),
                Err(e) => warn!(selector, error = %e, "invalid focus selector, using body"),
            }
        }
        self.doc.body()
    }

    fn status(&self) -> AssistantStatus {
        let index = self.capture.index();
        let state = self.flow.state();
        let visible = state
            .current_step
            .map(|step| {
                state
                    .last_suggestions
                    .iter()
                    .filter(|s| s.step() == step)
                    .filter_map(|s| s.id.clone())
                    .collect()
            })
            .unwrap_or_default();
        AssistantStatus {
            ready: self.capture.is_ready(),
            allowed_kinds: if self.capture.is_ready() {
                index.allowed_kinds()
            } else {
                Vec::new()
            },
            fallback: index.is_fallback(),
            busy: self.busy(),
            queued_ctas: self.cta_queue.len(),
            current_step: state.current_step,
            visible,
            triggered_rules: state.triggered_rules.iter().cloned().collect(),
            in_cooldown: state.in_cooldown(Instant::now()),
            url: self.current_url.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
