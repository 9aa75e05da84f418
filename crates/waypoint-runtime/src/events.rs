//! Fan-out of [`AssistantEvent`]s to the host.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use waypoint_core::AssistantEvent;

const CHANNEL_CAPACITY: usize = 64;

type Callback = Arc<dyn Fn(&AssistantEvent) + Send + Sync>;

/// Broadcast channel plus synchronous callbacks.
///
/// Callbacks run on the assistant task. A panicking callback is logged and
/// skipped; the remaining callbacks and the assistant keep running.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AssistantEvent>,
    callbacks: Arc<Mutex<Vec<Callback>>>,
}

impl EventBus {
    /// Empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            callbacks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// New receiver for events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AssistantEvent> {
        self.tx.subscribe()
    }

    /// Register a callback.
    pub fn on(&self, callback: impl Fn(&AssistantEvent) + Send + Sync + 'static) {
        self.callbacks.lock().push(Arc::new(callback));
    }

    /// Deliver `event` to every callback and subscriber.
    pub fn emit(&self, event: &AssistantEvent) {
        debug!(event = event.name(), "emit");
        let callbacks: Vec<Callback> = self.callbacks.lock().clone();
        for (index, callback) in callbacks.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!(event = event.name(), index, "event callback panicked");
            }
        }
        // No receivers is fine.
        let _ = self.tx.send(event.clone());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.tx.receiver_count())
            .field("callbacks", &self.callbacks.lock().len())
            .finish()
    }
}
