//! The listener seam.
//!
//! The assistant cannot attach DOM listeners itself. It tells a
//! [`ListenerRegistry`] which kinds it wants and the host forwards matching
//! interactions as [`PageEvent`](crate::PageEvent)s.

use parking_lot::Mutex;
use waypoint_core::EventKind;

use crate::capture::MutationScope;

/// Host-side listener management.
pub trait ListenerRegistry: Send + Sync {
    /// Listen for exactly `kinds`, dropping any previous set. Only
    /// listener-driven kinds are passed.
    fn attach(&self, kinds: &[EventKind]);

    /// Observe text/value mutations inside `scope`, or stop observing when
    /// `None`.
    fn observe_mutations(&self, scope: Option<&MutationScope>);

    /// Remove every listener and observer.
    fn detach_all(&self);
}

#[derive(Debug, Default)]
struct Wiring {
    kinds: Vec<EventKind>,
    scope: Option<MutationScope>,
    detached: bool,
}

/// Registry that records the requested wiring. Used headless, where the
/// host (or a script) decides what to forward by reading it back.
#[derive(Debug, Default)]
pub struct ListenerSet {
    wiring: Mutex<Wiring>,
}

impl ListenerSet {
    /// Nothing attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently attached kinds.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.wiring.lock().kinds.clone()
    }

    /// Whether `kind` is attached.
    pub fn is_listening(&self, kind: EventKind) -> bool {
        self.wiring.lock().kinds.contains(&kind)
    }

    /// Current mutation scope.
    pub fn mutation_scope(&self) -> Option<MutationScope> {
        self.wiring.lock().scope.clone()
    }

    /// Whether `detach_all` ran after the last `attach`.
    pub fn is_detached(&self) -> bool {
        self.wiring.lock().detached
    }
}

impl ListenerRegistry for ListenerSet {
    fn attach(&self, kinds: &[EventKind]) {
        let mut wiring = self.wiring.lock();
        wiring.kinds = kinds.to_vec();
        wiring.detached = false;
    }

    fn observe_mutations(&self, scope: Option<&MutationScope>) {
        self.wiring.lock().scope = scope.cloned();
    }

    fn detach_all(&self) {
        let mut wiring = self.wiring.lock();
        wiring.kinds.clear();
        wiring.scope = None;
        wiring.detached = true;
    }
}
