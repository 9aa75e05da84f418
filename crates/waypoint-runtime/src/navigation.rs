//! In-page navigation.
//!
//! Single-page hosts change routes through the history API without a page
//! load. [`HistoryNavigation`] wraps a [`HistoryBackend`] so every push,
//! replace and back/forward step is reported to the assistant; it is the
//! only place that intercepts history calls.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use waypoint_dom::{Document, MemoryDocument};

use crate::errors::Result;

/// How the route changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteCause {
    /// `pushState`
    Push,
    /// `replaceState`
    Replace,
    /// Back/forward (`popstate`).
    Pop,
}

/// A reported route change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteChange {
    /// URL after the change.
    pub url: String,
    /// What caused it.
    pub cause: RouteCause,
}

/// The host's history API.
pub trait HistoryBackend: Send + Sync {
    /// Current URL.
    fn current_url(&self) -> String;

    /// Add a history entry and move to `url`.
    fn push_state(&self, url: &str) -> waypoint_dom::Result<()>;

    /// Replace the current entry with `url`.
    fn replace_state(&self, url: &str) -> waypoint_dom::Result<()>;
}

impl HistoryBackend for MemoryDocument {
    fn current_url(&self) -> String {
        self.location()
    }

    fn push_state(&self, url: &str) -> waypoint_dom::Result<()> {
        self.set_location(url);
        Ok(())
    }

    fn replace_state(&self, url: &str) -> waypoint_dom::Result<()> {
        self.set_location(url);
        Ok(())
    }
}

/// Source of route changes the assistant subscribes to.
pub trait NavigationObserver: Send + Sync {
    /// Start reporting route changes to `tx`.
    fn watch(&self, tx: mpsc::UnboundedSender<RouteChange>);

    /// Stop reporting. Idempotent.
    fn unwatch(&self);

    /// Navigate in-page to `url`, reporting it like any other push.
    fn route_to(&self, url: &str) -> Result<()>;
}

/// [`NavigationObserver`] over a [`HistoryBackend`].
///
/// Hosts route their own `pushState`/`replaceState` calls through
/// [`push_state`](Self::push_state)/[`replace_state`](Self::replace_state)
/// and call [`pop_state`](Self::pop_state) from their `popstate` handler.
pub struct HistoryNavigation {
    backend: Arc<dyn HistoryBackend>,
    tx: Mutex<Option<mpsc::UnboundedSender<RouteChange>>>,
}

impl HistoryNavigation {
    /// Wrap `backend`. Nothing is reported until [`watch`](NavigationObserver::watch).
    #[must_use]
    pub fn new(backend: Arc<dyn HistoryBackend>) -> Self {
        Self {
            backend,
            tx: Mutex::new(None),
        }
    }

    /// Push `url` and report it.
    pub fn push_state(&self, url: &str) -> Result<()> {
        self.backend.push_state(url)?;
        self.notify(RouteCause::Push);
        Ok(())
    }

    /// Replace the current entry with `url` and report it.
    pub fn replace_state(&self, url: &str) -> Result<()> {
        self.backend.replace_state(url)?;
        self.notify(RouteCause::Replace);
        Ok(())
    }

    /// Report a back/forward step. The backend already holds the new URL.
    pub fn pop_state(&self) {
        self.notify(RouteCause::Pop);
    }

    /// Whether changes are currently reported.
    pub fn is_watched(&self) -> bool {
        self.tx.lock().is_some()
    }

    fn notify(&self, cause: RouteCause) {
        let url = self.backend.current_url();
        let mut guard = self.tx.lock();
        if let Some(tx) = guard.as_ref() {
            debug!(url = %url, ?cause, "route change");
            if tx.send(RouteChange { url, cause }).is_err() {
                // Receiver dropped: the assistant is gone.
                *guard = None;
            }
        }
    }
}

impl NavigationObserver for HistoryNavigation {
    fn watch(&self, tx: mpsc::UnboundedSender<RouteChange>) {
        *self.tx.lock() = Some(tx);
    }

    fn unwatch(&self) {
        *self.tx.lock() = None;
    }

    fn route_to(&self, url: &str) -> Result<()> {
        self.push_state(url)
    }
}

impl std::fmt::Debug for HistoryNavigation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryNavigation")
            .field("url", &self.backend.current_url())
            .field("watched", &self.is_watched())
            .finish()
    }
}
