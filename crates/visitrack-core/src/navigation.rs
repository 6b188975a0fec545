//! Client-side navigation observer
//!
//! Owns an in-process history model and a registry of listeners:
//! - `push` / `replace` for programmatic navigation
//! - `back` / `forward` / `go` for history traversal
//! - `subscribe` fires once immediately with the current path
//!
//! Nothing global is intercepted. Dropping a [`Subscription`] removes its
//! listener and leaves the observer exactly as it was before.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// What caused a navigation notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationKind {
    /// Delivered on subscription
    Initial,
    /// New history entry
    Push,
    /// Current entry rewritten
    Replace,
    /// Back/forward traversal
    Pop,
}

/// Notification delivered to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    /// Normalized path now visible
    pub path: String,
    /// Cause
    pub kind: NavigationKind,
}

impl NavigationEvent {
    /// Normalized path now visible
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

type Listener = Arc<dyn Fn(&NavigationEvent) + Send + Sync>;

#[derive(Default)]
struct Inner {
    entries: Vec<String>,
    index: usize,
    next_listener: u64,
    listeners: Vec<(u64, Listener)>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("entries", &self.entries)
            .field("index", &self.index)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// History model plus listener registry
#[derive(Debug, Clone)]
pub struct NavigationObserver {
    inner: Arc<Mutex<Inner>>,
}

impl NavigationObserver {
    /// Create observer positioned at `initial_path`
    #[must_use]
    pub fn new(initial_path: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: vec![normalize_path(initial_path)],
                ..Inner::default()
            })),
        }
    }

    /// Register `on_navigate`; it is invoked once right away with the
    /// current path, then on every navigation until unsubscribed.
    pub fn subscribe<F>(&self, on_navigate: F) -> Subscription
    where
        F: Fn(&NavigationEvent) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(on_navigate);
        let (id, current) = {
            let mut inner = self.inner.lock();
            let id = inner.next_listener;
            inner.next_listener += 1;
            inner.listeners.push((id, listener.clone()));
            (id, inner.entries[inner.index].clone())
        };
        tracing::debug!(listener = id, path = %current, "navigation listener subscribed");

        listener(&NavigationEvent {
            path: current,
            kind: NavigationKind::Initial,
        });

        Subscription {
            id,
            observer: Arc::downgrade(&self.inner),
        }
    }

    /// Navigate to `path`, discarding any forward entries
    pub fn push(&self, path: &str) {
        let path = normalize_path(path);
        {
            let mut inner = self.inner.lock();
            let keep = inner.index + 1;
            inner.entries.truncate(keep);
            inner.entries.push(path.clone());
            inner.index = keep;
        }
        self.notify(path, NavigationKind::Push);
    }

    /// Rewrite the current entry to `path`
    pub fn replace(&self, path: &str) {
        let path = normalize_path(path);
        {
            let mut inner = self.inner.lock();
            let index = inner.index;
            inner.entries[index] = path.clone();
        }
        self.notify(path, NavigationKind::Replace);
    }

    /// Step back one entry; returns `false` at the start of history
    pub fn back(&self) -> bool {
        self.go(-1)
    }

    /// Step forward one entry; returns `false` at the end of history
    pub fn forward(&self) -> bool {
        self.go(1)
    }

    /// Move `delta` entries; out-of-range moves are ignored and not notified
    pub fn go(&self, delta: isize) -> bool {
        let path = {
            let mut inner = self.inner.lock();
            let Some(target) = inner.index.checked_add_signed(delta) else {
                return false;
            };
            if delta == 0 || target >= inner.entries.len() {
                return false;
            }
            inner.index = target;
            inner.entries[target].clone()
        };
        self.notify(path, NavigationKind::Pop);
        true
    }

    /// Path of the current entry
    #[must_use]
    pub fn current_path(&self) -> String {
        let inner = self.inner.lock();
        inner.entries[inner.index].clone()
    }

    /// Registered listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    // Listeners run after the lock is released so they may navigate.
    fn notify(&self, path: String, kind: NavigationKind) {
        let listeners: Vec<Listener> = self
            .inner
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        tracing::trace!(path = %path, ?kind, listeners = listeners.len(), "navigation");
        let event = NavigationEvent { path, kind };
        for listener in listeners {
            listener(&event);
        }
    }
}

impl Default for NavigationObserver {
    fn default() -> Self {
        Self::new("/")
    }
}

/// Handle returned by [`NavigationObserver::subscribe`]; drop to unsubscribe
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    observer: Weak<Mutex<Inner>>,
}

impl Subscription {
    /// Remove the listener now
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.observer.upgrade() {
            inner.lock().listeners.retain(|(id, _)| *id != self.id);
            tracing::debug!(listener = self.id, "navigation listener removed");
        }
    }
}

/// Strip query and fragment; empty paths become `/`
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    let path = raw[..end].trim();
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
