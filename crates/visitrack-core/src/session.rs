//! Tracking session
//!
//! Wires identity, environment, navigation and the ledger together at
//! application start and exposes a read-only [`TrackingSnapshot`].
//!
//! # Workflow
//! 1. Mark the session loading and resolve the visitor identity
//! 2. Subscribe to navigation; events arriving before the ledger is ready
//!    are queued in order
//! 3. Initialize the ledger (remote record, cached record, or fresh)
//! 4. Replay queued events, clear `is_loading`
//! 5. Fetch the aggregate visitor count, falling back to the cached value

use crate::config::TrackingConfig;
use crate::environment::Environment;
use crate::error::TrackingError;
use crate::identity::IdentityStore;
use crate::ledger::{LedgerOptions, VisitLedger};
use crate::navigation::{NavigationObserver, Subscription};
use crate::remote::{bounded, HttpRemote, RemoteTracking};
use crate::storage::{keys, FileStore, KeyValueStore, MemoryStore};
use crate::types::{LedgerState, TrackingSnapshot};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

#[derive(Debug, Default)]
struct Status {
    is_loading: bool,
    total_visitor_count: u64,
}

#[derive(Debug, Default)]
struct Gate {
    open: bool,
    queued: Vec<String>,
}

#[derive(Debug)]
struct SessionInner {
    identities: IdentityStore,
    ledger: VisitLedger,
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteTracking>,
    request_timeout: Duration,
    status: Mutex<Status>,
    gate: Mutex<Gate>,
    subscription: Mutex<Option<Subscription>>,
}

/// Application-level tracking handle; cheap to clone
#[derive(Debug, Clone)]
pub struct TrackingSession {
    inner: Arc<SessionInner>,
}

impl TrackingSession {
    /// Create a session over explicit storage and remote backends
    #[must_use]
    pub fn new(
        config: &TrackingConfig,
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteTracking>,
    ) -> Self {
        let environment =
            Environment::resolve(config.platform.as_deref(), config.timezone.as_deref());
        tracing::debug!(os = %environment.operating_system, tz = %environment.timezone, "environment probed");

        let ledger = VisitLedger::new(
            store.clone(),
            remote.clone(),
            LedgerOptions {
                home_path: config.home_path.clone(),
                request_timeout: config.request_timeout(),
                environment,
            },
        );

        let cached_total = cached_total(store.as_ref()).unwrap_or(0);

        Self {
            inner: Arc::new(SessionInner {
                identities: IdentityStore::new(store.clone()),
                ledger,
                store,
                remote,
                request_timeout: config.request_timeout(),
                status: Mutex::new(Status {
                    is_loading: false,
                    total_visitor_count: cached_total,
                }),
                gate: Mutex::new(Gate::default()),
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Create a session from configuration: file or memory storage and an
    /// HTTP remote
    ///
    /// # Errors
    /// - `TrackingError::Config` if the configuration is invalid
    /// - `TrackingError::Storage` if the storage file cannot be opened
    pub fn from_config(config: &TrackingConfig) -> Result<Self, TrackingError> {
        config.validate()?;
        let store: Arc<dyn KeyValueStore> = match &config.storage_path {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        let remote: Arc<dyn RemoteTracking> = Arc::new(HttpRemote::from_config(config)?);
        Ok(Self::new(config, store, remote))
    }

    /// Start tracking navigation on `observer`.
    ///
    /// Never fails: remote problems degrade to the local record. Returns the
    /// snapshot once loading has resolved.
    pub async fn start(&self, observer: &NavigationObserver) -> TrackingSnapshot {
        let inner = &self.inner;
        inner.status.lock().is_loading = true;
        inner.gate.lock().open = false;

        let identity = inner.identities.get_or_create_identity();
        tracing::info!(visitor = %identity, "tracking session starting");

        let weak: Weak<SessionInner> = Arc::downgrade(inner);
        let subscription = observer.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_navigate(event.path());
            }
        });
        // Replacing drops (and so unsubscribes) any earlier subscription.
        *inner.subscription.lock() = Some(subscription);

        if let Err(e) = inner.ledger.initialize(identity).await {
            tracing::warn!(error = %e, "ledger initialization failed");
        }
        inner.status.lock().is_loading = false;
        self.heal().await;
        inner.open_gate();

        self.refresh_total().await;
        self.snapshot()
    }

    /// Re-run initialization if loading finished without a record.
    ///
    /// Returns `true` if initialization was re-invoked.
    pub async fn heal(&self) -> bool {
        let inner = &self.inner;
        let absent = !inner.status.lock().is_loading && inner.ledger.record().is_none();
        if !absent {
            return false;
        }

        tracing::warn!("visitor record absent after loading; re-initializing");
        let identity = inner.identities.get_or_create_identity();
        if let Err(e) = inner.ledger.initialize(identity).await {
            tracing::warn!(error = %e, "re-initialization failed");
        }
        true
    }

    /// Refetch the aggregate visitor count; keeps the cached value on failure
    pub async fn refresh_total(&self) -> u64 {
        let inner = &self.inner;
        match bounded(inner.request_timeout, inner.remote.fetch_aggregate()).await {
            Ok(stats) => {
                inner.status.lock().total_visitor_count = stats.total_visitor_count;
                if let Err(e) = inner
                    .store
                    .set(keys::TOTAL_VISITOR_COUNT, &stats.total_visitor_count.to_string())
                {
                    tracing::warn!(error = %e, "cannot cache aggregate visitor count");
                }
                stats.total_visitor_count
            }
            Err(e) => {
                tracing::warn!(error = %e, "aggregate fetch failed; using cached count");
                let mut status = inner.status.lock();
                if let Some(cached) = cached_total(inner.store.as_ref()) {
                    status.total_visitor_count = cached;
                }
                status.total_visitor_count
            }
        }
    }

    /// Stop observing navigation and wait for outstanding remote writes
    pub async fn stop(&self) {
        if let Some(subscription) = self.inner.subscription.lock().take() {
            subscription.unsubscribe();
        }
        self.inner.ledger.flush().await;
        tracing::info!("tracking session stopped");
    }

    /// Wait for outstanding remote writes without unsubscribing
    pub async fn flush(&self) {
        self.inner.ledger.flush().await;
    }

    /// Current read-only view
    #[must_use]
    pub fn snapshot(&self) -> TrackingSnapshot {
        let inner = &self.inner;
        let (is_loading, total_visitor_count) = {
            let status = inner.status.lock();
            (status.is_loading, status.total_visitor_count)
        };
        let record = inner.ledger.record();

        TrackingSnapshot {
            identity: record
                .as_ref()
                .map(|r| r.id.clone())
                .or_else(|| inner.identities.current()),
            visited_paths: record
                .as_ref()
                .map(|r| r.visited_paths.iter().cloned().collect())
                .unwrap_or_default(),
            home_visit_count: record.as_ref().map_or(0, |r| r.home_visit_count),
            total_visitor_count,
            is_loading,
            state: inner.ledger.state(),
        }
    }

    /// Current ledger state
    #[inline]
    #[must_use]
    pub fn state(&self) -> LedgerState {
        self.inner.ledger.state()
    }

    /// Underlying ledger
    #[inline]
    #[must_use]
    pub fn ledger(&self) -> &VisitLedger {
        &self.inner.ledger
    }
}

impl SessionInner {
    fn on_navigate(&self, path: &str) {
        {
            let mut gate = self.gate.lock();
            if !gate.open {
                tracing::debug!(path, "queued navigation until ledger is ready");
                gate.queued.push(path.to_string());
                return;
            }
        }
        self.record(path);
    }

    // Drains under the gate lock so no live event can overtake a queued one.
    fn open_gate(&self) {
        let mut gate = self.gate.lock();
        for path in std::mem::take(&mut gate.queued) {
            self.record(&path);
        }
        gate.open = true;
    }

    fn record(&self, path: &str) {
        if let Err(e) = self.ledger.record_visit(path) {
            tracing::warn!(path, error = %e, "visit not recorded");
        }
    }
}

fn cached_total(store: &dyn KeyValueStore) -> Option<u64> {
    match store.get(keys::TOTAL_VISITOR_COUNT) {
        Ok(Some(raw)) => raw.trim().parse().ok(),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "cannot read cached aggregate count");
            None
        }
    }
}
