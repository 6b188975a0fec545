//! Visit ledger
//!
//! Owns the visitor record in memory and in local storage, and mirrors it to
//! the remote tracking service on a best-effort basis.
//!
//! # States
//! `Uninitialized → Loading → Ready`, plus `Syncing` while remote writes are
//! in flight. `Ready → Loading` re-initializes.
//!
//! # Guarantees
//! - `visited_paths` never shrinks and never holds duplicates
//! - `home_visit_count` never decreases
//! - local writes happen before `record_visit` returns; remote writes never
//!   block it and are never retried
//! - remote writes run detached and finish even if the ledger is dropped

use crate::environment::Environment;
use crate::error::{LedgerError, RemoteError};
use crate::remote::{bounded, RemoteTracking};
use crate::storage::{keys, KeyValueStore};
use crate::types::{LedgerState, VisitorId, VisitorRecord};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Phase transitions the ledger accepts
#[must_use]
pub fn allowed_transitions(from: LedgerState) -> Vec<LedgerState> {
    use LedgerState::*;
    match from {
        Uninitialized => vec![Loading],
        Loading => vec![Ready],
        Ready | Syncing => vec![Loading],
    }
}

/// Validate a phase transition
///
/// # Errors
/// - `LedgerError::IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: LedgerState, to: LedgerState) -> Result<(), LedgerError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(LedgerError::IllegalTransition { from, to })
    }
}

/// Ledger construction options
#[derive(Debug, Clone)]
pub struct LedgerOptions {
    /// Path counted as a home visit (exact match)
    pub home_path: String,
    /// Bound on each remote call
    pub request_timeout: Duration,
    /// Environment stamped on fresh records
    pub environment: Environment,
}

#[derive(Debug, Default)]
struct SyncTracker {
    in_flight: AtomicUsize,
    idle: Notify,
}

#[derive(Debug)]
struct Shared {
    phase: LedgerState,
    record: Option<VisitorRecord>,
}

/// In-memory and persisted visitor record with remote reconciliation
#[derive(Debug)]
pub struct VisitLedger {
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteTracking>,
    options: LedgerOptions,
    shared: Mutex<Shared>,
    sync: Arc<SyncTracker>,
}

impl VisitLedger {
    /// Create an uninitialized ledger
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteTracking>,
        options: LedgerOptions,
    ) -> Self {
        Self {
            store,
            remote,
            options,
            shared: Mutex::new(Shared {
                phase: LedgerState::Uninitialized,
                record: None,
            }),
            sync: Arc::default(),
        }
    }

    /// Current state; `Syncing` while any remote write is outstanding
    #[must_use]
    pub fn state(&self) -> LedgerState {
        let phase = self.shared.lock().phase;
        if phase == LedgerState::Ready && self.sync.in_flight.load(Ordering::Acquire) > 0 {
            LedgerState::Syncing
        } else {
            phase
        }
    }

    /// Copy of the current record
    #[must_use]
    pub fn record(&self) -> Option<VisitorRecord> {
        self.shared.lock().record.clone()
    }

    /// Home path this ledger counts
    #[inline]
    #[must_use]
    pub fn home_path(&self) -> &str {
        &self.options.home_path
    }

    /// Load the record for `identity`.
    ///
    /// The remote record wins when it can be fetched; a cached local record
    /// for the same visitor is merged into it so nothing regresses. Otherwise
    /// the cached record, or a fresh one, is used and a remote create is fired
    /// in the background. Always ends `Ready` within the request timeout.
    ///
    /// # Errors
    /// - `LedgerError::IllegalTransition` if already loading
    pub async fn initialize(&self, identity: VisitorId) -> Result<VisitorRecord, LedgerError> {
        self.transition(LedgerState::Loading)?;
        tracing::debug!(visitor = %identity, "ledger loading");

        let local = self.load_local(&identity);
        let fetched = bounded(
            self.options.request_timeout,
            self.remote.fetch_visitor(&identity),
        )
        .await;

        let record = match fetched {
            Ok(Some(mut remote)) => {
                tracing::info!(visitor = %identity, "adopted remote visitor record");
                if let Some(local) = local.as_ref() {
                    if remote.absorb(local) {
                        tracing::debug!(visitor = %identity, "local cache ahead of remote; pushing merge");
                        self.spawn_update(&remote);
                    }
                }
                remote
            }
            Ok(None) => {
                tracing::info!(visitor = %identity, "no remote record; creating");
                self.fallback(identity, local)
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(visitor = %identity, error = %e, "remote reports visitor missing; creating");
                self.fallback(identity, local)
            }
            Err(e) => {
                tracing::warn!(
                    visitor = %identity,
                    error = %e,
                    transient = e.is_transient(),
                    "remote fetch failed; continuing locally"
                );
                self.fallback(identity, local)
            }
        };

        self.persist(&record);
        {
            let mut shared = self.shared.lock();
            shared.record = Some(record.clone());
            shared.phase = LedgerState::Ready;
        }
        tracing::debug!(paths = record.visited_paths.len(), home = record.home_visit_count, "ledger ready");
        Ok(record)
    }

    /// Record a navigation to `path`.
    ///
    /// New paths join `visited_paths`; the home path bumps `home_visit_count`
    /// on every visit. Persists locally before returning and queues a remote
    /// update that is never awaited here.
    ///
    /// # Errors
    /// - `LedgerError::NotReady` before `initialize` completes
    pub fn record_visit(&self, path: &str) -> Result<VisitorRecord, LedgerError> {
        let updated = {
            let mut shared = self.shared.lock();
            let phase = shared.phase;
            let Some(record) = shared.record.as_mut().filter(|_| phase == LedgerState::Ready) else {
                return Err(LedgerError::NotReady(phase));
            };

            let first_visit = record.visited_paths.insert(path.to_string());
            if path == self.options.home_path {
                // Seeded from storage, so it may already sit at the maximum.
                record.home_visit_count = record.home_visit_count.saturating_add(1);
            }
            tracing::debug!(path, first_visit, home = record.home_visit_count, "visit recorded");

            // Persisted under the lock so the stored snapshot follows mutation order.
            let updated = record.clone();
            self.persist(&updated);
            updated
        };

        self.spawn_update(&updated);
        Ok(updated)
    }

    /// Wait for every outstanding remote write
    pub async fn flush(&self) {
        loop {
            let idle = self.sync.idle.notified();
            tokio::pin!(idle);
            // Register before checking so a write settling in between still wakes us.
            idle.as_mut().enable();
            if self.sync.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }

    fn transition(&self, to: LedgerState) -> Result<(), LedgerError> {
        let mut shared = self.shared.lock();
        validate_transition(shared.phase, to)?;
        shared.phase = to;
        Ok(())
    }

    fn fallback(&self, identity: VisitorId, local: Option<VisitorRecord>) -> VisitorRecord {
        let record = local.unwrap_or_else(|| self.fresh_record(identity));
        self.spawn_create(&record);
        record
    }

    fn fresh_record(&self, identity: VisitorId) -> VisitorRecord {
        let env = &self.options.environment;
        let mut record = VisitorRecord::new(identity, env.operating_system, env.timezone.clone());

        // Independent keys may outlive a discarded snapshot.
        if let Some(paths) = self.read_key(keys::VISITED_PATHS) {
            match serde_json::from_str::<Vec<String>>(&paths) {
                Ok(paths) => record.visited_paths.extend(paths),
                Err(e) => tracing::warn!(error = %e, "ignoring malformed cached path list"),
            }
        }
        if let Some(count) = self.read_key(keys::HOME_VISIT_COUNT) {
            match count.trim().parse::<u64>() {
                Ok(count) => record.home_visit_count = count,
                Err(e) => tracing::warn!(error = %e, "ignoring malformed cached home count"),
            }
        }
        record
    }

    fn load_local(&self, identity: &VisitorId) -> Option<VisitorRecord> {
        let raw = self.read_key(keys::VISITOR_RECORD)?;
        match serde_json::from_str::<VisitorRecord>(&raw) {
            Ok(record) if record.id == *identity => Some(record),
            Ok(record) => {
                tracing::warn!(cached = %record.id, visitor = %identity, "cached record belongs to another visitor");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed cached record");
                None
            }
        }
    }

    fn read_key(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "local read failed");
                None
            }
        }
    }

    fn persist(&self, record: &VisitorRecord) {
        let paths: Vec<&String> = record.visited_paths.iter().collect();
        let writes = serde_json::to_string(record).and_then(|snapshot| {
            serde_json::to_string(&paths).map(|paths| (snapshot, paths))
        });
        let (snapshot, paths) = match writes {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, "cannot encode visitor record");
                return;
            }
        };

        for (key, value) in [
            (keys::VISITOR_RECORD, snapshot),
            (keys::VISITED_PATHS, paths),
            (keys::HOME_VISIT_COUNT, record.home_visit_count.to_string()),
        ] {
            if let Err(e) = self.store.set(key, &value) {
                tracing::warn!(key, error = %e, "local write failed");
            }
        }
    }

    fn spawn_create(&self, record: &VisitorRecord) {
        let remote = self.remote.clone();
        let record = record.clone();
        let timeout = self.options.request_timeout;
        self.spawn_sync("create", async move {
            bounded(timeout, remote.create_visitor(&record)).await.map(|_| ())
        });
    }

    fn spawn_update(&self, record: &VisitorRecord) {
        let remote = self.remote.clone();
        let id = record.id.clone();
        let patch = record.visit_patch();
        let timeout = self.options.request_timeout;
        self.spawn_sync("update", async move {
            bounded(timeout, remote.update_visit(&id, &patch)).await.map(|_| ())
        });
    }

    fn spawn_sync<F>(&self, op: &'static str, call: F)
    where
        F: Future<Output = Result<(), RemoteError>> + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(op, "no async runtime; remote sync skipped");
            return;
        };

        let guard = InFlight::enter(&self.sync);
        // Detached; only the in-flight guard tracks it.
        handle.spawn(async move {
            let _guard = guard;
            match call.await {
                Ok(()) => tracing::debug!(op, "remote sync acknowledged"),
                Err(e) => tracing::warn!(
                    op,
                    error = %e,
                    transient = e.is_transient(),
                    "remote sync failed; local record kept"
                ),
            }
        });
    }
}

struct InFlight(Arc<SyncTracker>);

impl InFlight {
    fn enter(tracker: &Arc<SyncTracker>) -> Self {
        tracker.in_flight.fetch_add(1, Ordering::AcqRel);
        Self(tracker.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemoteTracking;
    use crate::storage::MemoryStore;
    use crate::types::{AggregateStats, OperatingSystem, VisitPatch};
    use pretty_assertions::assert_eq;

    /// Remote whose updates wait until the gate is opened
    #[derive(Debug, Default)]
    struct GatedRemote {
        gate: Notify,
        updates_done: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RemoteTracking for GatedRemote {
        async fn create_visitor(&self, record: &VisitorRecord) -> Result<VisitorRecord, RemoteError> {
            Ok(record.clone())
        }

        async fn fetch_visitor(&self, _id: &VisitorId) -> Result<Option<VisitorRecord>, RemoteError> {
            Ok(None)
        }

        async fn update_visit(
            &self,
            id: &VisitorId,
            _patch: &VisitPatch,
        ) -> Result<VisitorRecord, RemoteError> {
            self.gate.notified().await;
            self.updates_done.fetch_add(1, Ordering::SeqCst);
            Ok(VisitorRecord::new(id.clone(), OperatingSystem::Unknown, "UTC"))
        }

        async fn fetch_aggregate(&self) -> Result<AggregateStats, RemoteError> {
            Ok(AggregateStats::default())
        }
    }

    fn acknowledging_remote() -> MockRemoteTracking {
        let mut remote = MockRemoteTracking::new();
        remote.expect_fetch_visitor().returning(|_| Ok(None));
        remote.expect_create_visitor().returning(|record| Ok(record.clone()));
        remote
            .expect_update_visit()
            .returning(|id, _| Ok(VisitorRecord::new(id.clone(), OperatingSystem::Unknown, "UTC")));
        remote
    }

    fn options() -> LedgerOptions {
        LedgerOptions {
            home_path: "/".into(),
            request_timeout: Duration::from_millis(200),
            environment: Environment {
                operating_system: OperatingSystem::Linux,
                timezone: "Asia/Kolkata".into(),
            },
        }
    }

    fn id() -> VisitorId {
        VisitorId::parse("visitor-1").unwrap()
    }

    fn offline_remote() -> MockRemoteTracking {
        let mut remote = MockRemoteTracking::new();
        remote
            .expect_fetch_visitor()
            .returning(|_| Err(RemoteError::Unreachable("offline".into())));
        remote
            .expect_create_visitor()
            .returning(|_| Err(RemoteError::Unreachable("offline".into())));
        remote
            .expect_update_visit()
            .returning(|_, _| Err(RemoteError::Unreachable("offline".into())));
        remote
    }

    fn ledger_with(store: Arc<MemoryStore>, remote: MockRemoteTracking) -> VisitLedger {
        VisitLedger::new(store, Arc::new(remote), options())
    }

    fn paths(record: &VisitorRecord) -> Vec<&str> {
        record.visited_paths.iter().map(String::as_str).collect()
    }

    #[test]
    fn transition_table() {
        assert!(validate_transition(LedgerState::Uninitialized, LedgerState::Loading).is_ok());
        assert!(validate_transition(LedgerState::Loading, LedgerState::Ready).is_ok());
        assert!(validate_transition(LedgerState::Ready, LedgerState::Loading).is_ok());
        assert_eq!(
            validate_transition(LedgerState::Uninitialized, LedgerState::Ready),
            Err(LedgerError::IllegalTransition {
                from: LedgerState::Uninitialized,
                to: LedgerState::Ready
            })
        );
        assert!(validate_transition(LedgerState::Loading, LedgerState::Loading).is_err());
    }

    #[test]
    fn record_visit_requires_ready() {
        let ledger = ledger_with(Arc::new(MemoryStore::new()), MockRemoteTracking::new());
        assert_eq!(
            ledger.record_visit("/"),
            Err(LedgerError::NotReady(LedgerState::Uninitialized))
        );
    }

    #[tokio::test]
    async fn fresh_visitor_scenario() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone(), offline_remote());

        let record = ledger.initialize(id()).await.unwrap();
        assert_eq!(record.operating_system, OperatingSystem::Linux);
        assert_eq!(record.timezone, "Asia/Kolkata");

        ledger.record_visit("/").unwrap();
        ledger.record_visit("/jobs").unwrap();
        let record = ledger.record_visit("/").unwrap();

        assert_eq!(paths(&record), vec!["/", "/jobs"]);
        assert_eq!(record.home_visit_count, 2);
        assert_eq!(
            store.get(keys::HOME_VISIT_COUNT).unwrap().as_deref(),
            Some("2")
        );
        assert_eq!(
            store.get(keys::VISITED_PATHS).unwrap().as_deref(),
            Some(r#"["/","/jobs"]"#)
        );

        ledger.flush().await;
        assert_eq!(ledger.state(), LedgerState::Ready);
    }

    #[tokio::test]
    async fn adopts_remote_record() {
        let mut remote = MockRemoteTracking::new();
        remote.expect_fetch_visitor().returning(|id| {
            let mut record = VisitorRecord::new(id.clone(), OperatingSystem::MacOS, "Europe/Paris");
            record.visited_paths.insert("/".into());
            record.home_visit_count = 5;
            Ok(Some(record))
        });
        remote.expect_create_visitor().never();
        remote
            .expect_update_visit()
            .withf(|_, patch| patch.home_visit_count == Some(5))
            .times(1)
            .returning(|id, _| Ok(VisitorRecord::new(id.clone(), OperatingSystem::MacOS, "UTC")));

        let ledger = ledger_with(Arc::new(MemoryStore::new()), remote);
        let record = ledger.initialize(id()).await.unwrap();
        assert_eq!(record.operating_system, OperatingSystem::MacOS);
        assert_eq!(record.home_visit_count, 5);

        let record = ledger.record_visit("/about-us").unwrap();
        assert_eq!(record.home_visit_count, 5);
        assert_eq!(paths(&record), vec!["/", "/about-us"]);

        ledger.flush().await;
    }

    #[tokio::test]
    async fn not_found_creates_remotely() {
        let mut remote = MockRemoteTracking::new();
        remote.expect_fetch_visitor().returning(|_| Ok(None));
        remote
            .expect_create_visitor()
            .withf(|record| record.id.as_str() == "visitor-1")
            .times(1)
            .returning(|record| Ok(record.clone()));

        let ledger = ledger_with(Arc::new(MemoryStore::new()), remote);
        ledger.initialize(id()).await.unwrap();
        ledger.flush().await;
    }

    #[tokio::test]
    async fn cached_record_survives_outage() {
        let store = Arc::new(MemoryStore::new());
        let mut cached = VisitorRecord::new(id(), OperatingSystem::Windows, "UTC");
        cached.visited_paths.insert("/faq".into());
        cached.home_visit_count = 3;
        store
            .set(keys::VISITOR_RECORD, &serde_json::to_string(&cached).unwrap())
            .unwrap();

        let ledger = ledger_with(store, offline_remote());
        let record = ledger.initialize(id()).await.unwrap();
        assert_eq!(record, cached);
        ledger.flush().await;
    }

    #[tokio::test]
    async fn local_cache_ahead_of_remote_is_merged() {
        let store = Arc::new(MemoryStore::new());
        let mut cached = VisitorRecord::new(id(), OperatingSystem::Windows, "UTC");
        cached.visited_paths.insert("/jobs".into());
        cached.home_visit_count = 7;
        store
            .set(keys::VISITOR_RECORD, &serde_json::to_string(&cached).unwrap())
            .unwrap();

        let mut remote = MockRemoteTracking::new();
        remote.expect_fetch_visitor().returning(|id| {
            let mut record = VisitorRecord::new(id.clone(), OperatingSystem::Windows, "UTC");
            record.visited_paths.insert("/".into());
            record.home_visit_count = 4;
            Ok(Some(record))
        });
        remote
            .expect_update_visit()
            .withf(|_, patch| {
                patch.home_visit_count == Some(7)
                    && patch.visited_paths.as_deref() == Some(&["/".to_string(), "/jobs".to_string()][..])
            })
            .times(1)
            .returning(|id, _| Ok(VisitorRecord::new(id.clone(), OperatingSystem::Windows, "UTC")));

        let ledger = ledger_with(store, remote);
        let record = ledger.initialize(id()).await.unwrap();
        assert_eq!(paths(&record), vec!["/", "/jobs"]);
        assert_eq!(record.home_visit_count, 7);
        ledger.flush().await;
    }

    #[tokio::test]
    async fn malformed_snapshot_falls_back_to_independent_keys() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::VISITOR_RECORD, "{broken").unwrap();
        store.set(keys::VISITED_PATHS, r#"["/","/offerings"]"#).unwrap();
        store.set(keys::HOME_VISIT_COUNT, "4").unwrap();

        let ledger = ledger_with(store, offline_remote());
        let record = ledger.initialize(id()).await.unwrap();
        assert_eq!(paths(&record), vec!["/", "/offerings"]);
        assert_eq!(record.home_visit_count, 4);
        ledger.flush().await;
    }

    #[tokio::test]
    async fn snapshot_of_another_visitor_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let mut foreign =
            VisitorRecord::new(VisitorId::parse("someone-else").unwrap(), OperatingSystem::Linux, "UTC");
        foreign.home_visit_count = 9;
        store
            .set(keys::VISITOR_RECORD, &serde_json::to_string(&foreign).unwrap())
            .unwrap();

        let ledger = ledger_with(store, offline_remote());
        let record = ledger.initialize(id()).await.unwrap();
        assert_eq!(record.id, id());
        assert_eq!(record.home_visit_count, 0);
        ledger.flush().await;
    }

    #[tokio::test]
    async fn timed_out_fetch_still_reaches_ready() {
        let mut remote = MockRemoteTracking::new();
        remote
            .expect_fetch_visitor()
            .returning(|_| Err(RemoteError::Timeout { timeout_ms: 200 }));
        remote.expect_create_visitor().returning(|record| Ok(record.clone()));

        let ledger = ledger_with(Arc::new(MemoryStore::new()), remote);
        let record = ledger.initialize(id()).await.unwrap();
        assert!(ledger.state().is_ready());
        assert!(record.visited_paths.is_empty());
        ledger.flush().await;
    }

    #[tokio::test]
    async fn concurrent_initialize_is_rejected() {
        let ledger = ledger_with(Arc::new(MemoryStore::new()), offline_remote());
        ledger.transition(LedgerState::Loading).unwrap();
        assert!(matches!(
            ledger.initialize(id()).await,
            Err(LedgerError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn without_runtime_remote_sync_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut remote = MockRemoteTracking::new();
        remote.expect_update_visit().never();
        let ledger = ledger_with(store, remote);
        {
            let mut shared = ledger.shared.lock();
            shared.phase = LedgerState::Ready;
            shared.record = Some(VisitorRecord::new(id(), OperatingSystem::Unknown, "UTC"));
        }

        let record = ledger.record_visit("/").unwrap();
        assert_eq!(record.home_visit_count, 1);
        assert_eq!(ledger.state(), LedgerState::Ready);
    }

    #[tokio::test]
    async fn home_count_saturates_instead_of_overflowing() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::HOME_VISIT_COUNT, &u64::MAX.to_string()).unwrap();

        let ledger = ledger_with(store.clone(), acknowledging_remote());
        let record = ledger.initialize(id()).await.unwrap();
        assert_eq!(record.home_visit_count, u64::MAX);

        let record = ledger.record_visit("/").unwrap();
        assert_eq!(record.home_visit_count, u64::MAX);
        assert_eq!(paths(&record), vec!["/"]);
        assert_eq!(
            store.get(keys::HOME_VISIT_COUNT).unwrap(),
            Some(u64::MAX.to_string())
        );
        ledger.flush().await;
    }

    #[tokio::test]
    async fn not_found_error_is_treated_as_missing_record() {
        let mut remote = MockRemoteTracking::new();
        remote
            .expect_fetch_visitor()
            .returning(|id| Err(RemoteError::NotFound(id.to_string())));
        remote
            .expect_create_visitor()
            .times(1)
            .returning(|record| Ok(record.clone()));

        let ledger = ledger_with(Arc::new(MemoryStore::new()), remote);
        ledger.initialize(id()).await.unwrap();
        ledger.flush().await;
    }

    #[tokio::test]
    async fn pending_update_reports_syncing() {
        let remote = Arc::new(GatedRemote::default());
        let ledger = VisitLedger::new(Arc::new(MemoryStore::new()), remote.clone(), options());
        ledger.initialize(id()).await.unwrap();
        ledger.flush().await;
        assert_eq!(ledger.state(), LedgerState::Ready);

        ledger.record_visit("/jobs").unwrap();
        tokio::task::yield_now().await;
        assert_eq!(ledger.state(), LedgerState::Syncing);

        remote.gate.notify_one();
        ledger.flush().await;
        assert_eq!(ledger.state(), LedgerState::Ready);
        assert_eq!(remote.updates_done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_ledger_lets_pending_writes_finish() {
        let remote = Arc::new(GatedRemote::default());
        let ledger = VisitLedger::new(Arc::new(MemoryStore::new()), remote.clone(), options());
        ledger.initialize(id()).await.unwrap();
        ledger.record_visit("/").unwrap();
        drop(ledger);

        remote.gate.notify_one();
        tokio::time::timeout(Duration::from_secs(1), async {
            while remote.updates_done.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("update completes after the ledger is gone");
    }

    #[tokio::test]
    async fn settled_writes_are_not_retained() {
        let ledger = ledger_with(Arc::new(MemoryStore::new()), acknowledging_remote());
        ledger.initialize(id()).await.unwrap();
        for _ in 0..500 {
            ledger.record_visit("/jobs").unwrap();
        }
        ledger.flush().await;

        assert_eq!(ledger.state(), LedgerState::Ready);
        assert_eq!(ledger.sync.in_flight.load(Ordering::Acquire), 0);
        // No finished task keeps a handle on the tracker.
        assert_eq!(Arc::strong_count(&ledger.sync), 1);
    }
}
