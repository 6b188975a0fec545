//! Testing utilities for visitrack workspace
//!
//! Shared test doubles and fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use visitrack_core::{
    AggregateStats, KeyValueStore, OperatingSystem, RemoteError, RemoteTracking, StorageError,
    TrackingConfig, VisitPatch, VisitorId, VisitorRecord,
};

/// How the fake remote answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMode {
    Online,
    Unreachable,
    /// Never answers; callers must rely on their own timeout
    Hanging,
}

/// Per-operation call counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteCalls {
    pub creates: usize,
    pub fetches: usize,
    pub updates: usize,
    pub aggregates: usize,
}

#[derive(Debug, Default)]
struct Counters {
    creates: AtomicUsize,
    fetches: AtomicUsize,
    updates: AtomicUsize,
    aggregates: AtomicUsize,
}

/// Remote tracking service kept in process memory
#[derive(Debug)]
pub struct InMemoryRemote {
    records: DashMap<VisitorId, VisitorRecord>,
    mode: Mutex<RemoteMode>,
    counters: Counters,
}

impl InMemoryRemote {
    pub fn new(mode: RemoteMode) -> Self {
        Self {
            records: DashMap::new(),
            mode: Mutex::new(mode),
            counters: Counters::default(),
        }
    }

    pub fn online() -> Self {
        Self::new(RemoteMode::Online)
    }

    pub fn set_mode(&self, mode: RemoteMode) {
        *self.mode.lock() = mode;
    }

    /// Store a record as if created earlier
    pub fn seed(&self, record: VisitorRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn record(&self, id: &VisitorId) -> Option<VisitorRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    pub fn calls(&self) -> RemoteCalls {
        RemoteCalls {
            creates: self.counters.creates.load(Ordering::SeqCst),
            fetches: self.counters.fetches.load(Ordering::SeqCst),
            updates: self.counters.updates.load(Ordering::SeqCst),
            aggregates: self.counters.aggregates.load(Ordering::SeqCst),
        }
    }

    async fn reachable(&self) -> Result<(), RemoteError> {
        let mode = *self.mode.lock();
        match mode {
            RemoteMode::Online => Ok(()),
            RemoteMode::Unreachable => Err(RemoteError::Unreachable("in-memory remote offline".into())),
            RemoteMode::Hanging => std::future::pending().await,
        }
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::online()
    }
}

#[async_trait]
impl RemoteTracking for InMemoryRemote {
    async fn create_visitor(&self, record: &VisitorRecord) -> Result<VisitorRecord, RemoteError> {
        self.counters.creates.fetch_add(1, Ordering::SeqCst);
        self.reachable().await?;
        let stored = self
            .records
            .entry(record.id.clone())
            .or_insert_with(|| record.clone())
            .value()
            .clone();
        Ok(stored)
    }

    async fn fetch_visitor(&self, id: &VisitorId) -> Result<Option<VisitorRecord>, RemoteError> {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        self.reachable().await?;
        Ok(self.record(id))
    }

    async fn update_visit(
        &self,
        id: &VisitorId,
        patch: &VisitPatch,
    ) -> Result<VisitorRecord, RemoteError> {
        self.counters.updates.fetch_add(1, Ordering::SeqCst);
        self.reachable().await?;
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        if let Some(paths) = &patch.visited_paths {
            entry.visited_paths = paths.iter().cloned().collect();
        }
        if let Some(count) = patch.home_visit_count {
            entry.home_visit_count = count;
        }
        Ok(entry.value().clone())
    }

    async fn fetch_aggregate(&self) -> Result<AggregateStats, RemoteError> {
        self.counters.aggregates.fetch_add(1, Ordering::SeqCst);
        self.reachable().await?;
        Ok(AggregateStats {
            total_visitor_count: self.records.len() as u64,
        })
    }
}

/// Store that rejects every operation
#[derive(Debug, Default)]
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }
}

/// Config with a short timeout and fixed environment
pub fn test_config() -> TrackingConfig {
    TrackingConfig::new()
        .with_platform("Mozilla/5.0 (X11; Linux x86_64)")
        .with_timezone("Asia/Kolkata")
        .with_request_timeout(Duration::from_millis(500))
}

pub fn visitor(id: &str) -> VisitorId {
    VisitorId::parse(id).expect("fixture ids are non-blank")
}

/// Record with the given paths and home counter
pub fn record_with(id: &str, paths: &[&str], home_visit_count: u64) -> VisitorRecord {
    let mut record = VisitorRecord::new(visitor(id), OperatingSystem::Linux, "UTC");
    record
        .visited_paths
        .extend(paths.iter().map(|p| (*p).to_string()));
    record.home_visit_count = home_visit_count;
    record
}
