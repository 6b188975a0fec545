//! Persistent visitor identity
//!
//! One token per storage scope. Created on first use, then read back forever.
//! Persistence failures never surface; the store hands out an identity that
//! is stable for this session only.

use crate::storage::{keys, KeyValueStore};
use crate::types::VisitorId;
use parking_lot::Mutex;
use std::sync::Arc;

/// Resolves and memoizes the visitor identity
#[derive(Debug)]
pub struct IdentityStore {
    store: Arc<dyn KeyValueStore>,
    resolved: Mutex<Option<VisitorId>>,
}

impl IdentityStore {
    /// Create identity store over a key-value backend
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            resolved: Mutex::new(None),
        }
    }

    /// Return the persisted identity, creating and persisting one if absent.
    ///
    /// Idempotent: every call on this store returns the same token, and
    /// stores sharing a backend agree once the token is persisted.
    pub fn get_or_create_identity(&self) -> VisitorId {
        let mut resolved = self.resolved.lock();
        if let Some(id) = resolved.as_ref() {
            return id.clone();
        }

        let id = match self.store.get(keys::VISITOR_ID) {
            Ok(Some(raw)) => match VisitorId::parse(&raw) {
                Some(id) => {
                    tracing::debug!(visitor = %id, "loaded persisted identity");
                    id
                }
                None => self.create(),
            },
            Ok(None) => self.create(),
            Err(e) => {
                tracing::warn!(error = %e, "identity unreadable; using session-scoped identity");
                VisitorId::generate()
            }
        };

        *resolved = Some(id.clone());
        id
    }

    /// Identity if already resolved, without touching storage
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<VisitorId> {
        self.resolved.lock().clone()
    }

    fn create(&self) -> VisitorId {
        let id = VisitorId::generate();
        match self.store.set(keys::VISITOR_ID, id.as_str()) {
            Ok(()) => tracing::info!(visitor = %id, "created visitor identity"),
            Err(e) => {
                tracing::warn!(visitor = %id, error = %e, "identity not persisted; valid for this session only");
            }
        }
        id
    }
}
