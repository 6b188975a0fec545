//! Core types for visitrack
//!
//! Defines the data that flows between the tracking components:
//! - Visitor identity token
//! - Visitor record and partial updates
//! - Aggregate statistics owned by the remote service
//! - Ledger state and the read-only session snapshot

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable anonymous visitor token
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorId(String);

impl VisitorId {
    /// Generate a fresh random identity (UUID v4)
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a persisted token; blank tokens are rejected
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Token text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VisitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperatingSystem {
    /// Microsoft Windows
    Windows,
    /// Apple macOS
    MacOS,
    /// Desktop Linux
    Linux,
    /// Android
    Android,
    /// Apple iOS / iPadOS
    #[serde(rename = "iOS")]
    IOS,
    /// Anything unrecognized
    #[default]
    #[serde(other)]
    Unknown,
}

impl OperatingSystem {
    /// Display name, identical to the wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOS => "MacOS",
            Self::Linux => "Linux",
            Self::Android => "Android",
            Self::IOS => "iOS",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Everything known about one visitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorRecord {
    /// Primary key
    pub id: VisitorId,
    /// OS family at creation
    #[serde(default)]
    pub operating_system: OperatingSystem,
    /// IANA timezone at creation
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Creation time, never modified
    #[serde(default = "Utc::now")]
    pub first_seen_at: DateTime<Utc>,
    /// Unique visited paths in first-visit order
    #[serde(default)]
    pub visited_paths: IndexSet<String>,
    /// Visits to the home route, repeats included
    #[serde(default)]
    pub home_visit_count: u64,
}

impl VisitorRecord {
    /// Create a fresh record with no visits
    #[must_use]
    pub fn new(id: VisitorId, operating_system: OperatingSystem, timezone: impl Into<String>) -> Self {
        Self {
            id,
            operating_system,
            timezone: timezone.into(),
            first_seen_at: Utc::now(),
            visited_paths: IndexSet::new(),
            home_visit_count: 0,
        }
    }

    /// Fold another record of the same visitor into this one.
    ///
    /// Paths are unioned and the home counter takes the maximum, so neither
    /// can regress. Returns `true` if `self` changed.
    pub fn absorb(&mut self, other: &VisitorRecord) -> bool {
        let before_paths = self.visited_paths.len();
        let before_count = self.home_visit_count;

        self.visited_paths
            .extend(other.visited_paths.iter().cloned());
        self.home_visit_count = self.home_visit_count.max(other.home_visit_count);
        if other.first_seen_at < self.first_seen_at {
            self.first_seen_at = other.first_seen_at;
        }

        self.visited_paths.len() != before_paths || self.home_visit_count != before_count
    }

    /// Partial update carrying the mutable fields
    #[must_use]
    pub fn visit_patch(&self) -> VisitPatch {
        VisitPatch {
            visited_paths: Some(self.visited_paths.iter().cloned().collect()),
            home_visit_count: Some(self.home_visit_count),
        }
    }
}

/// Partial visitor record for PATCH requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitPatch {
    /// Replacement path list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited_paths: Option<Vec<String>>,
    /// Replacement home counter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_visit_count: Option<u64>,
}

/// Site-wide statistics, read-only for the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    /// Distinct visitors known to the service
    #[serde(alias = "totalVisits", alias = "total_visitor_count")]
    pub total_visitor_count: u64,
}

/// Visit ledger lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LedgerState {
    /// No identity loaded yet
    #[default]
    Uninitialized,
    /// Fetching or reconstructing the record
    Loading,
    /// Record available, no remote writes pending
    Ready,
    /// Record available, remote writes in flight
    Syncing,
}

impl LedgerState {
    /// Record can be read and mutated
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready | Self::Syncing)
    }
}

/// Read-only view handed to the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    /// Visitor token, once resolved
    pub identity: Option<VisitorId>,
    /// Unique visited paths
    pub visited_paths: Vec<String>,
    /// Home route visits
    pub home_visit_count: u64,
    /// Site-wide visitor count (remote or cached)
    pub total_visitor_count: u64,
    /// Initialization has not resolved yet
    pub is_loading: bool,
    /// Current ledger state
    pub state: LedgerState,
}
