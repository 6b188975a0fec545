//! visitrack Core - visitor tracking client
//!
//! Gives each visitor a persistent anonymous identity, records the routes
//! they visit and how often they return to the home route, and mirrors that
//! state to a remote tracking service:
//! - Identity store backed by local key-value storage
//! - Environment probe for OS family and timezone
//! - Navigation observer with explicit subscribe/unsubscribe
//! - Visit ledger reconciling local and remote records
//! - Tracking session composing all of the above
//!
//! Tracking is best-effort and fails open: no remote or storage problem
//! interrupts navigation.
//!
//! # Example
//!
//! ```rust,ignore
//! use visitrack_core::{NavigationObserver, TrackingConfig, TrackingSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TrackingConfig::new().with_api_base_url("https://example.com/api/");
//! let session = TrackingSession::from_config(&config)?;
//!
//! let observer = NavigationObserver::new("/");
//! session.start(&observer).await;
//! observer.push("/jobs");
//!
//! println!("home visits: {}", session.snapshot().home_visit_count);
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod config;
pub mod environment;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod navigation;
pub mod remote;
pub mod session;
pub mod storage;
pub mod types;

// Re-exports for convenience
pub use config::TrackingConfig;
pub use environment::{classify, probe, Environment};
pub use error::{ConfigError, LedgerError, RemoteError, StorageError, TrackingError};
pub use identity::IdentityStore;
pub use ledger::{LedgerOptions, VisitLedger};
pub use navigation::{normalize_path, NavigationEvent, NavigationKind, NavigationObserver, Subscription};
pub use remote::{HttpRemote, RemoteTracking};
pub use session::TrackingSession;
pub use storage::{keys, FileStore, KeyValueStore, MemoryStore};
pub use types::{
    AggregateStats, LedgerState, OperatingSystem, TrackingSnapshot, VisitPatch, VisitorId,
    VisitorRecord,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with visitrack
    pub use crate::{
        KeyValueStore, NavigationObserver, RemoteTracking, TrackingConfig, TrackingSession,
        TrackingSnapshot, VisitorId, VisitorRecord,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
