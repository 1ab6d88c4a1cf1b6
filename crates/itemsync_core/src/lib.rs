//! Core logic for itemsync.
//!
//! Items live in a remote document store and are mirrored into a local
//! SQLite cache. [`ItemService`] is the entry point: it writes remote first,
//! mirrors into the cache, and syncs incrementally by timestamp cursor.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod remote;
pub mod repo;
pub mod service;
pub mod sync;

pub use config::{ConfigError, ItemSyncConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::item::{Item, ItemFields, ItemId, ItemValidationError};
pub use remote::{
    FirestoreRestStore, FirestoreSettings, MemoryRemoteStore, RemoteError, RemoteResult,
    RemoteStore, TimestampFilter,
};
pub use repo::item_cache::{LocalCache, RepoError, RepoResult, SqliteItemCache};
pub use service::item_service::{
    ItemService, ItemServiceError, ResyncReport, ServiceResult, SyncReport,
};
pub use sync::clock::{Clock, SystemClock};
pub use sync::policy::CursorMode;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
