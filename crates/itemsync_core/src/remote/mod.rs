//! Remote document store adapters.
//!
//! # Responsibility
//! - Define the contract of the authoritative item store.
//! - Map transport failures into one typed error shared by every adapter.
//!
//! # Invariants
//! - The remote store assigns item ids; callers never choose them.
//! - `update` fails with `NotFound` for missing documents; `delete` does not.
//! - Adapters never retry; a failed call is terminal for that call.

use crate::model::item::{Item, ItemFields, ItemId, ItemValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod firestore;
pub mod memory;

pub use firestore::{FirestoreRestStore, FirestoreSettings};
pub use memory::MemoryRemoteStore;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure of one remote store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Connectivity or transport failure; no response was received.
    Unavailable(String),
    /// The store rejected the caller.
    PermissionDenied(String),
    /// The addressed document does not exist.
    NotFound(ItemId),
    /// Any other non-success response.
    Status { code: u16, message: String },
    /// The response could not be mapped to items.
    Decode(String),
    /// The caller passed an id that cannot address a document.
    InvalidId(ItemValidationError),
    /// The adapter was constructed with unusable settings.
    InvalidConfig(String),
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "remote store unavailable: {message}"),
            Self::PermissionDenied(message) => write!(f, "remote permission denied: {message}"),
            Self::NotFound(id) => write!(f, "remote item not found: {id}"),
            Self::Status { code, message } => {
                write!(f, "remote store returned status {code}: {message}")
            }
            Self::Decode(message) => write!(f, "invalid remote response: {message}"),
            Self::InvalidId(err) => write!(f, "invalid remote document id: {err}"),
            Self::InvalidConfig(message) => write!(f, "invalid remote configuration: {message}"),
        }
    }
}

impl Error for RemoteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidId(err) => Some(err),
            _ => None,
        }
    }
}

impl RemoteError {
    /// Short machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "remote_unavailable",
            Self::PermissionDenied(_) => "remote_permission_denied",
            Self::NotFound(_) => "remote_not_found",
            Self::Status { .. } => "remote_status",
            Self::Decode(_) => "remote_decode",
            Self::InvalidId(_) => "remote_invalid_id",
            Self::InvalidConfig(_) => "remote_invalid_config",
        }
    }
}

/// Timestamp predicate for incremental remote queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFilter {
    /// `timestamp > cursor`.
    After(i64),
    /// `timestamp >= cursor`.
    AtOrAfter(i64),
}

impl TimestampFilter {
    pub fn cursor(self) -> i64 {
        match self {
            Self::After(cursor) | Self::AtOrAfter(cursor) => cursor,
        }
    }

    pub fn matches(self, timestamp: i64) -> bool {
        match self {
            Self::After(cursor) => timestamp > cursor,
            Self::AtOrAfter(cursor) => timestamp >= cursor,
        }
    }
}

/// Authoritative document store holding the `items` collection.
pub trait RemoteStore {
    /// Adds a document and returns its server-assigned id.
    fn create(&self, fields: &ItemFields) -> RemoteResult<ItemId>;
    /// Returns every document in the collection.
    fn list_all(&self) -> RemoteResult<Vec<Item>>;
    /// Returns documents whose timestamp matches `filter`.
    fn list_where(&self, filter: TimestampFilter) -> RemoteResult<Vec<Item>>;
    /// Overwrites name and timestamp of an existing document.
    fn update(&self, id: &str, fields: &ItemFields) -> RemoteResult<()>;
    /// Deletes a document; deleting a missing document succeeds.
    fn delete(&self, id: &str) -> RemoteResult<()>;
}
