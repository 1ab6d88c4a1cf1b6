//! Process exit codes for `itemsync`.
//!
//! - **0**: success
//! - **1**: generic failure
//! - **10-19**: input and lookup errors
//! - **20-29**: remote store errors

use itemsync_core::{ItemServiceError, RemoteError};

pub mod codes {
    pub const SUCCESS: u8 = 0;
    /// Fallback for errors that fit no other category.
    pub const GENERIC_ERROR: u8 = 1;
    /// Invalid arguments or configuration.
    pub const VALIDATION_ERROR: u8 = 10;
    /// Remote store rejected the caller.
    pub const PERMISSION_DENIED: u8 = 11;
    /// Referenced item does not exist.
    pub const NOT_FOUND: u8 = 12;
    /// Remote store could not be reached.
    pub const REMOTE_UNAVAILABLE: u8 = 20;
    /// Remote store answered with an unexpected status or payload.
    pub const REMOTE_ERROR: u8 = 21;
}

/// Maps a service error to its exit code.
pub fn for_service_error(err: &ItemServiceError) -> u8 {
    match err {
        ItemServiceError::InvalidInput(_) => codes::VALIDATION_ERROR,
        ItemServiceError::Remote(remote) => for_remote_error(remote),
        ItemServiceError::Cache(_) | ItemServiceError::MirrorFailed { .. } => {
            codes::GENERIC_ERROR
        }
    }
}

/// Maps a remote error to its exit code.
pub fn for_remote_error(err: &RemoteError) -> u8 {
    match err {
        RemoteError::Unavailable(_) => codes::REMOTE_UNAVAILABLE,
        RemoteError::PermissionDenied(_) => codes::PERMISSION_DENIED,
        RemoteError::NotFound(_) => codes::NOT_FOUND,
        RemoteError::InvalidId(_) | RemoteError::InvalidConfig(_) => codes::VALIDATION_ERROR,
        RemoteError::Status { .. } | RemoteError::Decode(_) => codes::REMOTE_ERROR,
    }
}
