//! Runtime error types.

use relay_store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`ConnectionManager`](crate::ConnectionManager)
/// operations.
///
/// Transport and gateway failures never appear here: they are recovered or
/// dropped inside the connection task.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The registration's instance URL cannot be turned into a streaming URL.
    #[error("invalid instance url {url}: {reason}")]
    InvalidInstanceUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Registration store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
