//! Settings and directory error types.

use thiserror::Error;

/// Errors that can occur when loading or parsing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read a file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Validation failures when resolving registration input against the
/// directory. The display strings are returned verbatim to HTTP callers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// A required request field was absent or empty.
    #[error("missing {0}")]
    MissingField(&'static str),
    /// The application id has no entry in the app map.
    #[error("missing app configuration for app: {0}")]
    UnknownApp(String),
    /// The application entry has no push credential.
    #[error("missing firebase_key configuration for app: {0}")]
    MissingAppKey(String),
    /// The instance URL has no entry and no wildcard fallback exists.
    #[error("missing instance configuration for instance: {0}")]
    UnknownInstance(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
