//! # relay-settings
//!
//! Configuration for the push relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `db/settings.json` unless overridden (deep-merged over defaults)
//! 3. **Environment variables**: `PORT` and `RELAY_*` overrides (highest priority)
//!
//! The [`Directory`] holds the two lookup tables the registration endpoints
//! resolve against: application id → push credential, and instance URL →
//! instance policy (with a `*` wildcard fallback).

#![deny(unsafe_code)]

pub mod directory;
pub mod errors;
pub mod loader;
pub mod types;

pub use directory::{AppEntry, Directory, InstancePolicy};
pub use errors::{DirectoryError, Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path};
pub use types::*;
