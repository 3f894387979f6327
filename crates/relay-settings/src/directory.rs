//! App and instance lookup tables.
//!
//! `app_map.json` maps an application id to its push credential:
//!
//! ```json
//! { "tusky": { "firebase_key": "AAAA…" } }
//! ```
//!
//! `instance_map.json` maps an instance URL to an opaque policy object.
//! A `"*"` entry, when present, applies to every instance not listed.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::{DirectoryError, Result};

/// Wildcard key in the instance map.
pub const WILDCARD_INSTANCE: &str = "*";

/// One application entry.
#[derive(Clone, Default, Deserialize)]
pub struct AppEntry {
    /// Push gateway credential for this application.
    #[serde(default)]
    pub firebase_key: Option<String>,
}

impl fmt::Debug for AppEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppEntry")
            .field("firebase_key", &self.firebase_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Opaque per-instance policy.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct InstancePolicy(pub Map<String, Value>);

/// Both lookup tables, loaded once at startup.
#[derive(Clone, Debug, Default)]
pub struct Directory {
    apps: HashMap<String, AppEntry>,
    instances: HashMap<String, InstancePolicy>,
}

impl Directory {
    /// Build a directory from already-parsed tables.
    pub fn new(
        apps: HashMap<String, AppEntry>,
        instances: HashMap<String, InstancePolicy>,
    ) -> Self {
        Self { apps, instances }
    }

    /// Parse both tables from JSON text.
    pub fn from_json(app_map: &str, instance_map: &str) -> Result<Self> {
        let apps = serde_json::from_str(app_map)?;
        let instances = serde_json::from_str(instance_map)?;
        Ok(Self::new(apps, instances))
    }

    /// Read and parse both tables from disk.
    pub fn load(app_map_path: &Path, instance_map_path: &Path) -> Result<Self> {
        let app_map = std::fs::read_to_string(app_map_path)?;
        let instance_map = std::fs::read_to_string(instance_map_path)?;
        let directory = Self::from_json(&app_map, &instance_map)?;
        debug!(
            apps = directory.apps.len(),
            instances = directory.instances.len(),
            wildcard = directory.instances.contains_key(WILDCARD_INSTANCE),
            "directory loaded"
        );
        Ok(directory)
    }

    /// Resolve an application id to its push credential.
    pub fn resolve_app_key(&self, app_id: Option<&str>) -> std::result::Result<&str, DirectoryError> {
        let app_id = non_empty(app_id).ok_or(DirectoryError::MissingField("app_id"))?;
        let entry = self
            .apps
            .get(app_id)
            .ok_or_else(|| DirectoryError::UnknownApp(app_id.to_string()))?;
        entry
            .firebase_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DirectoryError::MissingAppKey(app_id.to_string()))
    }

    /// Resolve an instance URL to its policy, falling back to the wildcard.
    pub fn resolve_instance(
        &self,
        instance_url: Option<&str>,
    ) -> std::result::Result<&InstancePolicy, DirectoryError> {
        let url = non_empty(instance_url).ok_or(DirectoryError::MissingField("instance_url"))?;
        self.instances
            .get(url)
            .or_else(|| self.instances.get(WILDCARD_INSTANCE))
            .ok_or_else(|| DirectoryError::UnknownInstance(url.to_string()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
