//! Registration rows and the identity key that deduplicates them.
//!
//! A [`Registration`] ties one upstream streaming account (`instance_url`,
//! `access_token`) to one push delivery address (`device_token`, `app_key`).
//! The four-field [`IdentityKey`] is what both the store and the connection
//! registry deduplicate on. `device_token_updated` is deliberately outside
//! the key: it changes where notifications go, never which connection owns
//! them.

use std::fmt;

use crate::text::redact_token;

/// The tuple that uniquely identifies a registration and its connection.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    /// Base URL of the upstream streaming service.
    pub instance_url: String,
    /// Credential for the upstream service.
    pub access_token: String,
    /// Delivery address given at registration time.
    pub device_token: String,
    /// Push gateway credential resolved from the app directory.
    pub app_key: String,
}

impl IdentityKey {
    /// Build a key from its four parts.
    pub fn new(
        instance_url: impl Into<String>,
        access_token: impl Into<String>,
        device_token: impl Into<String>,
        app_key: impl Into<String>,
    ) -> Self {
        Self {
            instance_url: instance_url.into(),
            access_token: access_token.into(),
            device_token: device_token.into(),
            app_key: app_key.into(),
        }
    }

    /// Log-safe label: instance URL and a device token prefix only.
    pub fn label(&self) -> String {
        format!(
            "{}:{}:***",
            self.instance_url,
            redact_token(&self.device_token)
        )
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKey")
            .field("instance_url", &self.instance_url)
            .field("access_token", &"***")
            .field("device_token", &redact_token(&self.device_token))
            .field("app_key", &"***")
            .finish()
    }
}

/// A persisted registration.
#[derive(Clone, PartialEq, Eq)]
pub struct Registration {
    /// Store row id.
    pub id: i64,
    /// Base URL of the upstream streaming service.
    pub instance_url: String,
    /// Credential for the upstream service.
    pub access_token: String,
    /// Push gateway credential.
    pub app_key: String,
    /// Delivery address at registration time.
    pub device_token: String,
    /// Replacement delivery address reported by the gateway, if any.
    pub device_token_updated: Option<String>,
    /// Epoch milliseconds of the last create/update.
    pub last_update: i64,
}

impl Registration {
    /// The identity key of this registration.
    pub fn identity(&self) -> IdentityKey {
        IdentityKey::new(
            self.instance_url.clone(),
            self.access_token.clone(),
            self.device_token.clone(),
            self.app_key.clone(),
        )
    }

    /// Where notifications are delivered: the gateway-supplied replacement
    /// when present, the original device token otherwise.
    pub fn delivery_target(&self) -> &str {
        self.device_token_updated
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.device_token)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("instance_url", &self.instance_url)
            .field("access_token", &"***")
            .field("app_key", &"***")
            .field("device_token", &redact_token(&self.device_token))
            .field(
                "device_token_updated",
                &self.device_token_updated.as_deref().map(redact_token),
            )
            .field("last_update", &self.last_update)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
