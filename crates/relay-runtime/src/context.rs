//! Per-connection context handed to every stream and relay handler.

use std::sync::Arc;

use parking_lot::RwLock;
use relay_core::{IdentityKey, Registration};

/// Identity key plus a shared, read-mostly view of the registration.
///
/// The only in-place mutation is recording a gateway-supplied replacement
/// delivery address, which never changes the identity key.
#[derive(Clone, Debug)]
pub struct ConnectionContext {
    key: IdentityKey,
    registration: Arc<RwLock<Registration>>,
}

impl ConnectionContext {
    /// Wrap a stored registration.
    pub fn new(registration: Registration) -> Self {
        Self {
            key: registration.identity(),
            registration: Arc::new(RwLock::new(registration)),
        }
    }

    /// The identity key of this connection.
    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    /// A copy of the current registration.
    pub fn snapshot(&self) -> Registration {
        self.registration.read().clone()
    }

    /// Current delivery address.
    pub fn delivery_target(&self) -> String {
        self.registration.read().delivery_target().to_string()
    }

    /// Push gateway credential.
    pub fn app_key(&self) -> String {
        self.registration.read().app_key.clone()
    }

    /// Record a replacement delivery address.
    pub fn set_device_token_updated(&self, token: &str) {
        self.registration.write().device_token_updated = Some(token.to_string());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
