//! Connection manager: the single authority over connection lifecycle.
//!
//! Holds the identity key → connection registry. Registry access is
//! sharded by key (`DashMap`), so calls for the same key serialize while
//! different keys proceed in parallel.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relay_core::{IdentityKey, Registration};
use relay_store::RegistrationStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::context::ConnectionContext;
use crate::errors::RuntimeError;
use crate::push::PushGateway;
use crate::relay::NotificationRelay;
use crate::stream::{StreamClient, StreamConfig, StreamState, streaming_url};

/// How long [`ConnectionManager::shutdown`] waits for clients to close.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Full teardown of a registration: stop its connection and delete it.
pub trait Teardown: Send + Sync {
    /// Tear `registration` down. Failures are logged by the implementor.
    fn teardown(&self, registration: &Registration);
}

/// Result of [`ConnectionManager::ensure_connected`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new stream client was started.
    Started,
    /// A connection already existed for the identity key.
    AlreadyConnected,
}

struct ConnectionHandle {
    registration_id: i64,
    cancel: CancellationToken,
    state: watch::Receiver<StreamState>,
    task: JoinHandle<()>,
}

/// Maps identity keys to live stream clients.
pub struct ConnectionManager {
    store: Arc<dyn RegistrationStore>,
    relay: Arc<NotificationRelay>,
    config: StreamConfig,
    connections: DashMap<IdentityKey, ConnectionHandle>,
    this: Weak<ConnectionManager>,
}

impl ConnectionManager {
    /// Build a manager and the relay it feeds.
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        gateway: Arc<dyn PushGateway>,
        config: StreamConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let teardown: Weak<dyn Teardown> = this.clone();
            Self {
                relay: Arc::new(NotificationRelay::new(
                    Arc::clone(&store),
                    gateway,
                    teardown,
                )),
                store,
                config,
                connections: DashMap::new(),
                this: this.clone(),
            }
        })
    }

    /// Start a stream client for `registration` unless one already exists
    /// for its identity key.
    pub fn ensure_connected(
        &self,
        registration: Registration,
    ) -> Result<ConnectOutcome, RuntimeError> {
        let key = registration.identity();
        match self.connections.entry(key.clone()) {
            Entry::Occupied(_) => {
                info!(key = %key, "already registered");
                Ok(ConnectOutcome::AlreadyConnected)
            }
            Entry::Vacant(slot) => {
                let url = streaming_url(
                    &registration.instance_url,
                    &self.config.streaming_path,
                    &registration.access_token,
                )?;
                info!(key = %key, "new registration");
                let registration_id = registration.id;

                let cancel = CancellationToken::new();
                let teardown: Weak<dyn Teardown> = self.this.clone();
                let (client, state) = StreamClient::new(
                    ConnectionContext::new(registration),
                    url,
                    self.config.clone(),
                    Arc::clone(&self.relay),
                    teardown,
                    cancel.clone(),
                );
                let span = info_span!("stream", key = %key);
                let task = tokio::spawn(client.run().instrument(span));
                let _ = slot.insert(ConnectionHandle {
                    registration_id,
                    cancel,
                    state,
                    task,
                });
                Ok(ConnectOutcome::Started)
            }
        }
    }

    /// Stop the connection for `registration`, if any, and delete the
    /// registration from the store either way.
    ///
    /// A connection started for a different row with the same identity key
    /// is left running.
    ///
    /// After this returns the stream client makes no further attempts; its
    /// task may still be sending the close frame.
    pub fn ensure_disconnected(&self, registration: &Registration) -> Result<(), RuntimeError> {
        let key = registration.identity();
        let removed = self
            .connections
            .remove_if(&key, |_, handle| handle.registration_id == registration.id);
        if let Some((_, handle)) = removed {
            handle.cancel.cancel();
            info!(key = %key, "connection removed");
        }
        let _ = self.store.delete(registration.id)?;
        info!(key = %key, "registration destroyed");
        Ok(())
    }

    /// Stop every connection without touching stored registrations.
    pub async fn shutdown(&self) {
        let keys: Vec<IdentityKey> = self.connections.iter().map(|e| e.key().clone()).collect();
        let mut tasks = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, handle)) = self.connections.remove(&key) {
                handle.cancel.cancel();
                tasks.push(handle.task);
            }
        }
        let count = tasks.len();
        if tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            warn!(count, "stream clients did not stop within grace period");
        }
        info!(count, "all connections stopped");
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether a connection exists for `key`.
    pub fn is_connected(&self, key: &IdentityKey) -> bool {
        self.connections.contains_key(key)
    }

    /// Current stream state for `key`.
    pub fn state(&self, key: &IdentityKey) -> Option<StreamState> {
        self.connections.get(key).map(|h| *h.state.borrow())
    }

    /// Subscribe to state changes for `key`.
    pub fn subscribe(&self, key: &IdentityKey) -> Option<watch::Receiver<StreamState>> {
        self.connections.get(key).map(|h| h.state.clone())
    }
}

impl Teardown for ConnectionManager {
    fn teardown(&self, registration: &Registration) {
        if let Err(e) = self.ensure_disconnected(registration) {
            error!(key = %registration.identity(), error = %e, "teardown failed");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
