//! Notification relay: decides which stream events reach the push gateway
//! and acts on the gateway's per-target feedback.
//!
//! Decoding and the forward/drop decision run inline on the connection task,
//! so they follow frame arrival order. The gateway call itself is spawned,
//! so a slow gateway never stalls heartbeats or frame processing.

use std::sync::{Arc, Weak};

use relay_core::text::redact_token;
use relay_store::RegistrationStore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::context::ConnectionContext;
use crate::manager::Teardown;
use crate::push::{Feedback, PushGateway, PushMessage, PushResponse};

/// Forwards notification events for every connection.
pub struct NotificationRelay {
    store: Arc<dyn RegistrationStore>,
    gateway: Arc<dyn PushGateway>,
    teardown: Weak<dyn Teardown>,
}

impl NotificationRelay {
    /// Build a relay. `teardown` is invoked when the gateway reports a
    /// device as no longer registered.
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        gateway: Arc<dyn PushGateway>,
        teardown: Weak<dyn Teardown>,
    ) -> Self {
        Self {
            store,
            gateway,
            teardown,
        }
    }

    /// Handle one inbound text frame.
    ///
    /// Returns the spawned delivery task when the frame was forwarded.
    pub fn handle_frame(
        self: &Arc<Self>,
        ctx: &ConnectionContext,
        text: &str,
    ) -> Option<JoinHandle<()>> {
        let event = match crate::event::decode_frame(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dropping frame");
                return None;
            }
        };
        info!(event = %event.kind, "new event");

        if !event.is_notification() {
            return None;
        }
        let notification_id = match event.notification_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "dropping notification");
                return None;
            }
        };

        let message = PushMessage::high_priority(ctx.delivery_target(), notification_id);
        let relay = Arc::clone(self);
        let ctx = ctx.clone();
        Some(tokio::spawn(
            async move { relay.deliver(&ctx, &message).await }.in_current_span(),
        ))
    }

    /// Send `message` and apply the gateway feedback.
    ///
    /// Gateway failures are logged and dropped.
    pub async fn deliver(&self, ctx: &ConnectionContext, message: &PushMessage) {
        match self.gateway.send(&ctx.app_key(), message).await {
            Ok(response) => {
                debug!(
                    success = response.success,
                    failure = response.failure,
                    canonical_ids = response.canonical_ids,
                    "push response"
                );
                self.apply_feedback(ctx, &response);
            }
            Err(e) => {
                error!(
                    error = %e,
                    notification_id = %message.data.notification_id,
                    "error sending to push gateway"
                );
            }
        }
    }

    fn apply_feedback(&self, ctx: &ConnectionContext, response: &PushResponse) {
        if !response.needs_attention() {
            return;
        }
        for result in &response.results {
            match result.feedback() {
                Some(Feedback::Replaced(token)) => self.replace_target(ctx, token),
                Some(Feedback::NotRegistered) => {
                    info!("device no longer registered");
                    match self.teardown.upgrade() {
                        Some(teardown) => teardown.teardown(&ctx.snapshot()),
                        None => warn!("connection manager gone, skipping teardown"),
                    }
                    break;
                }
                None => {}
            }
        }
    }

    fn replace_target(&self, ctx: &ConnectionContext, token: &str) {
        let id = ctx.snapshot().id;
        match self.store.set_device_token_updated(id, token) {
            Ok(true) => {
                ctx.set_device_token_updated(token);
                info!(device_token_updated = %redact_token(token), "device token replaced");
            }
            Ok(false) => debug!(id, "registration gone, replacement device token ignored"),
            Err(e) => error!(error = %e, "failed to store replacement device token"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
