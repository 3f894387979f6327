//! Push gateway seam and its HTTP client.
//!
//! The gateway speaks the legacy FCM HTTP protocol: a JSON body
//! `{to, priority, data}` authorized by `Authorization: key=<app key>`, and
//! a response with `failure`/`canonical_ids` counts plus per-target
//! `results`.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::text::redact_token;
use relay_settings::PushSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::event::NotificationId;

/// Delivery hint sent with every message.
pub const HIGH_PRIORITY: &str = "high";

/// Gateway error kind signalling the target device is gone.
pub const NOT_REGISTERED: &str = "NotRegistered";

/// Errors from a gateway request.
#[derive(Debug, Error)]
pub enum PushError {
    /// Connection, TLS, or timeout failure.
    #[error("push transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The gateway answered with a non-success status.
    #[error("push gateway returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The success body is not a gateway response.
    #[error("malformed push response: {source}")]
    Decode {
        /// Parse failure.
        #[source]
        source: serde_json::Error,
        /// Raw body.
        body: String,
    },
}

/// Data payload: only the notification id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PushData {
    /// Opaque id from the upstream event.
    pub notification_id: NotificationId,
}

/// One outbound push request body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PushMessage {
    /// Delivery address.
    pub to: String,
    /// Delivery hint.
    pub priority: &'static str,
    /// Data payload.
    pub data: PushData,
}

impl PushMessage {
    /// A high-priority message for `to` carrying `notification_id`.
    pub fn high_priority(to: impl Into<String>, notification_id: NotificationId) -> Self {
        Self {
            to: to.into(),
            priority: HIGH_PRIORITY,
            data: PushData { notification_id },
        }
    }
}

/// Per-target entry of a gateway response.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PushResult {
    /// Set when the message was accepted.
    pub message_id: Option<String>,
    /// Replacement delivery address, when the gateway has a newer one.
    pub registration_id: Option<String>,
    /// Failure kind.
    pub error: Option<String>,
}

/// What a result tells the relay to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Feedback<'a> {
    /// Delivered; future messages go to the given address.
    Replaced(&'a str),
    /// The device is gone.
    NotRegistered,
}

impl PushResult {
    /// Interpret this result, if it calls for any action.
    pub fn feedback(&self) -> Option<Feedback<'_>> {
        match (&self.message_id, &self.registration_id, &self.error) {
            (Some(_), Some(replacement), _) if !replacement.is_empty() => {
                Some(Feedback::Replaced(replacement))
            }
            (_, _, Some(error)) if error == NOT_REGISTERED => Some(Feedback::NotRegistered),
            _ => None,
        }
    }
}

/// Gateway response body.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PushResponse {
    /// Accepted count.
    pub success: u64,
    /// Failed count.
    pub failure: u64,
    /// Count of targets with a replacement address.
    pub canonical_ids: u64,
    /// Per-target results.
    pub results: Vec<PushResult>,
}

impl PushResponse {
    /// Whether the per-target results need inspecting.
    pub fn needs_attention(&self) -> bool {
        self.failure != 0 || self.canonical_ids != 0
    }
}

/// Something that delivers push messages.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Send one message authorized by `app_key`.
    async fn send(&self, app_key: &str, message: &PushMessage) -> Result<PushResponse, PushError>;
}

/// `reqwest` client for the FCM legacy HTTP endpoint.
#[derive(Clone, Debug)]
pub struct FcmClient {
    endpoint: String,
    client: reqwest::Client,
}

impl FcmClient {
    /// Build a client posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, PushError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    /// Build a client from settings.
    pub fn from_settings(settings: &PushSettings) -> Result<Self, PushError> {
        Self::new(
            settings.endpoint.clone(),
            Duration::from_millis(settings.timeout_ms),
        )
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send(&self, app_key: &str, message: &PushMessage) -> Result<PushResponse, PushError> {
        debug!(
            to = %redact_token(&message.to),
            notification_id = %message.data.notification_id,
            "push request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("key={app_key}"))
            .json(message)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PushError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(status = status.as_u16(), body = %body, "sent to push gateway");
        serde_json::from_str(&body).map_err(|source| PushError::Decode { source, body })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
