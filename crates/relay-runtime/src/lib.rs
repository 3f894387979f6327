//! # relay-runtime
//!
//! Owns one live upstream streaming connection per registration and turns
//! its notification events into push gateway requests.
//!
//! - **[`manager`]**: [`ConnectionManager`], the identity key → connection
//!   registry with idempotent connect/disconnect.
//! - **[`stream`]**: [`StreamClient`], the per-connection state machine
//!   (connect, heartbeat, fixed-delay reconnect, clean-close teardown).
//! - **[`relay`]**: [`NotificationRelay`], eligibility, delivery, and
//!   gateway feedback handling.
//! - **[`push`]**: the [`PushGateway`] seam and its `reqwest` client.
//! - **[`reconcile`]**: startup reconnection of every stored registration.

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod event;
pub mod manager;
pub mod push;
pub mod reconcile;
pub mod relay;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use context::ConnectionContext;
pub use errors::RuntimeError;
pub use event::{EventError, NotificationId, StreamEvent, decode_frame};
pub use manager::{ConnectOutcome, ConnectionManager, Teardown};
pub use push::{FcmClient, PushError, PushGateway, PushMessage, PushResponse, PushResult};
pub use reconcile::{ReconcileReport, reconcile};
pub use relay::NotificationRelay;
pub use stream::{StreamClient, StreamConfig, StreamState, streaming_url};
