//! Stream client: one upstream streaming socket per registration.
//!
//! ```text
//! Connecting ──open──▶ Connected ──error / abnormal close──▶ ReconnectPending
//!     ▲                    │                                       │
//!     └────────────────────┼──────────── fixed delay ──────────────┘
//!                          └──normal close──▶ Closing ──▶ Terminated
//! any state ──stop──▶ Terminated
//! ```
//!
//! Retries are unconditional: a fixed delay, no cap, no backoff. A stop
//! request interrupts every state, including the reconnect wait.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_settings::StreamSettings;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::context::ConnectionContext;
use crate::errors::RuntimeError;
use crate::manager::Teardown;
use crate::relay::NotificationRelay;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Observable state of a [`StreamClient`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Opening the socket.
    Connecting,
    /// Socket open; heartbeat running.
    Connected,
    /// Waiting out the reconnect delay.
    ReconnectPending,
    /// Remote closed cleanly; tearing the registration down.
    Closing,
    /// Finished. No further connection attempts.
    Terminated,
}

/// Timing and endpoint settings shared by every stream client.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Path of the streaming endpoint below the instance URL.
    pub streaming_path: String,
    /// Liveness probe interval while connected.
    pub heartbeat_interval: Duration,
    /// Fixed wait before each reconnect attempt.
    pub reconnect_delay: Duration,
}

impl StreamConfig {
    /// Build from settings.
    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self {
            streaming_path: settings.streaming_path.clone(),
            heartbeat_interval: settings.heartbeat_interval(),
            reconnect_delay: settings.reconnect_delay(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from_settings(&StreamSettings::default())
    }
}

/// Build the user-stream socket URL for an instance.
///
/// `https` maps to `wss` and `http` to `ws`; the streaming path is appended
/// to any path already on the instance URL.
pub fn streaming_url(
    instance_url: &str,
    streaming_path: &str,
    access_token: &str,
) -> Result<Url, RuntimeError> {
    let invalid = |reason: String| RuntimeError::InvalidInstanceUrl {
        url: instance_url.to_string(),
        reason,
    };

    let mut url = Url::parse(instance_url).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot switch to {scheme}")))?;

    let base = url.path().trim_end_matches('/').to_string();
    let path = format!("{base}/{}", streaming_path.trim_start_matches('/'));
    url.set_path(&path);
    url.set_fragment(None);
    let _ = url
        .query_pairs_mut()
        .clear()
        .append_pair("access_token", access_token)
        .append_pair("stream", "user");
    Ok(url)
}

enum PumpOutcome {
    /// Stop requested.
    Stopped,
    /// Remote sent a normal close.
    RemoteClosed,
    /// Transport error or abnormal close.
    Failed,
}

/// Drives one upstream socket through its lifecycle.
pub struct StreamClient {
    ctx: ConnectionContext,
    url: Url,
    config: StreamConfig,
    relay: Arc<NotificationRelay>,
    teardown: Weak<dyn Teardown>,
    cancel: CancellationToken,
    state: watch::Sender<StreamState>,
}

impl StreamClient {
    /// Create a client; returns it with a receiver for its state.
    pub fn new(
        ctx: ConnectionContext,
        url: Url,
        config: StreamConfig,
        relay: Arc<NotificationRelay>,
        teardown: Weak<dyn Teardown>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<StreamState>) {
        let (state, rx) = watch::channel(StreamState::Connecting);
        let client = Self {
            ctx,
            url,
            config,
            relay,
            teardown,
            cancel,
            state,
        };
        (client, rx)
    }

    /// Run until stopped or until the remote closes cleanly.
    pub async fn run(self) {
        loop {
            self.set_state(StreamState::Connecting);
            let connected = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                res = connect_async(self.url.as_str()) => res,
            };

            match connected {
                Ok((ws, _)) => {
                    info!("connected");
                    self.set_state(StreamState::Connected);
                    match self.pump(ws).await {
                        PumpOutcome::Stopped => break,
                        PumpOutcome::RemoteClosed => {
                            info!("remote server closed connection");
                            self.set_state(StreamState::Closing);
                            match self.teardown.upgrade() {
                                Some(teardown) => teardown.teardown(&self.ctx.snapshot()),
                                None => warn!("connection manager gone, skipping teardown"),
                            }
                            break;
                        }
                        PumpOutcome::Failed => {}
                    }
                }
                Err(e) => error!(error = %e, "connect failed"),
            }

            self.set_state(StreamState::ReconnectPending);
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
        self.set_state(StreamState::Terminated);
        debug!("stream client terminated");
    }

    async fn pump(&self, ws: WsStream) -> PumpOutcome {
        let (mut sink, mut source) = ws.split();
        // interval_at panics on a zero period
        let period = self.config.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: Utf8Bytes::from_static("unregistered"),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "close frame not sent");
                    }
                    return PumpOutcome::Stopped;
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = sink.send(Message::Ping(Vec::new().into())).await {
                        error!(error = %e, "heartbeat failed");
                        return PumpOutcome::Failed;
                    }
                }
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = self.relay.handle_frame(&self.ctx, text.as_str());
                    }
                    Some(Ok(Message::Close(Some(frame)))) if frame.code == CloseCode::Normal => {
                        return PumpOutcome::RemoteClosed;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code));
                        error!(code = ?code, "unexpected close");
                        return PumpOutcome::Failed;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!(len = data.len(), "dropping binary frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "stream error");
                        return PumpOutcome::Failed;
                    }
                    None => {
                        error!("stream ended without close");
                        return PumpOutcome::Failed;
                    }
                },
            }
        }
    }

    fn set_state(&self, state: StreamState) {
        let _ = self.state.send_replace(state);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use relay_core::Registration;
    use relay_core::logging::capture_logs;
    use relay_store::RegistrationStore;
    use serde_json::json;
    use tracing::Level;

    use super::*;
    use crate::push::PushGateway;
    use crate::testing::{
        MemoryStore, RecordingGateway, RecordingTeardown, TestUpstream, closed_port_url, stored,
        wait_for_state, wait_until,
    };

    // ── streaming_url ───────────────────────────────────────────────

    #[test]
    fn https_becomes_wss() {
        let url = streaming_url("https://m.example", "/api/v1/streaming/", "tok1").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://m.example/api/v1/streaming/?access_token=tok1&stream=user"
        );
    }

    #[test]
    fn http_becomes_ws_and_keeps_port_and_path() {
        let url = streaming_url("http://127.0.0.1:4000/masto/", "/api/v1/streaming/", "a b").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:4000/masto/api/v1/streaming/?access_token=a+b&stream=user"
        );
    }

    #[test]
    fn rejects_bad_instance_urls() {
        assert_matches!(
            streaming_url("m.example", "/s/", "t"),
            Err(RuntimeError::InvalidInstanceUrl { .. })
        );
        assert_matches!(
            streaming_url("ftp://m.example", "/s/", "t"),
            Err(RuntimeError::InvalidInstanceUrl { .. })
        );
    }

    // ── state machine ───────────────────────────────────────────────

    struct Harness {
        gateway: Arc<RecordingGateway>,
        teardown: Arc<RecordingTeardown>,
        cancel: CancellationToken,
        state: watch::Receiver<StreamState>,
        task: tokio::task::JoinHandle<()>,
        registration: Registration,
    }

    fn config(reconnect_ms: u64) -> StreamConfig {
        StreamConfig {
            streaming_path: "/api/v1/streaming/".into(),
            heartbeat_interval: Duration::from_millis(50),
            reconnect_delay: Duration::from_millis(reconnect_ms),
        }
    }

    fn start(instance_url: &str, config: StreamConfig) -> Harness {
        let store = Arc::new(MemoryStore::default());
        let gateway = Arc::new(RecordingGateway::default());
        let teardown = Arc::new(RecordingTeardown::default());
        let registration = stored(&store, instance_url);

        let store_dyn: Arc<dyn RegistrationStore> = store;
        let gateway_dyn: Arc<dyn PushGateway> = gateway.clone();
        let teardown_dyn: Arc<dyn Teardown> = teardown.clone();
        let relay = Arc::new(NotificationRelay::new(
            store_dyn,
            gateway_dyn,
            Arc::downgrade(&teardown_dyn),
        ));
        let url = streaming_url(instance_url, &config.streaming_path, "tok1").unwrap();
        let cancel = CancellationToken::new();
        let (client, state) = StreamClient::new(
            ConnectionContext::new(registration.clone()),
            url,
            config,
            relay,
            Arc::downgrade(&teardown_dyn),
            cancel.clone(),
        );
        Harness {
            gateway,
            teardown,
            cancel,
            state,
            task: tokio::spawn(client.run()),
            registration,
        }
    }

    #[tokio::test]
    async fn connects_to_user_stream_and_heartbeats() {
        let upstream = TestUpstream::start().await;
        let mut h = start(&upstream.instance_url(), config(5_000));

        wait_for_state(&mut h.state, StreamState::Connected).await;
        assert_eq!(
            upstream.request_uris(),
            vec!["/api/v1/streaming/?access_token=tok1&stream=user".to_string()]
        );
        wait_until(|| upstream.pings() >= 2).await;

        h.cancel.cancel();
        h.task.await.unwrap();
        assert_eq!(*h.state.borrow(), StreamState::Terminated);
    }

    #[tokio::test]
    async fn forwards_frames_in_order() {
        let upstream = TestUpstream::start().await;
        let mut h = start(&upstream.instance_url(), config(5_000));
        wait_for_state(&mut h.state, StreamState::Connected).await;

        upstream.send_text(r#"{"event":"update","payload":"{\"id\":1}"}"#);
        upstream.send_text(r#"{"event":"notification","payload":"{\"id\":42}"}"#);
        upstream.send_text("garbage");
        upstream.send_text(r#"{"event":"notification","payload":"{\"id\":43}"}"#);

        wait_until(|| h.gateway.sent().len() == 2).await;
        let mut ids: Vec<_> = h
            .gateway
            .sent()
            .iter()
            .map(|(_, m)| m.data.notification_id.0.clone())
            .collect();
        ids.sort_by_key(|v| v.as_i64());
        assert_eq!(ids, vec![json!(42), json!(43)]);
        assert_eq!(*h.state.borrow(), StreamState::Connected);

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn binary_frames_are_logged_and_dropped() {
        let upstream = TestUpstream::start().await;
        let (logs, _guard) = capture_logs();
        let mut h = start(&upstream.instance_url(), config(5_000));
        wait_for_state(&mut h.state, StreamState::Connected).await;

        upstream.send_binary(b"\x00\x01\x02");
        upstream.send_text(r#"{"event":"notification","payload":"{\"id\":7}"}"#);
        wait_until(|| h.gateway.sent().len() == 1).await;

        let dropped: Vec<_> = logs
            .events()
            .into_iter()
            .filter(|e| e.level == Level::WARN && e.message == "dropping binary frame")
            .collect();
        assert_eq!(dropped.len(), 1);
        assert!(dropped[0].fields.contains(&("len".to_string(), "3".to_string())));
        assert_eq!(*h.state.borrow(), StreamState::Connected);

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn zero_heartbeat_setting_still_runs() {
        let upstream = TestUpstream::start().await;
        let settings = StreamSettings {
            heartbeat_interval_ms: 0,
            reconnect_delay_ms: 0,
            ..StreamSettings::default()
        };
        let mut h = start(&upstream.instance_url(), StreamConfig::from_settings(&settings));
        wait_for_state(&mut h.state, StreamState::Connected).await;
        wait_until(|| upstream.pings() >= 1).await;

        upstream.send_text(r#"{"event":"notification","payload":"{\"id\":1}"}"#);
        wait_until(|| h.gateway.sent().len() == 1).await;
        assert!(!h.task.is_finished());

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn zero_heartbeat_config_is_floored() {
        let upstream = TestUpstream::start().await;
        let mut cfg = config(5_000);
        cfg.heartbeat_interval = Duration::ZERO;
        let mut h = start(&upstream.instance_url(), cfg);
        wait_for_state(&mut h.state, StreamState::Connected).await;
        wait_until(|| upstream.pings() >= 2).await;
        assert!(!h.task.is_finished());

        h.cancel.cancel();
        h.task.await.unwrap();
        assert_eq!(*h.state.borrow(), StreamState::Terminated);
    }

    #[tokio::test]
    async fn normal_remote_close_tears_down() {
        let upstream = TestUpstream::start().await;
        let mut h = start(&upstream.instance_url(), config(100));
        wait_for_state(&mut h.state, StreamState::Connected).await;

        upstream.close(CloseCode::Normal);
        h.task.await.unwrap();

        assert_eq!(*h.state.borrow(), StreamState::Terminated);
        let calls = h.teardown.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, h.registration.id);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(upstream.accepted(), 1);
    }

    #[tokio::test]
    async fn abnormal_close_reconnects_after_delay() {
        let upstream = TestUpstream::start().await;
        let mut h = start(&upstream.instance_url(), config(400));
        wait_for_state(&mut h.state, StreamState::Connected).await;

        upstream.close(CloseCode::Away);
        wait_for_state(&mut h.state, StreamState::ReconnectPending).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(upstream.accepted(), 1);

        wait_until(|| upstream.accepted() == 2).await;
        wait_for_state(&mut h.state, StreamState::Connected).await;
        assert!(h.teardown.calls().is_empty());

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn stop_interrupts_reconnect_wait() {
        let mut h = start(&closed_port_url().await, config(60_000));
        wait_for_state(&mut h.state, StreamState::ReconnectPending).await;

        h.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), h.task)
            .await
            .expect("stop should not wait for the reconnect delay")
            .unwrap();
        assert_eq!(*h.state.borrow(), StreamState::Terminated);
        assert!(h.teardown.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_sends_normal_close() {
        let upstream = TestUpstream::start().await;
        let mut h = start(&upstream.instance_url(), config(5_000));
        wait_for_state(&mut h.state, StreamState::Connected).await;

        h.cancel.cancel();
        h.task.await.unwrap();
        wait_until(|| upstream.close_codes() == vec![CloseCode::Normal]).await;
        assert_eq!(upstream.accepted(), 1);
    }
}
