//! Fakes and a loopback upstream server for runtime tests.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relay_core::{IdentityKey, Registration};
use relay_store::{FindOrCreate, RegistrationStore};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::manager::Teardown;
use crate::push::{PushError, PushGateway, PushMessage, PushResponse};
use crate::stream::StreamState;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

// ── registrations ──────────────────────────────────────────────────────────

pub(crate) fn registration(id: i64, instance_url: &str) -> Registration {
    Registration {
        id,
        instance_url: instance_url.into(),
        access_token: "tok1".into(),
        app_key: "key1".into(),
        device_token: "dev1".into(),
        device_token_updated: None,
        last_update: 0,
    }
}

/// Store the standard test registration for `instance_url`.
pub(crate) fn stored(store: &MemoryStore, instance_url: &str) -> Registration {
    let key = IdentityKey::new(instance_url, "tok1", "dev1", "key1");
    store
        .find_or_create(&key)
        .map(|r| r.registration)
        .unwrap()
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    rows: Mutex<Vec<Registration>>,
    next_id: AtomicI64,
    updates: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn get(&self, id: i64) -> Option<Registration> {
        self.rows.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Number of `set_device_token_updated` calls.
    pub(crate) fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl RegistrationStore for MemoryStore {
    fn find_or_create(&self, key: &IdentityKey) -> relay_store::Result<FindOrCreate> {
        let mut rows = self.rows.lock();
        if let Some(existing) = rows.iter().find(|r| r.identity() == *key) {
            return Ok(FindOrCreate {
                registration: existing.clone(),
                created: false,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut row = registration(id, &key.instance_url);
        row.access_token.clone_from(&key.access_token);
        row.device_token.clone_from(&key.device_token);
        row.app_key.clone_from(&key.app_key);
        rows.push(row.clone());
        Ok(FindOrCreate {
            registration: row,
            created: true,
        })
    }

    fn find(&self, key: &IdentityKey) -> relay_store::Result<Option<Registration>> {
        Ok(self.rows.lock().iter().find(|r| r.identity() == *key).cloned())
    }

    fn touch(&self, id: i64, last_update: i64) -> relay_store::Result<bool> {
        let mut rows = self.rows.lock();
        Ok(rows
            .iter_mut()
            .find(|r| r.id == id)
            .map(|r| r.last_update = last_update)
            .is_some())
    }

    fn set_device_token_updated(&self, id: i64, token: &str) -> relay_store::Result<bool> {
        let _ = self.updates.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock();
        Ok(rows
            .iter_mut()
            .find(|r| r.id == id)
            .map(|r| r.device_token_updated = Some(token.to_string()))
            .is_some())
    }

    fn delete(&self, id: i64) -> relay_store::Result<bool> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok(rows.len() != before)
    }

    fn list_all(&self) -> relay_store::Result<Vec<Registration>> {
        Ok(self.rows.lock().clone())
    }
}

// ── gateway / teardown ─────────────────────────────────────────────────────

/// Records every send; replies with queued responses, then plain success.
#[derive(Default)]
pub(crate) struct RecordingGateway {
    sent: Mutex<Vec<(String, PushMessage)>>,
    responses: Mutex<VecDeque<Result<PushResponse, PushError>>>,
}

impl RecordingGateway {
    pub(crate) fn respond(&self, response: Result<PushResponse, PushError>) {
        self.responses.lock().push_back(response);
    }

    pub(crate) fn sent(&self) -> Vec<(String, PushMessage)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send(&self, app_key: &str, message: &PushMessage) -> Result<PushResponse, PushError> {
        self.sent
            .lock()
            .push((app_key.to_string(), message.clone()));
        let queued = self.responses.lock().pop_front();
        queued.unwrap_or_else(|| {
            Ok(PushResponse {
                success: 1,
                ..PushResponse::default()
            })
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingTeardown {
    calls: Mutex<Vec<Registration>>,
}

impl RecordingTeardown {
    pub(crate) fn calls(&self) -> Vec<Registration> {
        self.calls.lock().clone()
    }
}

impl Teardown for RecordingTeardown {
    fn teardown(&self, registration: &Registration) {
        self.calls.lock().push(registration.clone());
    }
}

// ── waiting ────────────────────────────────────────────────────────────────

pub(crate) async fn wait_until(check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {WAIT_LIMIT:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub(crate) async fn wait_for_state(rx: &mut watch::Receiver<StreamState>, want: StreamState) {
    let reached = tokio::time::timeout(WAIT_LIMIT, async {
        rx.wait_for(|s| *s == want).await.map(|_| ())
    })
    .await;
    assert!(
        matches!(reached, Ok(Ok(()))),
        "state {want:?} not reached, last {:?}",
        *rx.borrow()
    );
}

/// `http://` URL of a local port with nothing listening.
pub(crate) async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// ── loopback upstream ──────────────────────────────────────────────────────

struct UpstreamShared {
    accepted: AtomicUsize,
    uris: Mutex<Vec<String>>,
    received: Mutex<Vec<Message>>,
    outbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
}

/// A streaming endpoint on localhost. Frames queued with [`send_text`] and
/// [`close`] go to whichever connection is current.
///
/// [`send_text`]: TestUpstream::send_text
/// [`close`]: TestUpstream::close
pub(crate) struct TestUpstream {
    addr: SocketAddr,
    shared: Arc<UpstreamShared>,
    outbound: mpsc::UnboundedSender<Message>,
    accept_loop: JoinHandle<()>,
}

impl TestUpstream {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (outbound, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(UpstreamShared {
            accepted: AtomicUsize::new(0),
            uris: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            outbound: tokio::sync::Mutex::new(rx),
        });
        let accept_shared = Arc::clone(&shared);
        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let _ = tokio::spawn(serve(stream, Arc::clone(&accept_shared)));
            }
        });
        Self {
            addr,
            shared,
            outbound,
            accept_loop,
        }
    }

    pub(crate) fn instance_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub(crate) fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    pub(crate) fn request_uris(&self) -> Vec<String> {
        self.shared.uris.lock().clone()
    }

    pub(crate) fn pings(&self) -> usize {
        self.shared
            .received
            .lock()
            .iter()
            .filter(|m| matches!(m, Message::Ping(_)))
            .count()
    }

    pub(crate) fn close_codes(&self) -> Vec<CloseCode> {
        self.shared
            .received
            .lock()
            .iter()
            .filter_map(|m| match m {
                Message::Close(Some(frame)) => Some(frame.code),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn send_text(&self, text: &str) {
        self.outbound.send(Message::Text(text.to_string().into())).unwrap();
    }

    pub(crate) fn send_binary(&self, data: &[u8]) {
        self.outbound.send(Message::Binary(data.to_vec().into())).unwrap();
    }

    pub(crate) fn close(&self, code: CloseCode) {
        let frame = CloseFrame {
            code,
            reason: Utf8Bytes::from_static("bye"),
        };
        self.outbound.send(Message::Close(Some(frame))).unwrap();
    }
}

impl Drop for TestUpstream {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

async fn serve(stream: TcpStream, shared: Arc<UpstreamShared>) {
    let uris = Arc::clone(&shared);
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        uris.uris.lock().push(req.uri().to_string());
        Ok(resp)
    };
    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    let _ = shared.accepted.fetch_add(1, Ordering::SeqCst);

    let (mut sink, mut source) = ws.split();
    let mut outbound = shared.outbound.lock().await;
    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(message) => {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = source.next() => match incoming {
                Some(Ok(message)) => {
                    let closing = message.is_close();
                    shared.received.lock().push(message);
                    if closing {
                        break;
                    }
                }
                _ => break,
            },
        }
    }
}
