//! Test utilities: in-memory transports and a fake war room server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use warroom::{
    Client, ClientConfig, ConnectionState, Connector, Envelope, EventPayload, FallbackSender,
    Transport, WarroomError, WarroomResult,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// Config with both transports switched off.
pub fn offline_config() -> ClientConfig {
    let mut config = ClientConfig::new("hack-room", "amadeus");
    config.realtime.enabled = false;
    config.fallback.enabled = false;
    config
}

/// Config with the real-time channel on and no fallback.
pub fn realtime_only_config() -> ClientConfig {
    let mut config = ClientConfig::new("hack-room", "amadeus");
    config.fallback.enabled = false;
    config
}

/// Config with both transports on.
pub fn full_config() -> ClientConfig {
    ClientConfig::new("hack-room", "amadeus")
}

/// Poll `condition` until it holds or `WAIT` elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub async fn wait_for_state(client: &Client, state: ConnectionState) {
    assert!(
        eventually(|| client.state() == state).await,
        "client never reached {state:?}, stuck in {:?}",
        client.state()
    );
}

/// Receive `count` frames written to an in-memory transport.
pub async fn recv_frames(rx: &mut mpsc::UnboundedReceiver<String>, count: usize) -> Vec<Value> {
    let mut frames = Vec::with_capacity(count);
    while frames.len() < count {
        let text = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("transport dropped");
        frames.push(serde_json::from_str(&text).unwrap());
    }
    frames
}

pub fn message_content(envelope: &Envelope) -> String {
    match &envelope.payload {
        EventPayload::TimelineMessage { content, .. } => content.clone(),
        other => panic!("expected timeline message, got {other:?}"),
    }
}

// ============================================================================
// In-memory real-time channel
// ============================================================================

/// Connector whose connections only succeed once the gate is released.
///
/// Every frame written to any connection lands on the receiver returned by
/// [`GatedConnector::new`].
pub struct GatedConnector {
    gate: watch::Sender<bool>,
    frames: mpsc::UnboundedSender<String>,
    attempts: AtomicUsize,
    /// Number of initial attempts that fail outright.
    fail_first: usize,
    current: Mutex<Option<CancellationToken>>,
    urls: Mutex<Vec<String>>,
}

impl GatedConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        Self::failing_first(0)
    }

    pub fn failing_first(fail_first: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (gate, _) = watch::channel(false);
        let (frames, rx) = mpsc::unbounded_channel();
        let connector = Self {
            gate,
            frames,
            attempts: AtomicUsize::new(0),
            fail_first,
            current: Mutex::new(None),
            urls: Mutex::new(Vec::new()),
        };
        (Arc::new(connector), rx)
    }

    /// Let pending and future connection attempts succeed.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Simulate the remote dropping the current connection.
    pub fn drop_connection(&self) {
        if let Some(token) = self.current.lock().unwrap().take() {
            token.cancel();
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for GatedConnector {
    async fn connect(&self, url: &Url) -> WarroomResult<Box<dyn Transport>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        if attempt < self.fail_first {
            return Err(WarroomError::ConnectionClosed);
        }

        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(WarroomError::ConnectionClosed);
        }

        let remote = CancellationToken::new();
        *self.current.lock().unwrap() = Some(remote.clone());
        Ok(Box::new(ChannelTransport {
            frames: self.frames.clone(),
            remote,
        }))
    }
}

/// Transport that forwards written frames to a channel.
pub struct ChannelTransport {
    frames: mpsc::UnboundedSender<String>,
    remote: CancellationToken,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, text: String) -> WarroomResult<()> {
        if self.remote.is_cancelled() {
            return Err(WarroomError::ConnectionClosed);
        }
        self.frames
            .send(text)
            .map_err(|_| WarroomError::ConnectionClosed)
    }

    async fn recv(&mut self) -> Option<WarroomResult<String>> {
        self.remote.cancelled().await;
        None
    }

    async fn close(&mut self) -> WarroomResult<()> {
        self.remote.cancel();
        Ok(())
    }
}

/// Connector that can never reach the war room.
pub struct UnreachableConnector;

#[async_trait]
impl Connector for UnreachableConnector {
    async fn connect(&self, _url: &Url) -> WarroomResult<Box<dyn Transport>> {
        Err(WarroomError::ConnectionClosed)
    }
}

// ============================================================================
// Fallback
// ============================================================================

/// Fallback that records attempts and accepts, rejects or hangs.
pub struct RecordingFallback {
    mode: FallbackMode,
    attempts: Mutex<Vec<Envelope>>,
}

#[derive(Debug, Clone, Copy)]
pub enum FallbackMode {
    Accept,
    Reject,
    /// Reject once the delay has passed.
    RejectAfter(Duration),
    Hang,
}

impl RecordingFallback {
    pub fn new(mode: FallbackMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> Vec<Envelope> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl FallbackSender for RecordingFallback {
    async fn try_send(&self, envelope: &Envelope) -> WarroomResult<()> {
        self.attempts.lock().unwrap().push(envelope.clone());
        match self.mode {
            FallbackMode::Accept => Ok(()),
            FallbackMode::Reject => Err(WarroomError::FallbackStatus(
                reqwest::StatusCode::SERVICE_UNAVAILABLE,
            )),
            FallbackMode::RejectAfter(delay) => {
                tokio::time::sleep(delay).await;
                Err(WarroomError::FallbackStatus(
                    reqwest::StatusCode::SERVICE_UNAVAILABLE,
                ))
            }
            FallbackMode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

// ============================================================================
// Fake war room server
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Via {
    Live,
    Fallback,
}

#[derive(Clone, Default)]
struct RoomState {
    received: Arc<Mutex<Vec<(Via, Value)>>>,
    connections: Arc<Mutex<Vec<HashMap<String, String>>>>,
    fallback_status: Arc<AtomicU16>,
    fallback_attempts: Arc<AtomicUsize>,
}

/// In-process war room: WebSocket at `/api/ws`, HTTP at `/api/events`.
pub struct FakeWarRoom {
    addr: SocketAddr,
    state: RoomState,
    task: tokio::task::JoinHandle<()>,
}

impl FakeWarRoom {
    pub async fn start() -> Self {
        let state = RoomState::default();
        state.fallback_status.store(200, Ordering::SeqCst);

        let app = Router::new()
            .route("/api/ws", get(ws_handler))
            .route("/api/events", post(events_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, task }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Status code `/api/events` answers with.
    pub fn set_fallback_status(&self, status: u16) {
        self.state.fallback_status.store(status, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<(Via, Value)> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn received_via(&self, via: Via) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|(v, _)| *v == via)
            .map(|(_, value)| value)
            .collect()
    }

    pub fn connections(&self) -> Vec<HashMap<String, String>> {
        self.state.connections.lock().unwrap().clone()
    }

    pub fn fallback_attempts(&self) -> usize {
        self.state.fallback_attempts.load(Ordering::SeqCst)
    }
}

impl Drop for FakeWarRoom {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<RoomState>,
) -> Response {
    state.connections.lock().unwrap().push(params);
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: RoomState) {
    while let Some(Ok(message)) = socket.recv().await {
        if let Message::Text(text) = message {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            state.received.lock().unwrap().push((Via::Live, value));
        }
    }
}

async fn events_handler(State(state): State<RoomState>, Json(body): Json<Value>) -> StatusCode {
    state.fallback_attempts.fetch_add(1, Ordering::SeqCst);
    let status = StatusCode::from_u16(state.fallback_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_success() {
        state.received.lock().unwrap().push((Via::Fallback, body));
    }
    status
}
