//! Connection manager for the real-time channel.
//!
//! One background task owns the [`Transport`]. Everything the dispatcher and
//! that task both touch (connection state, outbound queue, live sender) sits
//! behind a single mutex in [`Shared`], which is never held across an await.
//!
//! On open, the queue is drained into the live channel and the state flips
//! to [`ConnectionState::Open`] inside one critical section, so every event
//! dispatched after the open is written after the drained backlog.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, info, warn};
use reqwest::Url;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use warroom_protocol::Envelope;

use crate::config::ReconnectConfig;
use crate::error::WarroomResult;
use crate::queue::OutboundQueue;
use crate::stats::{DeliveryStats, Metrics};
use crate::transport::{Connector, Transport};

/// Upper bound on waiting for the remote to acknowledge a close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// State of the real-time channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Where transport selection sent an event.
#[derive(Debug)]
pub(crate) enum Route {
    /// Handed to the live writer.
    Live,
    /// Channel not open and a fallback exists: caller should try it.
    Fallback(Envelope),
    /// Appended to the outbound queue.
    Queued,
}

struct Inner {
    state: ConnectionState,
    queue: OutboundQueue,
    live: Option<mpsc::UnboundedSender<Envelope>>,
    closing: bool,
}

/// State shared between producers and the connection task.
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    metrics: Metrics,
    /// Events handed to the live writer but not yet written.
    in_flight: AtomicUsize,
    /// Set once no connection task is (or will be) running.
    finished: AtomicBool,
    shutdown: CancellationToken,
}

impl Shared {
    pub(crate) fn new(queue_capacity: Option<usize>, realtime: bool) -> Self {
        let state = if realtime {
            ConnectionState::Connecting
        } else {
            ConnectionState::Closed
        };
        Self {
            inner: Mutex::new(Inner {
                state,
                queue: OutboundQueue::new(queue_capacity),
                live: None,
                closing: false,
            }),
            metrics: Metrics::default(),
            in_flight: AtomicUsize::new(0),
            finished: AtomicBool::new(!realtime),
            shutdown: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    pub(crate) fn queued_events(&self) -> Vec<Envelope> {
        self.lock().queue.iter().cloned().collect()
    }

    pub(crate) fn stats(&self) -> DeliveryStats {
        let (state, queue_len) = {
            let inner = self.lock();
            (inner.state, inner.queue.len())
        };
        self.metrics.snapshot(state, queue_len)
    }

    /// Nothing queued and nothing waiting on the live writer.
    pub(crate) fn is_idle(&self) -> bool {
        self.lock().queue.is_empty() && self.in_flight.load(Ordering::Acquire) == 0
    }

    /// No connection task will ever drain the queue again.
    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Transport selection: live if open, else fallback if available,
    /// else queue.
    pub(crate) fn route(&self, envelope: Envelope, fallback_available: bool) -> Route {
        let mut inner = self.lock();
        let envelope = match self.send_live_locked(&mut inner, envelope) {
            Ok(()) => return Route::Live,
            Err(envelope) => envelope,
        };
        if fallback_available {
            return Route::Fallback(envelope);
        }
        self.enqueue_locked(&mut inner, envelope);
        Route::Queued
    }

    /// Queue an event whose fallback attempt failed. If the channel opened
    /// in the meantime the queue has already been drained, so the event
    /// goes out live instead.
    pub(crate) fn enqueue_or_send(&self, envelope: Envelope) -> Route {
        let mut inner = self.lock();
        match self.send_live_locked(&mut inner, envelope) {
            Ok(()) => Route::Live,
            Err(envelope) => {
                self.enqueue_locked(&mut inner, envelope);
                Route::Queued
            }
        }
    }

    fn send_live_locked(&self, inner: &mut Inner, envelope: Envelope) -> Result<(), Envelope> {
        if inner.state != ConnectionState::Open {
            return Err(envelope);
        }
        let Some(live) = inner.live.as_ref() else {
            return Err(envelope);
        };
        // Count before sending so the writer never decrements below zero.
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        match live.send(envelope) {
            Ok(()) => {
                self.metrics.record_live();
                Ok(())
            }
            Err(mpsc::error::SendError(envelope)) => {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                Err(envelope)
            }
        }
    }

    fn enqueue_locked(&self, inner: &mut Inner, envelope: Envelope) {
        let kind = envelope.kind();
        self.metrics.record_queued();
        if let Some(evicted) = inner.queue.enqueue(envelope) {
            self.metrics.record_dropped(1);
            warn!(
                "Outbound queue full ({} events), dropped oldest {} event",
                inner.queue.len(),
                evicted.kind()
            );
        }
        debug!("Queued {} event ({} pending)", kind, inner.queue.len());
    }

    fn set_connecting(&self) -> bool {
        let mut inner = self.lock();
        if inner.closing {
            return false;
        }
        inner.state = ConnectionState::Connecting;
        true
    }

    /// Drain the backlog into `live` and start accepting live sends.
    /// Returns `None` if the client was closed while connecting.
    fn open(&self, live: mpsc::UnboundedSender<Envelope>) -> Option<usize> {
        let mut inner = self.lock();
        if inner.closing {
            return None;
        }
        let backlog = inner.queue.drain();
        let count = backlog.len();
        inner.state = ConnectionState::Open;
        inner.live = Some(live);
        for envelope in backlog {
            // Cannot fail: the connection task holds the receiver.
            if let Err(envelope) = self.send_live_locked(&mut inner, envelope) {
                self.enqueue_locked(&mut inner, envelope);
            }
        }
        self.metrics.record_drained(count);
        Some(count)
    }

    /// Called by the writer once an event hit the wire.
    fn written(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Stop live sends and put every unwritten event back at the head of
    /// the queue, in order.
    fn mark_closed(
        &self,
        unwritten: Option<Envelope>,
        rx: Option<&mut mpsc::UnboundedReceiver<Envelope>>,
    ) {
        let mut inner = self.lock();
        inner.state = ConnectionState::Closed;
        inner.live = None;

        let mut leftovers: Vec<Envelope> = unwritten.into_iter().collect();
        if let Some(rx) = rx {
            rx.close();
            while let Ok(envelope) = rx.try_recv() {
                leftovers.push(envelope);
            }
        }
        if leftovers.is_empty() {
            return;
        }

        let count = leftovers.len();
        self.in_flight.fetch_sub(count, Ordering::AcqRel);
        self.metrics.record_requeued(count);
        let evicted = inner.queue.requeue_front(leftovers);
        if evicted > 0 {
            self.metrics.record_dropped(evicted);
            warn!("Outbound queue full, dropped {} oldest events", evicted);
        }
        debug!("Requeued {} unwritten events", count);
    }

    /// Explicit teardown. Idempotent.
    pub(crate) fn close(&self) {
        {
            let mut inner = self.lock();
            if inner.closing {
                return;
            }
            inner.closing = true;
            inner.state = ConnectionState::Closed;
            inner.live = None;
        }
        self.shutdown.cancel();
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// Owns the lifecycle of the real-time channel.
pub(crate) struct ConnectionManager {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    url: Url,
    reconnect: ReconnectConfig,
}

impl ConnectionManager {
    pub(crate) fn new(
        shared: Arc<Shared>,
        connector: Arc<dyn Connector>,
        url: Url,
        reconnect: ReconnectConfig,
    ) -> Self {
        Self {
            shared,
            connector,
            url,
            reconnect,
        }
    }

    /// Start connecting in the background.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let shutdown = self.shared.shutdown_token();
        let mut failures: u32 = 0;

        loop {
            if !self.shared.set_connecting() {
                break;
            }
            debug!("Connecting to war room at {}", self.url);

            let connected = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.connector.connect(&self.url) => result,
            };

            match connected {
                Ok(transport) => {
                    failures = 0;
                    self.serve(transport, &shutdown).await;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!("War room connection to {} failed: {}", self.url, e);
                    self.shared.mark_closed(None, None);
                }
            }

            if shutdown.is_cancelled() || !self.reconnect.allows(failures) {
                break;
            }

            let delay = self.reconnect.delay_for(failures.saturating_sub(1));
            info!(
                "Reconnecting to war room in {:?} (attempt {})",
                delay,
                failures + 1
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.mark_closed(None, None);
        self.shared.finish();
        debug!("Connection task for {} stopped", self.url);
    }

    /// Pump one open connection until it closes.
    async fn serve(&self, mut transport: Box<dyn Transport>, shutdown: &CancellationToken) {
        let (live_tx, mut live_rx) = mpsc::unbounded_channel::<Envelope>();

        let Some(backlog) = self.shared.open(live_tx) else {
            close_transport(transport.as_mut()).await;
            return;
        };
        info!(
            "Connected to war room at {} ({} queued events flushed)",
            self.url, backlog
        );

        let mut unwritten: Option<Envelope> = None;
        let reason = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    close_transport(transport.as_mut()).await;
                    break "closed by client".to_string();
                }
                next = live_rx.recv() => {
                    // The sender lives in `Shared` until `mark_closed`.
                    let Some(envelope) = next else {
                        break "live channel dropped".to_string();
                    };
                    let text = match encode(&envelope) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Dropping {} event: {}", envelope.kind(), e);
                            self.shared.written();
                            continue;
                        }
                    };
                    if let Err(e) = transport.send(text).await {
                        unwritten = Some(envelope);
                        break format!("send failed: {e}");
                    }
                    self.shared.written();
                }
                incoming = transport.recv() => match incoming {
                    Some(Ok(text)) => debug!("Ignoring inbound frame ({} bytes)", text.len()),
                    Some(Err(e)) => break format!("receive failed: {e}"),
                    None => break "closed by remote".to_string(),
                },
            }
        };

        self.shared.mark_closed(unwritten, Some(&mut live_rx));
        if shutdown.is_cancelled() {
            info!("War room connection closed");
        } else {
            warn!("War room connection lost: {}", reason);
        }
    }
}

fn encode(envelope: &Envelope) -> WarroomResult<String> {
    Ok(serde_json::to_string(envelope)?)
}

async fn close_transport(transport: &mut dyn Transport) {
    match tokio::time::timeout(CLOSE_TIMEOUT, transport.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Error while closing war room connection: {}", e),
        Err(_) => debug!("Timed out closing war room connection"),
    }
}
