//! Event dispatcher: the single entry point for every producer.
//!
//! Stamps the envelope, picks a transport and never reports failure back to
//! the caller. Every event ends up written live, accepted by the fallback, or
//! sitting in the outbound queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use tokio_util::sync::DropGuard;
use warroom_protocol::{Envelope, EventPayload};

use crate::connection::{Route, Shared};
use crate::error::WarroomError;
use crate::fallback::FallbackSender;
use crate::session::Session;

pub(crate) struct Dispatcher {
    session: Session,
    shared: Arc<Shared>,
    fallback: Option<Arc<dyn FallbackSender>>,
    fallback_timeout: Duration,
    /// Stops the connection task once the last producer handle is gone.
    _shutdown: DropGuard,
}

impl Dispatcher {
    pub(crate) fn new(
        session: Session,
        shared: Arc<Shared>,
        fallback: Option<Arc<dyn FallbackSender>>,
        fallback_timeout: Duration,
    ) -> Self {
        let shutdown = shared.shutdown_token().drop_guard();
        Self {
            session,
            shared,
            fallback,
            fallback_timeout,
            _shutdown: shutdown,
        }
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Stamp routing metadata. The timestamp is taken here, at dispatch.
    fn enrich(&self, payload: EventPayload) -> Envelope {
        Envelope::new(
            payload,
            self.session.room(),
            self.session.member(),
            Utc::now().timestamp_millis(),
        )
    }

    pub(crate) async fn dispatch(&self, payload: EventPayload) {
        let envelope = self.enrich(payload);
        let kind = envelope.kind();

        let envelope = match self.shared.route(envelope, self.fallback.is_some()) {
            Route::Live | Route::Queued => return,
            Route::Fallback(envelope) => envelope,
        };
        let Some(fallback) = self.fallback.as_ref() else {
            // `route` only asks for a fallback when one is configured.
            self.shared.enqueue_or_send(envelope);
            return;
        };

        let attempt = tokio::time::timeout(self.fallback_timeout, fallback.try_send(&envelope))
            .await
            .unwrap_or_else(|_| Err(WarroomError::FallbackTimeout(self.fallback_timeout)));

        match attempt {
            Ok(()) => {
                self.shared.metrics().record_fallback();
                debug!("Sent {} event via fallback", kind);
            }
            Err(e) => {
                self.shared.metrics().record_fallback_failure();
                match self.shared.enqueue_or_send(envelope) {
                    Route::Live => debug!(
                        "Fallback for {} event failed ({}), channel opened meanwhile",
                        kind, e
                    ),
                    _ => warn!("Fallback for {} event failed, queued: {}", kind, e),
                }
            }
        }
    }
}
