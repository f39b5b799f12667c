//! One-shot fallback delivery over HTTP.
//!
//! Stateless: a failed attempt is reported to the caller, which decides
//! whether to queue. No retries happen here.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Url};
use warroom_protocol::Envelope;

use crate::error::{WarroomError, WarroomResult};

/// A secondary, connectionless delivery path.
#[async_trait]
pub trait FallbackSender: Send + Sync {
    /// Make a single delivery attempt.
    async fn try_send(&self, envelope: &Envelope) -> WarroomResult<()>;
}

/// Posts envelopes to `<server>/api/events`.
#[derive(Debug, Clone)]
pub struct HttpFallback {
    /// HTTP client.
    client: Client,
    /// Events endpoint.
    url: Url,
    /// Bound on a single attempt.
    timeout: Duration,
}

impl HttpFallback {
    pub fn new(url: Url, timeout: Duration) -> WarroomResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl FallbackSender for HttpFallback {
    async fn try_send(&self, envelope: &Envelope) -> WarroomResult<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(envelope)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WarroomError::FallbackTimeout(self.timeout)
                } else {
                    WarroomError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WarroomError::FallbackStatus(status));
        }

        debug!("Delivered {} event via {}", envelope.kind(), self.url);
        Ok(())
    }
}
