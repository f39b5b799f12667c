//! Public client facade and agent handles.
//!
//! Producer operations (`register`, `message`, and the [`AgentRef`] methods)
//! never fail: delivery problems are absorbed and only show up in
//! [`Client::stats`] and the logs. A dashboard outage must not break the
//! agent's main loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use uuid::Uuid;
use warroom_protocol::{AgentLog, AgentStatus, Envelope, EventPayload, LogKind};

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState, Shared};
use crate::dispatcher::Dispatcher;
use crate::error::{WarroomError, WarroomResult};
use crate::fallback::{FallbackSender, HttpFallback};
use crate::session::Session;
use crate::stats::DeliveryStats;
use crate::transport::{Connector, WebSocketConnector};

/// How often [`Client::flush`] re-checks for outstanding events.
const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Builder for [`Client`] with pluggable transports.
pub struct ClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    fallback: Option<Arc<dyn FallbackSender>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connector: None,
            fallback: None,
        }
    }

    /// Use a custom real-time connector instead of the WebSocket one.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom fallback sender instead of HTTP.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackSender>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Validate the configuration and start connecting.
    ///
    /// Must be called from within a tokio runtime. The real-time channel is
    /// attempted eagerly, in the background.
    pub fn build(self) -> WarroomResult<Client> {
        self.config.validate()?;
        let session = Session::from_config(&self.config)?;

        let realtime = self.config.realtime.enabled;
        if realtime && tokio::runtime::Handle::try_current().is_err() {
            return Err(WarroomError::NoRuntime);
        }

        let fallback: Option<Arc<dyn FallbackSender>> = if self.config.fallback.enabled {
            match self.fallback {
                Some(custom) => Some(custom),
                None => Some(Arc::new(HttpFallback::new(
                    session.events_url(),
                    self.config.fallback.timeout(),
                )?)),
            }
        } else {
            None
        };

        let shared = Arc::new(Shared::new(self.config.queue.limit(), realtime));

        let task = if realtime {
            let connector: Arc<dyn Connector> = match self.connector {
                Some(custom) => custom,
                None => Arc::new(WebSocketConnector),
            };
            let manager = ConnectionManager::new(
                Arc::clone(&shared),
                connector,
                session.realtime_url()?,
                self.config.realtime.reconnect.clone(),
            );
            Some(manager.spawn())
        } else {
            debug!("Real-time channel disabled for room {}", session.room());
            None
        };

        info!(
            "War room client for room '{}' as '{}' (realtime: {}, fallback: {})",
            session.room(),
            session.member(),
            realtime,
            fallback.is_some()
        );

        let dispatcher = Dispatcher::new(
            session,
            shared,
            fallback,
            self.config.fallback.timeout(),
        );

        Ok(Client {
            dispatcher: Arc::new(dispatcher),
            config: self.config,
            task,
        })
    }
}

/// Connection to a war room.
///
/// Dropping the client (and every [`AgentRef`] it handed out) stops the
/// background connection task.
pub struct Client {
    dispatcher: Arc<Dispatcher>,
    config: ClientConfig,
    task: Option<JoinHandle<()>>,
}

impl Client {
    /// Create a client with the default WebSocket and HTTP transports.
    pub fn new(config: ClientConfig) -> WarroomResult<Self> {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        self.dispatcher.session()
    }

    /// Register a new agent on the war room canvas.
    ///
    /// The identifier is minted locally and usable immediately.
    pub async fn register(&self, name: impl Into<String>, total_steps: Option<u32>) -> AgentRef {
        let agent = AgentRef {
            dispatcher: Arc::clone(&self.dispatcher),
            agent_id: mint_agent_id(),
            name: name.into(),
            total_steps,
        };

        self.dispatcher
            .dispatch(EventPayload::AgentRegister {
                agent_id: agent.agent_id.clone(),
                name: agent.name.clone(),
                owner: self.session().member().to_string(),
                total_steps,
            })
            .await;

        agent
    }

    /// Handle for an agent registered earlier, e.g. by another process.
    /// Sends nothing.
    pub fn attach(&self, agent_id: impl Into<String>, name: impl Into<String>) -> AgentRef {
        AgentRef {
            dispatcher: Arc::clone(&self.dispatcher),
            agent_id: agent_id.into(),
            name: name.into(),
            total_steps: None,
        }
    }

    /// Send a message to the team timeline.
    pub async fn message(&self, content: impl Into<String>) {
        self.dispatcher
            .dispatch(EventPayload::TimelineMessage {
                actor: self.session().member().to_string(),
                content: content.into(),
            })
            .await;
    }

    /// Close the real-time channel. Safe to call more than once.
    ///
    /// Unwritten live events are returned to the queue; an in-flight
    /// fallback attempt is not interrupted.
    pub fn close(&self) {
        self.dispatcher.shared().close();
    }

    /// Wait until nothing is queued or pending on the live writer, for at
    /// most `timeout`. Returns `true` if everything was written.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let shared = self.dispatcher.shared();
        let settled = tokio::time::timeout(timeout, async {
            loop {
                if shared.is_idle() {
                    return true;
                }
                if shared.is_finished() && shared.state() == ConnectionState::Closed {
                    // Nobody will drain the queue any more.
                    return false;
                }
                tokio::time::sleep(FLUSH_POLL_INTERVAL).await;
            }
        })
        .await;
        settled.unwrap_or(false)
    }

    /// Close the client and wait for the background connection task to
    /// stop.
    pub async fn join(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.dispatcher.shared().state()
    }

    pub fn queue_len(&self) -> usize {
        self.dispatcher.shared().queue_len()
    }

    /// Snapshot of the queued events, oldest first.
    pub fn pending_events(&self) -> Vec<Envelope> {
        self.dispatcher.shared().queued_events()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.dispatcher.shared().stats()
    }
}

/// Client-side handle for an agent shown in the war room.
#[derive(Clone)]
pub struct AgentRef {
    dispatcher: Arc<Dispatcher>,
    agent_id: String,
    name: String,
    total_steps: Option<u32>,
}

impl AgentRef {
    pub fn id(&self) -> &str {
        &self.agent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_steps(&self) -> Option<u32> {
        self.total_steps
    }

    /// Update the agent's status on the canvas.
    pub async fn update(
        &self,
        status: impl Into<AgentStatus>,
        progress: Option<String>,
        cost: Option<f64>,
    ) {
        self.dispatcher
            .dispatch(EventPayload::AgentUpdate {
                agent_id: self.agent_id.clone(),
                status: status.into(),
                progress,
                cost,
            })
            .await;
    }

    /// Send an `output` log entry with no metadata.
    pub async fn log(&self, content: impl Into<String>) {
        self.log_with(content, LogKind::Output, Map::new()).await;
    }

    /// Send a log entry that appears in the agent inspector.
    pub async fn log_with(
        &self,
        content: impl Into<String>,
        kind: impl Into<LogKind>,
        metadata: Map<String, Value>,
    ) {
        let log = AgentLog {
            timestamp: Utc::now().timestamp_millis(),
            kind: kind.into(),
            content: content.into(),
            metadata,
        };
        self.dispatcher
            .dispatch(EventPayload::AgentLog {
                agent_id: self.agent_id.clone(),
                log,
            })
            .await;
    }

    /// Mark the agent as complete.
    pub async fn complete(&self) {
        self.dispatcher
            .dispatch(EventPayload::AgentComplete {
                agent_id: self.agent_id.clone(),
            })
            .await;
    }
}

impl std::fmt::Debug for AgentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRef")
            .field("agent_id", &self.agent_id)
            .field("name", &self.name)
            .field("total_steps", &self.total_steps)
            .finish()
    }
}

/// `agent-` followed by 8 random hex characters.
fn mint_agent_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("agent-{}", &suffix[..8])
}
