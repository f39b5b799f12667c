//! Reporting client for war room dashboards.
//!
//! Agents publish status, progress, logs and timeline messages through a
//! [`Client`]. Delivery is best effort and never fails the caller:
//!
//! - a persistent WebSocket channel is opened in the background;
//! - while it is not open, each event gets one bounded HTTP `POST` attempt;
//! - events that could not go out either way wait in an ordered queue that
//!   is flushed as soon as the channel opens.
//!
//! ```rust,ignore
//! let client = Client::new(ClientConfig::new("my-hackathon", "amadeus"))?;
//! let agent = client.register("Self-Play Engine", Some(100)).await;
//!
//! for i in 0..100 {
//!     agent.update(AgentStatus::Running, Some(format!("Round {i}/100")), None).await;
//!     agent.log(format!("Processing round {i}")).await;
//! }
//!
//! agent.complete().await;
//! client.flush(Duration::from_secs(5)).await;
//! client.close();
//! ```

pub mod client;
pub mod config;
pub mod connection;
mod dispatcher;
pub mod error;
pub mod fallback;
pub mod queue;
pub mod session;
pub mod stats;
pub mod transport;

pub use client::{AgentRef, Client, ClientBuilder};
pub use config::ClientConfig;
pub use connection::ConnectionState;
pub use error::{WarroomError, WarroomResult};
pub use fallback::{FallbackSender, HttpFallback};
pub use session::Session;
pub use stats::DeliveryStats;
pub use transport::{Connector, Transport, WebSocketConnector};

pub use warroom_protocol as protocol;
pub use warroom_protocol::{AgentLog, AgentStatus, Envelope, EventKind, EventPayload, LogKind};
