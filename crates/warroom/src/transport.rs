//! Real-time transport abstraction.
//!
//! The connection manager only needs to open a channel, push text frames
//! and notice when the remote goes away. [`WebSocketConnector`] provides
//! that over `tokio-tungstenite`; tests plug in in-memory transports.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::debug;
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{WarroomError, WarroomResult};

/// An open, bidirectional text channel.
#[async_trait]
pub trait Transport: Send {
    /// Write one text frame.
    async fn send(&mut self, text: String) -> WarroomResult<()>;

    /// Next inbound text frame. `None` once the remote has closed.
    async fn recv(&mut self) -> Option<WarroomResult<String>>;

    /// Close the channel.
    async fn close(&mut self) -> WarroomResult<()>;
}

/// Opens [`Transport`]s.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> WarroomResult<Box<dyn Transport>>;
}

/// Connector for the war room WebSocket endpoint.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> WarroomResult<Box<dyn Transport>> {
        let (stream, response) = connect_async(url.as_str()).await?;
        debug!("WebSocket handshake with {} ({})", url, response.status());
        Ok(Box::new(WebSocketTransport { stream }))
    }
}

/// [`Transport`] over a tungstenite WebSocket stream.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, text: String) -> WarroomResult<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<WarroomResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    debug!("WebSocket closed by remote: {:?}", frame);
                    return None;
                }
                // Pings are answered by tungstenite on the next write/flush.
                Ok(_) => continue,
                Err(e) => return Some(Err(WarroomError::WebSocket(e))),
            }
        }
    }

    async fn close(&mut self) -> WarroomResult<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
