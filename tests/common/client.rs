//! Test WebSocket client.
//!
//! Sends typed client events and asserts on typed server notifications.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use supportline_proto::{ClientEvent, ServerEvent};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// Connection id from `connectionEstablished`.
    pub connection_id: String,
}

impl TestClient {
    /// Connect and consume the `connectionEstablished` greeting.
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let (ws, _) = connect_async(format!("ws://{address}")).await?;
        let mut client = Self {
            ws,
            connection_id: String::new(),
        };
        match client.recv().await? {
            ServerEvent::ConnectionEstablished { connection_id, .. } => {
                client.connection_id = connection_id;
            }
            other => anyhow::bail!("expected connectionEstablished, got {other:?}"),
        }
        Ok(client)
    }

    /// Send a raw frame.
    pub async fn send_raw(&mut self, message: Message) -> anyhow::Result<()> {
        self.ws.send(message).await?;
        Ok(())
    }

    /// Send a client event.
    pub async fn send(&mut self, event: ClientEvent) -> anyhow::Result<()> {
        self.send_raw(Message::Text(event.encode()?)).await
    }

    /// Receive a single notification.
    pub async fn recv(&mut self) -> anyhow::Result<ServerEvent> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a notification with a timeout, skipping transport frames.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<ServerEvent> {
        timeout(dur, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(ServerEvent::decode(&text)?),
                    Some(Ok(Message::Close(frame))) => {
                        anyhow::bail!("connection closed: {frame:?}")
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => anyhow::bail!("connection closed"),
                }
            }
        })
        .await?
    }

    /// Receive notifications until the predicate returns true.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<ServerEvent>>
    where
        F: FnMut(&ServerEvent) -> bool,
    {
        let mut events = Vec::new();
        loop {
            let event = self.recv().await?;
            let done = predicate(&event);
            events.push(event);
            if done {
                break;
            }
        }
        Ok(events)
    }

    /// Receive until a notification with the given name arrives, returning it.
    pub async fn expect(&mut self, name: &str) -> anyhow::Result<ServerEvent> {
        let events = self.recv_until(|e| e.name() == name).await?;
        events
            .into_iter()
            .last()
            .ok_or_else(|| anyhow::anyhow!("no {name} received"))
    }

    /// Assert nothing arrives for a short while.
    #[allow(dead_code)]
    pub async fn expect_silence(&mut self) -> anyhow::Result<()> {
        match self.recv_timeout(Duration::from_millis(300)).await {
            Ok(event) => anyhow::bail!("expected silence, got {event:?}"),
            Err(_) => Ok(()),
        }
    }

    /// Read frames until the server closes, returning its close frame.
    #[allow(dead_code)]
    pub async fn recv_close(
        &mut self,
        dur: Duration,
    ) -> anyhow::Result<Option<CloseFrame<'static>>> {
        timeout(dur, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Close(frame))) => return Ok(frame),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(None),
                }
            }
        })
        .await?
    }

    /// Close the connection with a normal close frame.
    #[allow(dead_code)]
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
