//! WebSocket test client speaking the relay's wire envelope.
//!
//! `RelayClient` wraps a tungstenite stream and decodes the
//! `{"event": ..., "data": ...}` frames the relay exchanges, with
//! timeouts on every receive so a missing frame fails the test instead of
//! hanging it.

use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long to wait for an expected frame before failing the test.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// One client connection to a test relay server.
pub struct RelayClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayClient {
    /// Open a WebSocket to `url` (as produced by `TestRelayServer::ws_url`).
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (stream, _response) = connect_async(url)
            .await
            .with_context(|| format!("WebSocket connect to {url} failed"))?;
        Ok(Self { stream })
    }

    /// Connect and consume the admission welcome, returning the client plus
    /// the `connected` and `participants:list` payloads.
    pub async fn join(url: &str) -> Result<(Self, Value, Value), anyhow::Error> {
        let mut client = Self::connect(url).await?;
        let connected = client.expect_event("connected").await?;
        let roster = client.expect_event("participants:list").await?;
        Ok((client, connected, roster))
    }

    /// Send one enveloped frame.
    pub async fn send_event(&mut self, event: &str, data: Value) -> Result<(), anyhow::Error> {
        let frame = serde_json::json!({"event": event, "data": data}).to_string();
        self.send_raw(&frame).await
    }

    /// Send raw frame text (for malformed-frame and byte-exactness cases).
    pub async fn send_raw(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.stream
            .send(Message::Text(text.to_string()))
            .await
            .context("WebSocket send failed")
    }

    /// Receive the next enveloped frame as `(event, data)`.
    ///
    /// Fails on timeout and on connection close.
    pub async fn next_event(&mut self) -> Result<(String, Value), anyhow::Error> {
        let text = self.next_text().await?;
        let frame: Value = serde_json::from_str(&text)
            .with_context(|| format!("frame is not valid JSON: {text}"))?;
        let event = frame["event"]
            .as_str()
            .ok_or_else(|| anyhow!("frame has no event name: {text}"))?
            .to_string();
        Ok((event, frame["data"].clone()))
    }

    /// Receive the next frame and require its event name.
    pub async fn expect_event(&mut self, expected: &str) -> Result<Value, anyhow::Error> {
        let (event, data) = self.next_event().await?;
        if event != expected {
            bail!("expected event {expected:?}, got {event:?} with data {data}");
        }
        Ok(data)
    }

    /// Receive the next text frame verbatim.
    pub async fn next_text(&mut self) -> Result<String, anyhow::Error> {
        loop {
            match self.next_message().await? {
                Some(Message::Text(text)) => return Ok(text),
                Some(Message::Ping(_) | Message::Pong(_)) => continue,
                Some(Message::Close(frame)) => {
                    bail!("connection closed while expecting a frame: {frame:?}")
                }
                Some(other) => bail!("unexpected non-text message: {other:?}"),
                None => bail!("connection ended while expecting a frame"),
            }
        }
    }

    /// Wait for the server to close the connection; returns the close code.
    pub async fn expect_close(mut self) -> Result<u16, anyhow::Error> {
        loop {
            match self.next_message().await? {
                Some(Message::Close(Some(frame))) => return Ok(u16::from(frame.code)),
                Some(Message::Close(None)) => bail!("close frame carried no code"),
                Some(Message::Ping(_) | Message::Pong(_)) => continue,
                Some(other) => bail!("expected close, got {other:?}"),
                // Stream end without a close frame still means the server
                // hung up; surface it distinctly.
                None => bail!("connection ended without a close frame"),
            }
        }
    }

    /// Assert that no frame arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<(), anyhow::Error> {
        match timeout(window, self.stream.next()).await {
            Err(_elapsed) => Ok(()),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => Ok(()),
            Ok(Some(Ok(message))) => bail!("expected silence, got {message:?}"),
            Ok(Some(Err(error))) => bail!("stream error while expecting silence: {error}"),
            Ok(None) => bail!("connection ended while expecting silence"),
        }
    }

    /// Close the connection from the client side.
    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.stream
            .close(None)
            .await
            .context("WebSocket close failed")
    }

    async fn next_message(&mut self) -> Result<Option<Message>, anyhow::Error> {
        match timeout(RECV_TIMEOUT, self.stream.next()).await {
            Err(_elapsed) => bail!("timed out waiting for a frame"),
            Ok(None) => Ok(None),
            Ok(Some(result)) => Ok(Some(result.context("WebSocket receive failed")?)),
        }
    }
}
