//! Transport abstraction.
//!
//! The sync engine talks to the server through a [`Transport`]: a
//! full-duplex channel of JSON text frames. [`WebSocketTransport`] is the
//! production implementation; tests script their own.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::{LobbyClientError, Result};

/// A connected, bidirectional text-frame channel.
///
/// Handing a transport to the engine is the "opened" signal. `recv` must be
/// cancel-safe: the engine polls it inside `tokio::select!`.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one text frame.
    async fn send(&mut self, message: String) -> Result<()>;

    /// Next text frame. `None` means the peer closed the connection.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// WebSocket transport over `tokio-tungstenite`.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
    /// Connect to a `ws://` or `wss://` url.
    ///
    /// With `verify_tls` off, invalid certificates and host names are
    /// accepted.
    pub async fn connect(url: &str, verify_tls: bool) -> Result<Self> {
        let connector = if verify_tls {
            None
        } else {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?;
            Some(tokio_tungstenite::Connector::NativeTls(tls))
        };

        let (stream, response) =
            tokio_tungstenite::connect_async_tls_with_config(url, None, false, connector).await?;
        debug!(url, status = %response.status(), "websocket connected");

        Ok(Self { stream })
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<()> {
        self.stream.send(Message::Text(message)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes).map_err(|e| {
                        LobbyClientError::Transport(format!("binary frame is not UTF-8: {e}"))
                    }));
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "close frame received");
                    return None;
                }
                // Pings are answered by tungstenite itself.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                    trace!("control frame");
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
