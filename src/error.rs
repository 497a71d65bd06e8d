//! Error types for the lobby client.

/// Common result type for lobby client operations.
pub type Result<T> = std::result::Result<T, LobbyClientError>;

/// Errors that can occur while syncing with the lobby server.
#[derive(Debug, thiserror::Error)]
pub enum LobbyClientError {
    /// Inbound payload is not valid JSON or lacks required fields.
    #[error("failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),

    /// Inbound payload has no `type` discriminator.
    #[error("message has no type discriminator")]
    MissingType,

    /// An update referenced a lobby this client does not know.
    #[error("{kind} references unknown lobby {name:?}")]
    UnknownLobby { kind: &'static str, name: String },

    /// The connection was closed by the server or failed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The client was closed locally.
    #[error("client already closed")]
    AlreadyClosed,

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for LobbyClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        LobbyClientError::WebSocket(Box::new(e))
    }
}
