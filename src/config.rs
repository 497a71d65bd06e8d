//! Client configuration.

use serde::Deserialize;

use crate::error::{LobbyClientError, Result};

fn default_verify_tls() -> bool {
    true
}

/// Configuration for [`LobbyClient::connect`](crate::LobbyClient::connect).
///
/// # Example
///
/// ```
/// use lobby_client::ClientConfig;
///
/// let config = ClientConfig::new("wss://lobby.example.com/ws", "secret")
///     .with_verify_tls(false);
/// assert!(config.validate().is_ok());
/// assert!(!config.verify_tls);
/// ```
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Server address, `ws://` or `wss://`
    pub url: String,

    /// Token sent in the authentication message
    pub token: String,

    /// Verify the server certificate. Defaults to **true**.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            verify_tls: default_verify_tls(),
        }
    }

    /// Turn certificate verification on or off.
    #[must_use]
    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    /// Load from a JSON document such as
    /// `{"url": "wss://host/ws", "token": "...", "verify_tls": false}`.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| LobbyClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(LobbyClientError::Config("url is empty".to_string()));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(LobbyClientError::Config(format!(
                "url {:?} must use ws:// or wss://",
                self.url
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}
