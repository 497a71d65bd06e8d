//! Connection state machine.
//!
//! Tracks where the sync engine is in its lifetime and validates transitions.
//!
//! # State Diagram
//!
//! ```text
//! ┌────────────┐  opened   ┌──────────┐
//! │ Connecting │──────────▶│   Open   │
//! └─────┬──────┘           └────┬─────┘
//!       │ close / error         │ close / error
//!       ▼                       ▼
//! ┌─────────────────────────────────────┐
//! │               Closed                │
//! └─────────────────────────────────────┘
//! ```
//!
//! Closed is terminal. Reconnecting means building a new client.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::LobbyClientError;

/// Why the connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called on this client
    Local,

    /// The server closed the connection
    Remote,

    /// The transport failed
    Error(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "closed locally"),
            Self::Remote => write!(f, "closed by server"),
            Self::Error(e) => write!(f, "transport error: {}", e),
        }
    }
}

/// Connection status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Transport not yet open
    #[default]
    Connecting,

    /// Authentication sent, applying inbound messages
    Open,

    /// No further messages are processed
    Closed { reason: CloseReason },
}

impl ConnectionStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// The error a command gets when issued in this status.
    pub fn command_error(&self) -> Option<LobbyClientError> {
        match self {
            Self::Closed {
                reason: CloseReason::Local,
            } => Some(LobbyClientError::AlreadyClosed),
            Self::Closed { .. } => Some(LobbyClientError::ConnectionClosed),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closed { reason } => write!(f, "Closed({})", reason),
        }
    }
}

/// State transition events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Closed(CloseReason),
}

/// Error when a state transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ConnectionStatus,
    pub event: ConnectionEvent,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid transition from {} via {:?}: {}",
            self.from, self.event, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Connection lifetime of one sync engine.
#[derive(Debug, Clone)]
pub struct Connection {
    status: ConnectionStatus,

    /// When the engine was created
    pub created_at: Instant,

    /// When the transport opened
    pub opened_at: Option<Instant>,

    /// When the engine closed
    pub closed_at: Option<Instant>,

    /// Frames handed to the transport
    pub frames_sent: u64,

    /// Frames received from the transport
    pub frames_received: u64,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            created_at: Instant::now(),
            opened_at: None,
            closed_at: None,
            frames_sent: 0,
            frames_received: 0,
        }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// Apply an event in place, returning error if invalid.
    pub fn apply_mut(&mut self, event: ConnectionEvent) -> Result<(), InvalidTransition> {
        self.status = self.transition(&event)?;
        match self.status {
            ConnectionStatus::Open => self.opened_at = Some(Instant::now()),
            ConnectionStatus::Closed { .. } => self.closed_at = Some(Instant::now()),
            ConnectionStatus::Connecting => {}
        }
        Ok(())
    }

    fn transition(&self, event: &ConnectionEvent) -> Result<ConnectionStatus, InvalidTransition> {
        use ConnectionEvent as E;
        use ConnectionStatus as S;

        let invalid = |reason: &'static str| InvalidTransition {
            from: self.status.clone(),
            event: event.clone(),
            reason,
        };

        match (&self.status, event) {
            (S::Connecting, E::Opened) => Ok(S::Open),
            (S::Open, E::Opened) => Err(invalid("Already open")),
            (S::Closed { .. }, E::Opened) => Err(invalid("Closed is terminal")),

            (S::Connecting | S::Open, E::Closed(reason)) => Ok(S::Closed {
                reason: reason.clone(),
            }),
            (S::Closed { .. }, E::Closed(_)) => Err(invalid("Already closed")),
        }
    }

    /// Move to Closed unless already there. Returns whether this call closed it.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        self.apply_mut(ConnectionEvent::Closed(reason)).is_ok()
    }

    pub fn record_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub fn record_received(&mut self) {
        self.frames_received += 1;
    }

    /// How long the transport has been (or was) open.
    pub fn uptime(&self) -> Option<Duration> {
        let opened = self.opened_at?;
        Some(match self.closed_at {
            Some(closed) => closed.saturating_duration_since(opened),
            None => opened.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let conn = Connection::new();
        assert_eq!(*conn.status(), ConnectionStatus::Connecting);
        assert!(conn.opened_at.is_none());
        assert!(conn.uptime().is_none());
        assert!(conn.status().command_error().is_none());
    }

    #[test]
    fn test_open_then_close() {
        let mut conn = Connection::new();

        conn.apply_mut(ConnectionEvent::Opened).unwrap();
        assert!(conn.status().is_open());
        assert!(conn.opened_at.is_some());

        assert!(conn.close(CloseReason::Remote));
        assert!(conn.status().is_closed());
        assert!(conn.closed_at.is_some());
        assert!(conn.uptime().is_some());
    }

    #[test]
    fn test_close_while_connecting() {
        let mut conn = Connection::new();
        assert!(conn.close(CloseReason::Error("refused".to_string())));
        assert_eq!(
            *conn.status(),
            ConnectionStatus::Closed {
                reason: CloseReason::Error("refused".to_string())
            }
        );
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut conn = Connection::new();
        conn.close(CloseReason::Local);

        assert!(conn.apply_mut(ConnectionEvent::Opened).is_err());
        assert!(!conn.close(CloseReason::Remote));
        // First reason wins
        assert_eq!(
            *conn.status(),
            ConnectionStatus::Closed {
                reason: CloseReason::Local
            }
        );
    }

    #[test]
    fn test_double_open_rejected() {
        let mut conn = Connection::new();
        conn.apply_mut(ConnectionEvent::Opened).unwrap();

        let err = conn.apply_mut(ConnectionEvent::Opened).unwrap_err();
        assert_eq!(err.reason, "Already open");
        assert_eq!(
            err.to_string(),
            "Invalid transition from Open via Opened: Already open"
        );
    }

    #[test]
    fn test_command_errors() {
        let local = ConnectionStatus::Closed {
            reason: CloseReason::Local,
        };
        let remote = ConnectionStatus::Closed {
            reason: CloseReason::Remote,
        };

        assert!(matches!(
            local.command_error(),
            Some(LobbyClientError::AlreadyClosed)
        ));
        assert!(matches!(
            remote.command_error(),
            Some(LobbyClientError::ConnectionClosed)
        ));
        assert!(ConnectionStatus::Open.command_error().is_none());
    }

    #[test]
    fn test_counters() {
        let mut conn = Connection::new();
        conn.record_sent();
        conn.record_sent();
        conn.record_received();
        assert_eq!(conn.frames_sent, 2);
        assert_eq!(conn.frames_received, 1);
    }
}
