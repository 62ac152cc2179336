//! Relay transport layer
//!
//! Provides the relay abstraction traits, the NIP-01 message codec, a
//! WebSocket implementation for real relays and an in-process simulated
//! relay network for testing.

pub mod message;
pub mod simulated;
pub mod transport;
pub mod websocket;

pub use transport::{RelayConnector, RelaySession};
pub use websocket::{TransportConfig, WebSocketConnector};

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Connection error: {0}")]
    ConnectionFailed(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Relay rejected record: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Relay closed the connection")]
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid relay address {address:?}: {reason}")]
pub struct InvalidRelayUrl {
    pub address: String,
    pub reason: String,
}

/// Address of one relay. Only `ws://` and `wss://` are accepted;
/// reachability is not checked.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelayUrl(Url);

impl RelayUrl {
    pub fn parse(address: &str) -> Result<Self, InvalidRelayUrl> {
        let invalid = |reason: String| InvalidRelayUrl {
            address: address.to_string(),
            reason,
        };
        let url = Url::parse(address.trim()).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(invalid(format!("unsupported scheme {}", other))),
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".into()));
        }
        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl FromStr for RelayUrl {
    type Err = InvalidRelayUrl;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
