//! Relay transport trait definitions
//!
//! Defines the interface that both the WebSocket client and the simulated
//! relay network conform to. The coordinators in `sync` only ever see these
//! traits.

use async_trait::async_trait;

use crate::record::{Event, Filter};

use super::{RelayError, RelayUrl};

/// Opens sessions to relays.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Open a fresh session to one relay.
    async fn connect(&self, relay: &RelayUrl) -> Result<Box<dyn RelaySession>, RelayError>;
}

/// An open session with a single relay.
#[async_trait]
pub trait RelaySession: Send {
    /// The relay this session talks to.
    fn relay(&self) -> &RelayUrl;

    /// Run one subscription until the relay signals end of stored events
    /// and return everything it sent.
    async fn query(&mut self, filter: &Filter) -> Result<Vec<Event>, RelayError>;

    /// Publish one record and wait for the relay's verdict.
    /// A refusal is reported as `RelayError::Rejected`.
    async fn publish(&mut self, event: &Event) -> Result<(), RelayError>;

    /// Close the session.
    async fn close(&mut self) -> Result<(), RelayError>;
}
