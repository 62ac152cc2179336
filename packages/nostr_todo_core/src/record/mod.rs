//! Signed remote records
//!
//! A record is the immutable, signed wire form of one version of a
//! `TodoList`. Records follow NIP-01: the id is the SHA-256 of a canonical
//! JSON array and the signature is BIP-340 over that id. Lists are stored
//! as kind 30078 ("application-specific data") addressed by a `d` tag.

pub mod event;
pub mod filter;

pub use event::{Event, UnsignedEvent};
pub use filter::Filter;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag name that carries the namespace key.
pub const NAMESPACE_TAG: &str = "d";

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },

    #[error("Invalid signature on record {0}")]
    InvalidSignature(String),
}

/// Record kinds this crate reads or writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum Kind {
    /// NIP-78 arbitrary app data, parameterized-replaceable by `d` tag
    ApplicationSpecificData,
    Other(u16),
}

impl Kind {
    pub fn as_u16(self) -> u16 {
        match self {
            Kind::ApplicationSpecificData => 30078,
            Kind::Other(k) => k,
        }
    }
}

impl From<u16> for Kind {
    fn from(value: u16) -> Self {
        match value {
            30078 => Kind::ApplicationSpecificData,
            other => Kind::Other(other),
        }
    }
}

impl From<Kind> for u16 {
    fn from(kind: Kind) -> Self {
        kind.as_u16()
    }
}
