//! Replicated single-document synchronization
//!
//! Each command is one stateless cycle:
//!
//! ```text
//! fetch (first relay to answer wins)
//!   ↓
//! mutate (pure, in memory)
//!   ↓
//! commit (sign once, publish to every relay concurrently, wait for all)
//! ```
//!
//! There is no coordinator and no conflict resolution: a single writer is
//! assumed, and the newest record a relay holds is the list.

pub mod commit;
pub mod fetch;
pub mod session;

pub use commit::{AcceptancePolicy, CommitCoordinator, CommitReport, NodeOutcome, NodeReport};
pub use fetch::{FetchCoordinator, FetchStrategy, FirstResponse, StoredList};
pub use session::{Applied, SyncSession};

use thiserror::Error;

use crate::identity::IdentityError;
use crate::todo::DocumentError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("todo list not found: {0}")]
    NotFound(String),

    #[error("corrupt record {record_id}: {reason}")]
    CorruptRecord { record_id: String, reason: String },

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("signing failed: {0}")]
    SigningFailure(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("only {accepted} of the required {required} relays accepted the list")]
    InsufficientAcceptance { accepted: usize, required: usize },

    #[error("no relays configured")]
    NoRelays,

    #[error("operation cancelled")]
    Cancelled,
}

impl From<IdentityError> for SyncError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::SigningFailure(msg) => SyncError::SigningFailure(msg),
            IdentityError::InvalidKeyMaterial(msg) | IdentityError::EncodingError(msg) => {
                SyncError::InvalidCredential(msg)
            }
        }
    }
}

impl From<DocumentError> for SyncError {
    fn from(e: DocumentError) -> Self {
        SyncError::Serialization(e.to_string())
    }
}
