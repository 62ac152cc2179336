//! NIP-01 events
//!
//! `UnsignedEvent` is the builder; signing consumes it and yields an
//! `Event` whose id and signature are fixed. A new version of a list is
//! always a brand-new `Event`, never an edited one.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::identity::{Credential, IdentityError};
use crate::todo::NamespaceKey;

use super::{Kind, RecordError, NAMESPACE_TAG};

/// A signed record as stored on relays.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Hex SHA-256 of the canonical serialization
    pub id: String,
    /// Hex x-only public key of the signer
    pub pubkey: String,
    /// Unix seconds
    pub created_at: i64,
    pub kind: Kind,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// Hex BIP-340 signature over `id`
    pub sig: String,
}

impl Event {
    /// First value of the first tag with this name.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.first().map(String::as_str) == Some(name))
            .and_then(|tag| tag.get(1))
            .map(String::as_str)
    }

    /// The namespace key carried in the `d` tag.
    pub fn namespace(&self) -> Option<&str> {
        self.tag_value(NAMESPACE_TAG)
    }

    /// Recompute the id from the signed fields.
    pub fn compute_id(&self) -> [u8; 32] {
        canonical_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }

    /// Check that `id` matches the content and `sig` verifies under `pubkey`.
    pub fn verify(&self) -> Result<(), RecordError> {
        let id = self.compute_id();
        let expected = hex::encode(id);
        if expected != self.id {
            return Err(RecordError::IdMismatch {
                expected,
                actual: self.id.clone(),
            });
        }

        let sig = hex::decode(&self.sig).map_err(|_| RecordError::InvalidSignature(self.id.clone()))?;
        let pubkey =
            hex::decode(&self.pubkey).map_err(|_| RecordError::InvalidSignature(self.id.clone()))?;
        if Credential::verify_with_key(&id, &sig, &pubkey) {
            Ok(())
        } else {
            Err(RecordError::InvalidSignature(self.id.clone()))
        }
    }
}

/// An event before signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub created_at: i64,
    pub kind: Kind,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl UnsignedEvent {
    /// A record of `kind` stamped with the current time.
    pub fn new(kind: Kind, content: impl Into<String>) -> Self {
        Self {
            created_at: chrono::Utc::now().timestamp(),
            kind,
            tags: Vec::new(),
            content: content.into(),
        }
    }

    /// An application-data record addressed to `namespace`.
    pub fn application_data(namespace: &NamespaceKey, content: impl Into<String>) -> Self {
        Self::new(Kind::ApplicationSpecificData, content)
            .with_tag(NAMESPACE_TAG, namespace.as_str())
    }

    pub fn with_tag(mut self, name: &str, value: &str) -> Self {
        self.tags.push(vec![name.to_string(), value.to_string()]);
        self
    }

    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Fill in the signer, compute the id and sign it.
    pub fn sign(self, credential: &Credential) -> Result<Event, IdentityError> {
        let pubkey = credential.public_key_hex();
        let id = canonical_id(&pubkey, self.created_at, self.kind, &self.tags, &self.content);
        let sig = credential.sign(&id)?;

        Ok(Event {
            id: hex::encode(id),
            pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: hex::encode(sig),
        })
    }
}

/// SHA-256 of `[0, pubkey, created_at, kind, tags, content]`.
fn canonical_id(pubkey: &str, created_at: i64, kind: Kind, tags: &[Vec<String>], content: &str) -> [u8; 32] {
    let canonical = serde_json::json!([0, pubkey, created_at, kind.as_u16(), tags, content]);
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hasher.finalize().into()
}
