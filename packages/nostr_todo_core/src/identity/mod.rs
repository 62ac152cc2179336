//! Signing identity
//!
//! This module resolves the caller's credential from configured key material:
//! - `Credential`: secp256k1 secret key plus its x-only public key
//! - NIP-19 `nsec`/`npub` bech32 encodings

pub mod keys;

pub use keys::Credential;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Signing failed: {0}")]
    SigningFailure(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
