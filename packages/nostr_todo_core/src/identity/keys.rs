//! The caller's signing credential
//!
//! Key material arrives from configuration either as a NIP-19 `nsec`
//! bech32 string or as 64 hex characters. The public identity is the
//! 32-byte x-only secp256k1 key; signatures are BIP-340 Schnorr over the
//! 32-byte record id.

use std::fmt;

use bech32::{Bech32, Hrp};
use k256::schnorr::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use super::IdentityError;

const NSEC_HRP: &str = "nsec";
const NPUB_HRP: &str = "npub";

/// A resolved signing credential. Read-only once built.
#[derive(Clone)]
pub struct Credential {
    signing_key: SigningKey,
}

impl Credential {
    /// Generate a fresh random credential.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Decode configured key material (`nsec1...` or hex).
    pub fn from_secret(secret: &str) -> Result<Self, IdentityError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(IdentityError::InvalidKeyMaterial(
                "no private key configured".into(),
            ));
        }

        let mut bytes = if secret.to_ascii_lowercase().starts_with(NSEC_HRP) {
            decode_bech32(NSEC_HRP, secret)?
        } else {
            hex::decode(secret).map_err(|e| {
                IdentityError::InvalidKeyMaterial(format!("expected nsec or hex key: {}", e))
            })?
        };

        let result = Self::from_bytes(&bytes);
        bytes.zeroize();
        result
    }

    /// Build from 32 raw secret-key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        if bytes.len() != 32 {
            return Err(IdentityError::InvalidKeyMaterial(format!(
                "secret key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let signing_key = SigningKey::from_bytes(bytes)
            .map_err(|e| IdentityError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self { signing_key })
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// x-only public key bytes.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key().to_bytes().into()
    }

    /// Lowercase hex public key, as carried in a record's `pubkey` field.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// NIP-19 `npub` encoding of the public key.
    pub fn npub(&self) -> Result<String, IdentityError> {
        encode_bech32(NPUB_HRP, &self.public_key_bytes())
    }

    /// NIP-19 `nsec` encoding of the secret key.
    pub fn nsec(&self) -> Result<String, IdentityError> {
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        let encoded = encode_bech32(NSEC_HRP, &bytes);
        bytes.zeroize();
        encoded
    }

    /// Sign a 32-byte record id.
    pub fn sign(&self, id: &[u8; 32]) -> Result<[u8; 64], IdentityError> {
        let signature: Signature = self
            .signing_key
            .sign_prehash(id)
            .map_err(|e| IdentityError::SigningFailure(e.to_string()))?;
        Ok(signature.to_bytes())
    }

    /// Verify a signature over a record id against an arbitrary public key.
    pub fn verify_with_key(id: &[u8; 32], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(public_key) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(signature) else {
            return false;
        };
        key.verify_prehash(id, &signature).is_ok()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("public_key", &self.public_key_hex())
            .field("secret_key", &"[redacted]")
            .finish()
    }
}

fn decode_bech32(expected_hrp: &str, encoded: &str) -> Result<Vec<u8>, IdentityError> {
    let (hrp, data) =
        bech32::decode(encoded).map_err(|e| IdentityError::InvalidKeyMaterial(e.to_string()))?;
    if hrp.to_lowercase() != expected_hrp {
        return Err(IdentityError::InvalidKeyMaterial(format!(
            "expected {} prefix, got {}",
            expected_hrp, hrp
        )));
    }
    Ok(data)
}

fn encode_bech32(hrp: &str, data: &[u8]) -> Result<String, IdentityError> {
    let hrp = Hrp::parse(hrp).map_err(|e| IdentityError::EncodingError(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, data).map_err(|e| IdentityError::EncodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIP-19 test vector
    const NSEC: &str = "nsec1vl029mgpspedva04g90vltkh6fvh240zqtv9k0t9af8935ke9laqsnlfe5";
    const SECRET_HEX: &str = "67dea2ed018072d675f5415ecfaed7d2597555e202d85b3d65ea4e58d2d92ffa";

    #[test]
    fn test_nsec_and_hex_decode_to_same_key() {
        let from_nsec = Credential::from_secret(NSEC).unwrap();
        let from_hex = Credential::from_secret(SECRET_HEX).unwrap();
        assert_eq!(from_nsec.public_key_hex(), from_hex.public_key_hex());
        assert_eq!(from_nsec.nsec().unwrap(), NSEC);
    }

    #[test]
    fn test_npub_round_trip() {
        let cred = Credential::generate();
        let npub = cred.npub().unwrap();
        assert!(npub.starts_with("npub1"));

        let bytes = decode_bech32(NPUB_HRP, &npub).unwrap();
        assert_eq!(bytes, cred.public_key_bytes());
    }

    #[test]
    fn test_invalid_material_is_rejected() {
        for bad in ["", "   ", "not-a-key", "abcd", "nsec1qqqqqq"] {
            assert!(
                matches!(
                    Credential::from_secret(bad),
                    Err(IdentityError::InvalidKeyMaterial(_))
                ),
                "accepted {:?}",
                bad
            );
        }

        // Valid bech32 with the wrong prefix
        let npub = Credential::generate().npub().unwrap();
        assert!(Credential::from_secret(&npub).is_err());

        // Zero is not a valid scalar
        assert!(Credential::from_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let cred = Credential::generate();
        let id = [7u8; 32];

        let sig = cred.sign(&id).unwrap();
        assert!(Credential::verify_with_key(&id, &sig, &cred.public_key_bytes()));

        // Wrong message should fail
        assert!(!Credential::verify_with_key(&[8u8; 32], &sig, &cred.public_key_bytes()));

        // Wrong key should fail
        let other = Credential::generate();
        assert!(!Credential::verify_with_key(&id, &sig, &other.public_key_bytes()));

        // Garbage inputs never panic
        assert!(!Credential::verify_with_key(&id, &[0u8; 10], &cred.public_key_bytes()));
        assert!(!Credential::verify_with_key(&id, &sig, &[0u8; 5]));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cred = Credential::from_secret(SECRET_HEX).unwrap();
        let debug = format!("{:?}", cred);
        assert!(!debug.contains(SECRET_HEX));
        assert!(debug.contains("[redacted]"));
    }
}
