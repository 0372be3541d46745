//! Ephemeral key pairs.
//!
//! Every endpoint generates a fresh X25519 keypair for the handshake. Keys
//! are never authenticated by this crate; callers that need to pin a peer
//! compare fingerprints out of band.

use rand::RngCore;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::shared::KEY_SIZE;

/// An X25519 keypair.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random keypair from the operating system CSPRNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_SIZE];
        let filled = OsRng.try_fill_bytes(&mut bytes);
        if let Err(e) = filled {
            bytes.zeroize();
            return Err(CryptoError::Rng(e.to_string()));
        }
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// Reconstruct from raw 32-byte secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        let secret = StaticSecret::from(arr);
        let public = PublicKey::from(&secret);
        arr.zeroize();
        Ok(Self { secret, public })
    }

    /// Get the public key.
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Get the public key as raw bytes.
    pub fn public_bytes(&self) -> [u8; KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Get the secret key reference for key agreement.
    pub const fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// Colon-separated SHA-256 fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(self.public.as_bytes())
    }
}

/// Compute a colon-separated hex fingerprint from raw public key bytes.
pub fn fingerprint_of(pubkey_bytes: &[u8; KEY_SIZE]) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(pubkey_bytes);
    hash.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Check that a public key matches an expected fingerprint.
pub fn verify_fingerprint(pubkey_bytes: &[u8; KEY_SIZE], expected_fingerprint: &str) -> bool {
    fingerprint_of(pubkey_bytes).eq_ignore_ascii_case(expected_fingerprint)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_32_byte_keys() {
        let kp = KeyPair::generate().unwrap();
        assert_eq!(kp.public_bytes().len(), 32);
        assert_eq!(kp.secret().to_bytes().len(), 32);
    }

    #[test]
    fn two_keypairs_are_distinct() {
        let kp1 = KeyPair::generate().unwrap();
        let kp2 = KeyPair::generate().unwrap();
        assert_ne!(kp1.public_bytes(), kp2.public_bytes());
        assert_ne!(kp1.secret().to_bytes(), kp2.secret().to_bytes());
    }

    #[test]
    fn from_secret_bytes_derives_same_public_key() {
        let kp = KeyPair::generate().unwrap();
        let restored = KeyPair::from_secret_bytes(&kp.secret().to_bytes()).unwrap();
        assert_eq!(restored.public_bytes(), kp.public_bytes());
    }

    #[test]
    fn from_secret_bytes_rejects_wrong_length() {
        let err = KeyPair::from_secret_bytes(&[0u8; 16]).unwrap_err();
        match err {
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16,
            } => {}
            _ => panic!("wrong error: {err:?}"),
        }
    }

    #[test]
    fn fingerprint_is_colon_separated_hex() {
        let kp = KeyPair::generate().unwrap();
        let fp = kp.fingerprint();

        // 32 hex pairs + 31 colons
        assert_eq!(fp.len(), 95);
        for segment in fp.split(':') {
            assert_eq!(segment.len(), 2);
            assert!(segment.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn verify_fingerprint_matches_only_own_key() {
        let kp = KeyPair::generate().unwrap();
        let fp = kp.fingerprint();
        assert!(verify_fingerprint(&kp.public_bytes(), &fp));
        assert!(verify_fingerprint(&kp.public_bytes(), &fp.to_uppercase()));

        let other = KeyPair::generate().unwrap();
        assert!(!verify_fingerprint(&other.public_bytes(), &fp));
    }

    #[test]
    fn debug_impl_redacts_secret() {
        let kp = KeyPair::generate().unwrap();
        let debug_output = format!("{kp:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains(&hex::encode(kp.secret().to_bytes())));
    }
}
