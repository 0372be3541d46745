//! Precomputed shared keys.
//!
//! A [`SharedKey`] is the NaCl `box` "beforenm" value: the X25519 shared
//! secret run through HSalsa20. It is derived once per endpoint and shared
//! read-only between that endpoint's reader and writer.

use std::sync::Arc;

use crypto_box::SalsaBox;
use crypto_box::aead::AeadInPlace;
use crypto_box::aead::generic_array::GenericArray;
use rand::RngCore;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Size of public, secret, and shared keys.
pub const KEY_SIZE: usize = 32;

/// Nonce size for XSalsa20-Poly1305.
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Symmetric key derived from `(our secret, their public)`.
///
/// Cloning shares the same precomputed state.
#[derive(Clone)]
pub struct SharedKey {
    cipher: Arc<SalsaBox>,
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKey").finish_non_exhaustive()
    }
}

impl SharedKey {
    /// Precompute the shared key from the peer's public key and our secret.
    ///
    /// Both sides arrive at the same key: `precompute(B_pub, a)` equals
    /// `precompute(A_pub, b)`.
    pub fn precompute(peer_public: &PublicKey, our_secret: &StaticSecret) -> Self {
        let mut secret_bytes = our_secret.to_bytes();
        let secret = crypto_box::SecretKey::from(secret_bytes);
        secret_bytes.zeroize();
        let public = crypto_box::PublicKey::from(*peer_public.as_bytes());
        Self {
            cipher: Arc::new(SalsaBox::new(&public, &secret)),
        }
    }

    /// Encrypt `buffer` in place and return the detached tag.
    pub fn seal_in_place(
        &self,
        nonce: &[u8; NONCE_SIZE],
        buffer: &mut [u8],
    ) -> Result<[u8; TAG_SIZE], CryptoError> {
        let tag = self
            .cipher
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), b"", buffer)
            .map_err(|_| CryptoError::SealFailed)?;
        let mut out = [0u8; TAG_SIZE];
        out.copy_from_slice(tag.as_slice());
        Ok(out)
    }

    /// Verify `tag` and decrypt `buffer` in place.
    ///
    /// On failure the buffer contents are unspecified and must be discarded.
    pub fn open_in_place(
        &self,
        nonce: &[u8; NONCE_SIZE],
        buffer: &mut [u8],
        tag: &[u8; TAG_SIZE],
    ) -> Result<(), CryptoError> {
        self.cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                b"",
                buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| CryptoError::OpenFailed)
    }

    /// Seal `plaintext` into a NaCl box body: `tag || ciphertext`.
    pub fn seal(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut sealed = vec![0u8; TAG_SIZE + plaintext.len()];
        sealed[TAG_SIZE..].copy_from_slice(plaintext);
        let tag = self.seal_in_place(nonce, &mut sealed[TAG_SIZE..])?;
        sealed[..TAG_SIZE].copy_from_slice(&tag);
        Ok(sealed)
    }

    /// Open a NaCl box body produced by [`SharedKey::seal`].
    pub fn open(&self, nonce: &[u8; NONCE_SIZE], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < TAG_SIZE {
            return Err(CryptoError::OpenFailed);
        }
        let (tag_bytes, ciphertext) = sealed.split_at(TAG_SIZE);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(tag_bytes);
        let mut plaintext = ciphertext.to_vec();
        self.open_in_place(nonce, &mut plaintext, &tag)?;
        Ok(plaintext)
    }
}

/// Sample a fresh 24-byte nonce from the operating system CSPRNG.
///
/// With 192 random bits per nonce, collisions within a session are
/// negligible, so both directions may draw from the same key.
pub fn random_nonce() -> Result<[u8; NONCE_SIZE], CryptoError> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::Rng(e.to_string()))?;
    Ok(nonce)
}

/// Create a matched pair of shared keys, as two peers would derive them.
#[cfg(any(test, feature = "test-utils"))]
pub fn test_shared_pair() -> Result<(SharedKey, SharedKey), CryptoError> {
    let a = crate::KeyPair::generate()?;
    let b = crate::KeyPair::generate()?;
    Ok((
        SharedKey::precompute(b.public_key(), a.secret()),
        SharedKey::precompute(a.public_key(), b.secret()),
    ))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip_across_peers() {
        let (a, b) = test_shared_pair().unwrap();
        let nonce = random_nonce().unwrap();

        let sealed = a.seal(&nonce, b"hello world\n").unwrap();
        assert_eq!(sealed.len(), 12 + TAG_SIZE);
        assert_eq!(b.open(&nonce, &sealed).unwrap(), b"hello world\n");

        // Either side may seal; the key is symmetric.
        let reply = b.seal(&nonce, b"reply").unwrap();
        assert_eq!(a.open(&nonce, &reply).unwrap(), b"reply");
    }

    #[test]
    fn empty_plaintext_seals_to_tag_only() {
        let (a, b) = test_shared_pair().unwrap();
        let nonce = random_nonce().unwrap();
        let sealed = a.seal(&nonce, b"").unwrap();
        assert_eq!(sealed.len(), TAG_SIZE);
        assert!(b.open(&nonce, &sealed).unwrap().is_empty());
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let (a, _) = test_shared_pair().unwrap();
        let (_, stranger) = test_shared_pair().unwrap();
        let nonce = random_nonce().unwrap();
        let sealed = a.seal(&nonce, b"secret data").unwrap();
        assert!(matches!(
            stranger.open(&nonce, &sealed),
            Err(CryptoError::OpenFailed)
        ));
    }

    #[test]
    fn open_rejects_any_flipped_bit() {
        let (a, b) = test_shared_pair().unwrap();
        let nonce = random_nonce().unwrap();
        let sealed = a.seal(&nonce, b"tamper me").unwrap();

        for i in 0..sealed.len() {
            let mut corrupted = sealed.clone();
            corrupted[i] ^= 0x01;
            assert!(b.open(&nonce, &corrupted).is_err(), "byte {i} not authenticated");
        }

        let mut wrong_nonce = nonce;
        wrong_nonce[0] ^= 0x01;
        assert!(b.open(&wrong_nonce, &sealed).is_err());
    }

    #[test]
    fn open_rejects_body_shorter_than_tag() {
        let (_, b) = test_shared_pair().unwrap();
        let nonce = random_nonce().unwrap();
        assert!(b.open(&nonce, &[0u8; TAG_SIZE - 1]).is_err());
    }

    #[test]
    fn precompute_is_deterministic_for_fixed_inputs() {
        let mut secret_bytes = [0u8; KEY_SIZE];
        secret_bytes[..4].copy_from_slice(b"priv");
        let mut public_bytes = [0u8; KEY_SIZE];
        public_bytes[..3].copy_from_slice(b"pub");

        let secret = StaticSecret::from(secret_bytes);
        let public = PublicKey::from(public_bytes);
        let k1 = SharedKey::precompute(&public, &secret);
        let k2 = SharedKey::precompute(&public, &secret);

        let nonce = [7u8; NONCE_SIZE];
        assert_eq!(
            k1.seal(&nonce, b"same").unwrap(),
            k2.seal(&nonce, b"same").unwrap()
        );
    }

    #[test]
    fn random_nonces_do_not_repeat() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(random_nonce().unwrap()), "nonce collision");
        }
    }

    #[test]
    fn debug_does_not_leak_key() {
        let (a, _) = test_shared_pair().unwrap();
        assert_eq!(format!("{a:?}"), "SharedKey { .. }");
    }
}
