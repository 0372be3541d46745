//! `seclink` crypto primitives
//!
//! Key agreement and authenticated encryption for the framed secure channel.
//!
//! ## Crypto primitives
//!
//! - **Key pair**: ephemeral X25519 keypair per endpoint, sampled from `OsRng`
//! - **Shared key**: NaCl `box` precomputation, X25519 ECDH → HSalsa20
//! - **Encryption**: XSalsa20-Poly1305 with a random 24-byte nonce per message
//!
//! Sealed bodies use the NaCl layout (`tag || ciphertext`), so frames
//! interoperate with `crypto_box_afternm` implementations.

pub mod error;
pub mod keys;
pub mod shared;

pub use error::CryptoError;
pub use keys::{KeyPair, fingerprint_of, verify_fingerprint};
pub use shared::{KEY_SIZE, NONCE_SIZE, SharedKey, TAG_SIZE, random_nonce};
#[cfg(any(test, feature = "test-utils"))]
pub use shared::test_shared_pair;
pub use x25519_dalek::{PublicKey, StaticSecret};
