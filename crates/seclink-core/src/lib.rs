//! `seclink` Core Library
//!
//! A secure bidirectional byte stream on top of any reliable, ordered
//! transport:
//! - Ephemeral X25519 handshake (raw 32-byte public keys, no framing)
//! - Length-prefixed XSalsa20-Poly1305 frames with a fresh nonce each
//! - Decrypting reader and encrypting writer with poisoning on failure
//! - Endpoint, TCP dialer and listener
//!
//! Wire frame: `length:u32 BE || nonce[24] || tag[16] || ciphertext`, where
//! `length` counts the bytes after the prefix and never exceeds
//! [`MAX_BODY_LENGTH`].

pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod net;
pub mod reader;
pub mod tracing_init;
pub mod transport;
pub mod writer;

pub use config::{ChannelConfig, load_config};
pub use endpoint::Endpoint;
pub use error::{Error, FrameError, HandshakeError, Result, channel_error, frame_error};
pub use frame::{
    FRAME_OVERHEAD, LENGTH_PREFIX_SIZE, MAX_BODY_LENGTH, MAX_FRAME_SIZE, MAX_PLAINTEXT_SIZE,
    MIN_BODY_LENGTH,
};
pub use handshake::{Session, handshake, handshake_with};
pub use net::{Incoming, PendingConnection, SecureListener, dial};
pub use reader::SecureReader;
pub use transport::{Close, Transport};
pub use writer::SecureWriter;
