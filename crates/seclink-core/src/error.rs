//! Error types for the secure channel.

use std::io;

use seclink_crypto::CryptoError;
use thiserror::Error;

/// Result type alias using the channel [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Frame-level failures. Cheap to clone so a poisoned reader can replay them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Plaintext (on write) or announced body (on read) exceeds the bound.
    #[error("Frame too large: {size} bytes exceeds limit of {max}")]
    TooLarge { size: usize, max: usize },

    /// Announced body length is below the nonce + tag minimum.
    #[error("Invalid frame length: {length}")]
    InvalidLength { length: usize },

    /// The transport reached EOF in the middle of a frame.
    #[error("Truncated frame")]
    TruncatedFrame,

    /// Authentication rejected the frame.
    #[error("Frame verification failed")]
    VerificationFailed,
}

/// Failures while exchanging public keys.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Handshake truncated: received {received} of 32 key bytes")]
    Truncated { received: usize },

    #[error("Handshake transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("Handshake key generation failed: {0}")]
    Rng(#[from] CryptoError),
}

/// Channel error types.
#[derive(Debug, Error)]
pub enum Error {
    /// CSPRNG failure outside the handshake (nonce generation)
    #[error("Random number generator failed: {0}")]
    Rng(String),

    /// Sealing failure or malformed key material
    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    /// Key exchange failed; no endpoint was created
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Framing or authentication failure
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Passthrough from the underlying transport
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// Operation on a closed endpoint
    #[error("Endpoint is closed")]
    Closed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tracing subscriber setup error
    #[error("Tracing setup error: {0}")]
    Tracing(String),
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::OpenFailed => Self::Frame(FrameError::VerificationFailed),
            CryptoError::Rng(msg) => Self::Rng(msg),
            other => Self::Crypto(other),
        }
    }
}

impl Error {
    /// The frame error behind this error, if any.
    pub const fn frame(&self) -> Option<&FrameError> {
        match self {
            Self::Frame(e) => Some(e),
            _ => None,
        }
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::Frame(FrameError::TruncatedFrame) => io::ErrorKind::UnexpectedEof,
            Self::Frame(FrameError::TooLarge { .. }) | Self::Config(_) => {
                io::ErrorKind::InvalidInput
            }
            Self::Frame(_) | Self::Json(_) => io::ErrorKind::InvalidData,
            Self::Closed => io::ErrorKind::NotConnected,
            Self::Handshake(HandshakeError::Truncated { .. }) => io::ErrorKind::UnexpectedEof,
            Self::Handshake(HandshakeError::Transport(e)) | Self::Transport(e) => e.kind(),
            Self::Rng(_)
            | Self::Crypto(_)
            | Self::Handshake(HandshakeError::Rng(_))
            | Self::Tracing(_) => {
                io::ErrorKind::Other
            }
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Transport(e) => e,
            other => Self::new(other.io_kind(), other),
        }
    }
}

/// Recover the channel error carried by an `io::Error` returned from
/// `Read`/`Write` on a secure stream.
pub fn channel_error(err: &io::Error) -> Option<&Error> {
    err.get_ref().and_then(|inner| inner.downcast_ref::<Error>())
}

/// Recover the frame error carried by an `io::Error`, if any.
pub fn frame_error(err: &io::Error) -> Option<&FrameError> {
    channel_error(err).and_then(Error::frame)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_survive_io_conversion() {
        let io_err: io::Error = Error::Frame(FrameError::VerificationFailed).into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(frame_error(&io_err), Some(&FrameError::VerificationFailed));

        let io_err: io::Error = Error::Frame(FrameError::TruncatedFrame).into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn transport_errors_pass_through_unwrapped() {
        let original = io::Error::new(io::ErrorKind::ConnectionReset, "peer gone");
        let io_err: io::Error = Error::Transport(original).into();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);
        assert!(channel_error(&io_err).is_none());
    }

    #[test]
    fn closed_maps_to_not_connected() {
        let io_err: io::Error = Error::Closed.into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotConnected);
        assert!(matches!(channel_error(&io_err), Some(Error::Closed)));
    }

    #[test]
    fn open_failure_becomes_verification_failure() {
        let err: Error = CryptoError::OpenFailed.into();
        assert_eq!(err.frame(), Some(&FrameError::VerificationFailed));
    }

    #[test]
    fn messages_are_concise() {
        let err = Error::Frame(FrameError::TooLarge {
            size: 40_000,
            max: 32_724,
        });
        assert_eq!(
            err.to_string(),
            "Frame too large: 40000 bytes exceeds limit of 32724"
        );
    }
}
