//! Crypto error types.

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Random number generator failed: {0}")]
    Rng(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Sealing failed")]
    SealFailed,

    #[error("Authentication failed")]
    OpenFailed,
}
