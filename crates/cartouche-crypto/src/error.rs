//! Error types for cartouche-crypto operations.

use thiserror::Error;

/// Errors that can occur during crypto operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Invalid key format in a key file.
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Keystream position out of range for the cipher.
    #[error("keystream exhausted or seek out of range")]
    KeystreamOutOfRange,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
