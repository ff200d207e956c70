//! Format error types

use thiserror::Error;

/// Errors produced while decoding container structures.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Magic bytes did not match any known container signature.
    #[error("invalid container magic: {0:02X?}")]
    InvalidMagic([u8; 4]),

    /// Buffer shorter than the fixed structure size.
    #[error("truncated data: expected {expected} bytes, got {actual}")]
    TruncatedData {
        /// Required length
        expected: usize,
        /// Provided length
        actual: usize,
    },

    /// Compressed stream would read or write out of bounds.
    #[error("invalid compressed data: {0}")]
    InvalidCompression(String),

    /// Output buffer could not be allocated.
    #[error("failed to allocate {0} bytes")]
    AllocationFailed(usize),

    /// Binary parsing error.
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for format operations.
pub type FormatResult<T> = Result<T, FormatError>;
