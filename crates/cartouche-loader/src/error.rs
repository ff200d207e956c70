//! Loader error types

use cartouche_formats::FormatError;
use thiserror::Error;

/// Errors reported by the container loading pipeline.
///
/// `load()` is the single failure-reporting entry point for startup; every
/// internal helper failure surfaces through it verbatim.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The image is not a recognizable container, or carries corrupt data.
    #[error("invalid container format: {0}")]
    InvalidFormat(String),

    /// The container is encrypted and key derivation or validation failed.
    #[error("container is encrypted: {0}")]
    Encrypted(String),

    /// The requested section or region is legitimately absent.
    #[error("requested content is not present")]
    NotUsed,

    /// A section or output buffer was too large to allocate.
    #[error("failed to allocate {0} bytes")]
    MemoryAllocationFailed(usize),

    /// `load()` was called on an already loaded container.
    #[error("container is already loaded")]
    AlreadyLoaded,

    /// An accessor requiring a loaded container was called too early.
    #[error("container is not loaded")]
    NotLoaded,

    /// I/O failure on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FormatError> for LoadError {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::AllocationFailed(size) => Self::MemoryAllocationFailed(size),
            FormatError::Io(e) => Self::Io(e),
            other => Self::InvalidFormat(other.to_string()),
        }
    }
}

/// Result type for loader operations.
pub type LoadResult<T> = Result<T, LoadError>;
