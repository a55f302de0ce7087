//! Error types for Bitrank.
//!
//! Quantization and dimension errors are returned to the immediate caller.
//! Missing lookups during rerank or join are absorbed by the retriever and
//! never surface here.

use thiserror::Error;

use crate::cancel::QueryStage;
use crate::chunk::ChunkId;
use crate::config::ConfigError;

/// Result type alias for Bitrank operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Bitrank operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Vector length disagrees with the configured dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension of the rejected input.
        actual: usize,
    },

    /// Packed binary code has the wrong number of bytes.
    #[error("Binary code length mismatch: expected {expected} bytes, got {actual}")]
    CodeLengthMismatch {
        /// Expected byte length (`ceil(D / 8)`).
        expected: usize,
        /// Byte length of the rejected code.
        actual: usize,
    },

    /// Chunk id already present (delete before re-inserting).
    #[error("Chunk '{0}' already exists")]
    DuplicateId(ChunkId),

    /// Chunk id not present.
    #[error("Chunk '{0}' not found")]
    NotFound(ChunkId),

    /// Index slot space exhausted.
    #[error("Index capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Invalid engine parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Query cancelled by its caller.
    #[error("Query cancelled during {0}")]
    Cancelled(QueryStage),

    /// Query deadline elapsed.
    #[error("Query timed out during {0}")]
    Timeout(QueryStage),

    /// Snapshot is malformed or inconsistent.
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Returns true for errors caused by caller-side cancellation or deadlines.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DimensionMismatch {
            expected: 384,
            actual: 12,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 384, got 12");
        assert_eq!(Error::DuplicateId(7).to_string(), "Chunk '7' already exists");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_cancellation_classification() {
        assert!(Error::Cancelled(QueryStage::Rerank).is_cancellation());
        assert!(Error::Timeout(QueryStage::BinarySearch).is_cancellation());
        assert!(!Error::NotFound(1).is_cancellation());
    }
}
