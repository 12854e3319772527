use thiserror::Error;

use crate::suite::CryptoId;

/// Result alias used throughout the container codec.
pub type Result<T> = std::result::Result<T, AxCryptError>;

/// Error types for container parsing, key handling and decryption
#[derive(Debug, Error)]
pub enum AxCryptError {
    /// Structurally invalid input: missing marker, bad block length,
    /// misplaced Preamble, or a stream that ended where data was required
    #[error("Malformed format: {0}")]
    Malformed(String),

    /// The recomputed tag disagrees with the stored one, or no credential
    /// unwrapped the content key
    #[error("Authentication failed: wrong key or tampered data")]
    Authentication,

    /// A block references a crypto suite that is not installed
    #[error("Unsupported crypto suite: {0}")]
    UnsupportedSuite(CryptoId),

    /// API misuse by the caller
    #[error("Usage fault: {0}")]
    Usage(String),

    /// The progress sink asked us to stop
    #[error("Operation cancelled")]
    Cancelled,

    /// Key material errors (bad length, bad encoding)
    #[error("Key error: {0}")]
    Key(String),

    /// Underlying I/O errors
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl AxCryptError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    pub fn key(msg: impl Into<String>) -> Self {
        Self::Key(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Map an I/O error raised while a complete block or payload was expected.
    /// A short read there means the container is truncated, not that the disk failed.
    pub(crate) fn from_payload_io(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Malformed(format!("premature end of stream: {}", err))
        } else {
            Self::Storage(err)
        }
    }
}
