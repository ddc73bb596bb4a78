//! Error types for unadf

use thiserror::Error;

/// Main error type for ADF operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad ADF signature: {0:#010x}")]
    BadSignature(u32),

    #[error("Unsupported ADF version: {0}")]
    UnsupportedVersion(u32),

    #[error("Unknown type hash: {0:#010x}")]
    UnknownType(u32),

    #[error("Size mismatch: {0}")]
    SizeMismatch(String),

    #[error("Truncated stream: need {required} bytes, have {available}")]
    TruncatedStream { required: u64, available: u64 },

    #[error("Invalid ADF file: {0}")]
    InvalidAdf(String),
}

/// Result type alias for ADF operations
pub type Result<T> = std::result::Result<T, Error>;
