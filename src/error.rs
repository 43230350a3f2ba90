//! Error kinds shared by the detection engine

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt media: {0}")]
    CorruptMedia(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("analysis cancelled")]
    Cancelled,

    #[error("deadline of {budget_ms} ms exceeded")]
    Timeout { budget_ms: u64 },

    #[error("malformed metadata segment at offset {offset}: {reason}")]
    MalformedMetadataSegment { offset: u64, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl DetectionError {
    /// Operational errors are recorded as failures, never as findings.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;
