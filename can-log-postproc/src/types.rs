//! Core types for the post-processor library
//!
//! This module defines the identifiers shared by every stage (path keys,
//! message groups), the timestamp helpers and the library error type.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Timestamp type used at the edges of the library (formatting, reports)
pub type Timestamp = DateTime<Utc>;

/// Result type for post-processing operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Sentinel message list meaning "every message of every group"
pub const ALL_MESSAGES: &str = "ALL";

/// Identifies one physical log file's decoded output across all its messages
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathKey {
    /// Device serial (first path component)
    pub device: String,
    /// Date as `yyyy/mm/dd`
    pub date: String,
    /// Decoded file name, including its `.parquet` extension
    pub file_name: String,
}

impl PathKey {
    pub fn new(
        device: impl Into<String>,
        date: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            date: date.into(),
            file_name: file_name.into(),
        }
    }

    /// Relative path of one message's decoded file for this key
    pub fn message_path(&self, message: &str) -> PathBuf {
        let mut path = PathBuf::from(&self.device);
        path.push(message);
        for part in self.date.split('/') {
            path.push(part);
        }
        path.push(&self.file_name);
        path
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.device, self.date, self.file_name)
    }
}

/// Mapping from path key to the messages present for that key (index order)
pub type MessageGroup = BTreeMap<PathKey, Vec<String>>;

/// Errors that can occur while post-processing decoded data
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid raster: {0:?}")]
    InvalidRaster(String),

    #[error("Decoded file not found: {0:?}")]
    MissingDecodedFile(PathBuf),

    #[error("Signal not found: {0}")]
    SignalNotFound(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Object store error: {0}")]
    Storage(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("No Parquet files to upload from {0:?}")]
    NothingToUpload(PathBuf),
}

/// Convert microseconds since epoch into a UTC timestamp
pub fn timestamp_from_micros(micros: i64) -> Option<Timestamp> {
    DateTime::from_timestamp_micros(micros)
}

/// Format microseconds since epoch with a chrono format string
///
/// Out-of-range values fall back to the raw microsecond count.
pub fn format_micros(micros: i64, format: &str) -> String {
    match timestamp_from_micros(micros) {
        Some(ts) => ts.format(format).to_string(),
        None => micros.to_string(),
    }
}
