//! Error and Result types for star-tree record store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The error type for record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing region could not be created or mapped.
    #[error("Cannot open store at {path:?}: {reason}")]
    StoreOpen {
        /// Path of the backing region.
        path: PathBuf,
        /// Why the open attempt failed.
        reason: String,
    },

    /// An append would write past the provisioned capacity.
    #[error("Capacity exceeded: {required} bytes required, {capacity} bytes provisioned")]
    CapacityExceeded {
        /// Bytes the region would need to hold after the append.
        required: usize,
        /// Bytes provisioned for the region.
        capacity: usize,
    },

    /// A stored record could not be decoded.
    #[error("Corrupt record at offset {offset}: {reason}")]
    CorruptRecord {
        /// Byte offset of the record within the region.
        offset: usize,
        /// What was wrong with the record.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// The dimension/metric schema is unusable.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// The dictionary conflicts with the reserved sentinel ids or the schema.
    #[error("Invalid dictionary: {0}")]
    InvalidDictionary(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A record does not have one value per schema dimension and metric.
    #[error(
        "Record shape mismatch: expected {expected_dimensions} dimensions and {expected_metrics} metrics, \
         got {actual_dimensions} and {actual_metrics}"
    )]
    RecordShape {
        /// Dimension count required by the schema.
        expected_dimensions: usize,
        /// Dimension count carried by the record.
        actual_dimensions: usize,
        /// Metric count required by the schema.
        expected_metrics: usize,
        /// Metric count carried by the record.
        actual_metrics: usize,
    },

    /// The store is not open.
    #[error("Store is closed")]
    StoreClosed,

    /// A leader task failed while processing tables.
    #[error("Task {task} failed: {reason}")]
    TaskFailed {
        /// Name of the failing task.
        task: String,
        /// Failure description.
        reason: String,
    },
}

impl StoreError {
    pub(crate) fn open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StoreOpen {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }
}
