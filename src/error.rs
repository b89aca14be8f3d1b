//! Defines the crate error type.

use std::io;

/// An error type for all fallible operations in the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation was performed on 2 tensors whose shapes can't be broadcasted together.
    #[error("incompatible shapes {0:?} and {1:?}")]
    IncompatibleShapes(Vec<usize>, Vec<usize>),

    /// An operation was performed with an axis that does not exist.
    #[error("unknown axis {0}")]
    UnknownAxis(usize),

    /// The number of elements doesn't match what the shape requires.
    #[error("unexpected element count (want {expected}, but got {actual})")]
    ElementCount {
        /// Number of elements required by the shape.
        expected: usize,
        /// Number of elements received.
        actual: usize,
    },

    /// A vector or tensor has a different number of channels than expected.
    #[error("dimension mismatch (want {expected} channels, but got {actual})")]
    DimensionMismatch {
        /// Number of channels expected.
        expected: usize,
        /// Number of channels received.
        actual: usize,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A line of input text could not be turned into a record.
    #[error("malformed record at line {line}: {reason}")]
    Record {
        /// 1-based line number in the input.
        line: usize,
        /// What went wrong.
        reason: String,
    },

    /// A requested column is not in the table header.
    #[error("column {0:?} not found")]
    MissingColumn(String),

    /// An exported model can't be read back.
    #[error("unsupported model file: {0}")]
    ModelFormat(String),

    /// An I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A CSV reading failure.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// A JSON (de)serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A specialized result type for the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
