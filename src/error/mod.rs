//! Error handling for the vulnerability pipeline.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

/// Errors raised while reading, mapping, scoring or exporting household tables
#[derive(Debug, thiserror::Error)]
pub enum VulnError {
    /// Error opening or reading a file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from an Arrow kernel, reader or writer
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error writing Parquet output
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Error converting between record batches and typed records
    #[error("Record conversion error: {0}")]
    SerdeArrow(#[from] serde_arrow::Error),

    /// Error serializing assessments
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No candidate delimiter/encoding produced a known column signature
    #[error("Could not detect the layout of {path} after {attempts} delimiter/encoding attempts")]
    FormatDetection {
        /// File that failed detection
        path: String,
        /// Number of candidate configurations tried
        attempts: usize,
    },

    /// A file was detected as a different layout than the role it was given
    #[error("{path} was detected as {found} but was supplied as {expected}")]
    UnexpectedLayout {
        /// File path
        path: String,
        /// Layout required by its role
        expected: &'static str,
        /// Layout actually detected
        found: &'static str,
    },

    /// Unrecognized missing-value strategy name
    #[error("Unknown missing-value strategy '{0}' (expected median, mean, mode or drop)")]
    UnknownStrategy(String),

    /// Z-score normalization over a batch without usable variance
    #[error("Cannot normalize '{column}': zero or undefined variance over {rows} rows")]
    DivisionDegenerate {
        /// Column being normalized
        column: String,
        /// Rows in the batch
        rows: usize,
    },

    /// More than one reference person claimed the same household
    #[error("Household {household_id} has {count} reference persons")]
    DuplicateReferencePerson {
        /// Household identifier
        household_id: String,
        /// Number of reference-person rows found
        count: usize,
    },

    /// A required column is absent
    #[error("Column '{column}' not found")]
    ColumnNotFound {
        /// Column name
        column: String,
    },

    /// A column has a type that cannot be used for the requested operation
    #[error("Column '{column}' cannot be read as {expected}")]
    ColumnType {
        /// Column name
        column: String,
        /// Expected type description
        expected: String,
    },

    /// A column that must be complete still holds nulls
    #[error("Column '{column}' has {nulls} null values; apply a missing-value strategy first")]
    NullValues {
        /// Column name
        column: String,
        /// Number of nulls
        nulls: usize,
    },

    /// A vulnerability score is NaN and cannot be classified
    #[error("Vulnerability score at row {row} is not a number")]
    NonFiniteScore {
        /// Row index within the batch
        row: usize,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure reported by an external tier model
    #[error("Model error: {0}")]
    Model(String),
}

impl VulnError {
    /// Create a column-not-found error
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
        }
    }

    /// Create a column type error
    pub fn column_type(column: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::ColumnType {
            column: column.into(),
            expected: expected.into(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, VulnError>;
