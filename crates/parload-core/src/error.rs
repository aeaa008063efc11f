//! Typed errors shared by the loader crates.

use thiserror::Error;

/// Errors that can abort a read.
///
/// Planner errors are raised before any connection is opened. Worker errors
/// carry the index of the partition that failed.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("partition count must be at least 1, got {0}")]
    InvalidPartitionCount(usize),

    #[error("invalid partition range: low {low} is greater than high {high}")]
    InvalidRange { low: i64, high: i64 },

    #[error("connection failed: {0}")]
    ConnectionError(String),

    #[error("query failed in partition {partition}: {message}")]
    QueryError { partition: usize, message: String },

    #[error(
        "type mismatch in partition {partition}, column '{column}': expected {expected}, found {found}"
    )]
    TypeMismatch {
        partition: usize,
        column: String,
        expected: String,
        found: String,
    },

    #[error("index column '{0}' is not part of the result schema")]
    UnknownIndexColumn(String),

    #[error("column '{column}' has unsupported source type {type_name}")]
    UnsupportedType { column: String, type_name: String },

    #[error("unsupported URI: {0}")]
    UnsupportedUri(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker for partition {0} panicked")]
    WorkerPanicked(usize),

    #[error("output conversion failed: {0}")]
    Output(String),
}

impl LoadError {
    /// Partition index the error belongs to, if it came from a worker.
    pub fn partition(&self) -> Option<usize> {
        match self {
            LoadError::QueryError { partition, .. }
            | LoadError::TypeMismatch { partition, .. }
            | LoadError::WorkerPanicked(partition) => Some(*partition),
            _ => None,
        }
    }
}

impl From<arrow::error::ArrowError> for LoadError {
    fn from(e: arrow::error::ArrowError) -> Self {
        LoadError::Output(e.to_string())
    }
}

impl From<datafusion::error::DataFusionError> for LoadError {
    fn from(e: datafusion::error::DataFusionError) -> Self {
        LoadError::Output(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_query_error() {
        let err = LoadError::QueryError {
            partition: 2,
            message: "column \"nope\" does not exist".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "query failed in partition 2: column \"nope\" does not exist"
        );
        assert_eq!(err.partition(), Some(2));
    }

    #[test]
    fn test_planner_errors_have_no_partition() {
        assert_eq!(LoadError::InvalidPartitionCount(0).partition(), None);
        assert_eq!(LoadError::InvalidRange { low: 5, high: 1 }.partition(), None);
    }
}
