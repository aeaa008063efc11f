//! Mapping of driver errors into [`LoadError`].

use parload_core::LoadError;

/// Attach a driver error to the [`LoadError`] variant for its context.
pub trait ResultExt<T> {
    /// The error happened while opening a connection.
    fn connection_err(self) -> Result<T, LoadError>;

    /// The error happened while running a statement for `partition`.
    fn query_err(self, partition: usize) -> Result<T, LoadError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn connection_err(self) -> Result<T, LoadError> {
        self.map_err(|e| LoadError::ConnectionError(e.to_string()))
    }

    fn query_err(self, partition: usize) -> Result<T, LoadError> {
        self.map_err(|e| LoadError::QueryError {
            partition,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_err_keeps_partition_and_message() {
        let r: Result<(), String> = Err("relation \"t\" does not exist".to_string());
        match r.query_err(4) {
            Err(LoadError::QueryError { partition, message }) => {
                assert_eq!(partition, 4);
                assert!(message.contains("does not exist"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_connection_err() {
        let r: Result<(), &str> = Err("refused");
        assert!(matches!(
            r.connection_err(),
            Err(LoadError::ConnectionError(m)) if m == "refused"
        ));
    }
}
