//! In-memory source.
//!
//! Serves one table of [`Value`] rows and answers every query with that
//! table, applying partition bounds itself. Used by tests and by callers that
//! want to run the partitioned read path over data they already hold.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parload_core::{infer_schema, LoadError, PartitionSpec, PartitionWriter, Result, Schema, Value};
use tracing::debug;

use crate::{Connector, SourceConnection};

/// Rows looked at when inferring a schema.
pub const SAMPLE_ROWS: usize = 64;

#[derive(Debug, Clone)]
struct Shared {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    delays: HashMap<usize, Duration>,
    failures: HashMap<usize, (usize, String)>,
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
    fail_connect: bool,
    connects: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                columns,
                rows,
                delays: HashMap::new(),
                failures: HashMap::new(),
            }),
            fail_connect: false,
            connects: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delay the fetch of one partition before its first row.
    pub fn with_delay(mut self, partition: usize, delay: Duration) -> Self {
        Arc::make_mut(&mut self.shared).delays.insert(partition, delay);
        self
    }

    /// Fail the fetch of `partition` with a query error after `after_rows`
    /// rows were streamed.
    pub fn with_failure(mut self, partition: usize, after_rows: usize, message: &str) -> Self {
        Arc::make_mut(&mut self.shared)
            .failures
            .insert(partition, (after_rows, message.to_string()));
        self
    }

    /// Every `connect` fails with a connection error.
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Number of `connect` calls made so far, failed ones included.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of partition fetches that ran to completion.
    pub fn completed_fetches(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> Result<Box<dyn SourceConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(LoadError::ConnectionError(
                "memory source refused the connection".to_string(),
            ));
        }
        Ok(Box::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            completed: Arc::clone(&self.completed),
        }))
    }
}

struct MemoryConnection {
    shared: Arc<Shared>,
    completed: Arc<AtomicUsize>,
}

impl MemoryConnection {
    fn column_index(&self, column: &str, partition: usize) -> Result<usize> {
        self.shared
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| LoadError::QueryError {
                partition,
                message: format!("column \"{column}\" does not exist"),
            })
    }

    /// The partition key of `row`, read from column `idx`.
    fn key_value(
        row: &[Value],
        idx: usize,
        column: &str,
        partition: usize,
    ) -> Result<Option<i64>> {
        let value = row.get(idx).ok_or_else(|| LoadError::QueryError {
            partition,
            message: format!(
                "row has {} values, column \"{column}\" is at position {idx}",
                row.len()
            ),
        })?;
        match value {
            Value::Int64(v) => Ok(Some(*v)),
            Value::Null => Ok(None),
            other => Err(LoadError::QueryError {
                partition,
                message: format!(
                    "partition column \"{column}\" must be an integer, found {}",
                    other.type_name()
                ),
            }),
        }
    }
}

#[async_trait]
impl SourceConnection for MemoryConnection {
    async fn describe(&mut self, _query: &str) -> Result<Schema> {
        let sample_end = self.shared.rows.len().min(SAMPLE_ROWS);
        infer_schema(&self.shared.columns, &self.shared.rows[..sample_end])
    }

    async fn fetch_range(&mut self, _query: &str, column: &str) -> Result<Option<(i64, i64)>> {
        let idx = self.column_index(column, 0)?;
        let mut range: Option<(i64, i64)> = None;
        for row in &self.shared.rows {
            if let Some(v) = Self::key_value(row, idx, column, 0)? {
                range = Some(match range {
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                    None => (v, v),
                });
            }
        }
        Ok(range)
    }

    async fn fetch_into(
        &mut self,
        _query: &str,
        spec: &PartitionSpec,
        writer: &mut PartitionWriter,
    ) -> Result<()> {
        let partition = writer.partition();
        if let Some(delay) = self.shared.delays.get(&partition) {
            tokio::time::sleep(*delay).await;
        }
        let column_idx = match &spec.column {
            Some(column) => Some((self.column_index(column, partition)?, column.as_str())),
            None => None,
        };
        let failure = self.shared.failures.get(&partition);

        let mut streamed = 0usize;
        for row in &self.shared.rows {
            if let Some((idx, column)) = column_idx {
                let key = Self::key_value(row, idx, column, partition)?;
                if !spec.contains(key) {
                    continue;
                }
            }
            if let Some((after_rows, message)) = failure {
                if streamed == *after_rows {
                    return Err(LoadError::QueryError {
                        partition,
                        message: message.clone(),
                    });
                }
            }
            writer.append(row.clone())?;
            streamed += 1;
            // Let sibling workers interleave, as a network source would.
            tokio::task::yield_now().await;
        }

        if let Some((_, message)) = failure {
            return Err(LoadError::QueryError {
                partition,
                message: message.clone(),
            });
        }

        debug!("Memory partition {} streamed {} rows", partition, streamed);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
