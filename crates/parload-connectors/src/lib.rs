//! parload connectors - sources, pooling and the parallel read path
//!
//! This crate provides:
//! - the [`Connector`] / [`SourceConnection`] seam every source implements
//! - PostgreSQL via sqlx
//! - an in-memory source for tests and embedding
//! - a bounded connection pool
//! - [`read`] / [`read_partitions`], which plan, fetch in parallel and assemble

pub mod error;
pub mod factory;
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod query;
pub mod reader;

pub use factory::{connect_uri, ConnectorFactory, ConnectorRegistry};
pub use memory::MemoryConnector;
pub use pool::{ConnectionPool, PooledConnection};
pub use postgres::PostgresConnector;
pub use reader::{read, read_partitions, PartitionOptions, PartitionedRead, ReadOptions};

use async_trait::async_trait;
use parload_core::{PartitionSpec, PartitionWriter, Result, Schema};

/// Opens connections to one data source.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Short name used in logs (e.g. `postgres`).
    fn name(&self) -> &str;

    /// Open one new physical connection.
    async fn connect(&self) -> Result<Box<dyn SourceConnection>>;
}

/// A single open connection, used by one worker at a time.
#[async_trait]
pub trait SourceConnection: Send {
    /// Resolve the result schema of `query` without fetching it in full.
    async fn describe(&mut self, query: &str) -> Result<Schema>;

    /// `MIN` and `MAX` of `column` over `query`; `None` if it has no
    /// non-null values.
    async fn fetch_range(&mut self, query: &str, column: &str) -> Result<Option<(i64, i64)>>;

    /// Run the partition's statement and stream every row into `writer`.
    async fn fetch_into(
        &mut self,
        query: &str,
        spec: &PartitionSpec,
        writer: &mut PartitionWriter,
    ) -> Result<()>;

    /// Close the connection cleanly.
    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
