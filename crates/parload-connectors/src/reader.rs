//! The partitioned read path.
//!
//! `read` validates and plans, resolves the schema on one pooled
//! connection, then spawns one worker per partition. Workers run in a
//! `JoinSet`; the first failure aborts the rest and the read returns that
//! error with no table. Results are assembled in partition order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parload_core::{
    assemble, plan, plan_with_outside, split_partitions, to_mem_table, ColumnBuffer, LoadError,
    MemTable, PartitionSpec, PartitionTable, PartitionWriter, Result, Schema, Table,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::pool::ConnectionPool;
use crate::Connector;

/// How to split a read over an integer column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionOptions {
    /// Integer column the bounds apply to.
    pub column: String,
    /// Inclusive `(low, high)`. Looked up with `MIN`/`MAX` when absent.
    #[serde(default)]
    pub range: Option<(i64, i64)>,
    /// Number of range partitions.
    pub num: usize,
    /// Add a catch-all partition for rows outside the range and NULL keys.
    #[serde(default)]
    pub include_outside: bool,
}

/// Everything a read needs besides the connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadOptions {
    pub query: String,
    #[serde(default)]
    pub partition: Option<PartitionOptions>,
    #[serde(default)]
    pub index_column: Option<String>,
    /// Explicit schema; skips the connector's describe query.
    #[serde(default)]
    pub schema: Option<Schema>,
}

impl ReadOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn partition_on(
        mut self,
        column: impl Into<String>,
        range: Option<(i64, i64)>,
        num: usize,
    ) -> Self {
        self.partition = Some(PartitionOptions {
            column: column.into(),
            range,
            num,
            include_outside: false,
        });
        self
    }

    /// Also fetch rows outside the range (and NULL keys) as a last partition.
    /// No effect on an unpartitioned read.
    pub fn include_outside(mut self, include: bool) -> Self {
        if let Some(p) = self.partition.as_mut() {
            p.include_outside = include;
        }
        self
    }

    pub fn index_column(mut self, column: impl Into<String>) -> Self {
        self.index_column = Some(column.into());
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Check everything that can be checked without a connection. Returns the
    /// plan when the partition range is already known.
    pub fn validate(&self) -> Result<Option<Vec<PartitionSpec>>> {
        if self.query.trim().is_empty() {
            return Err(LoadError::InvalidConfig("query cannot be empty".to_string()));
        }
        match &self.partition {
            None => Ok(None),
            Some(p) if p.num == 0 => Err(LoadError::InvalidPartitionCount(p.num)),
            Some(p) if p.column.trim().is_empty() => Err(LoadError::InvalidConfig(
                "partition column cannot be empty".to_string(),
            )),
            Some(PartitionOptions {
                range: Some((low, high)),
                ..
            }) => plan_partitions(self.partition.as_ref(), *low, *high).map(Some),
            Some(_) => Ok(None),
        }
    }
}

fn plan_partitions(
    partition: Option<&PartitionOptions>,
    low: i64,
    high: i64,
) -> Result<Vec<PartitionSpec>> {
    match partition {
        Some(p) if p.include_outside => plan_with_outside(&p.column, low, high, p.num),
        Some(p) => plan(&p.column, low, high, p.num),
        None => Ok(vec![PartitionSpec::unbounded()]),
    }
}

/// A read kept split by partition, for adapters that schedule partitions
/// independently.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedRead {
    pub schema: Schema,
    pub partitions: Vec<PartitionTable>,
}

impl PartitionedRead {
    pub fn num_rows(&self) -> usize {
        self.partitions.iter().map(|p| p.table.num_rows()).sum()
    }

    /// DataFusion table with one partition per `PartitionSpec`.
    pub fn to_mem_table(&self) -> Result<MemTable> {
        to_mem_table(&self.schema, &self.partitions)
    }
}

/// Read `options.query` from `connector` in parallel partitions and return
/// one table in partition order.
pub async fn read(connector: Arc<dyn Connector>, options: &ReadOptions) -> Result<Table> {
    let started = Instant::now();
    let (schema, partitions) = fetch_all(connector, options).await?;
    let table = assemble(&schema, partitions, options.index_column.as_deref())?;
    info!(
        "Read {} rows x {} columns in {:?}",
        table.num_rows(),
        table.num_columns(),
        started.elapsed()
    );
    Ok(table)
}

/// Like [`read`], but keep each partition as its own table. With an index
/// column, each partition is keyed and sorted on its own.
pub async fn read_partitions(
    connector: Arc<dyn Connector>,
    options: &ReadOptions,
) -> Result<PartitionedRead> {
    let (schema, partitions) = fetch_all(connector, options).await?;
    let mut partitions = split_partitions(&schema, partitions)?;
    if let Some(index) = options.index_column.as_deref() {
        partitions = partitions
            .into_iter()
            .map(|p| {
                Ok(PartitionTable {
                    table: p.table.set_index(index)?,
                    spec: p.spec,
                })
            })
            .collect::<Result<Vec<_>>>()?;
    }
    Ok(PartitionedRead { schema, partitions })
}

type FetchedPartition = (PartitionSpec, Vec<ColumnBuffer>);

async fn fetch_all(
    connector: Arc<dyn Connector>,
    options: &ReadOptions,
) -> Result<(Schema, Vec<FetchedPartition>)> {
    let planned = options.validate()?;
    let capacity = match (&planned, &options.partition) {
        (Some(specs), _) => specs.len(),
        (None, Some(p)) => p.num + usize::from(p.include_outside),
        (None, None) => 1,
    };
    let pool = ConnectionPool::new(Arc::clone(&connector), capacity);
    info!(
        "Reading from {} source with up to {} connections",
        connector.name(),
        pool.capacity()
    );

    let result = fetch_with_pool(&pool, options, planned).await;
    pool.close().await;
    result
}

async fn fetch_with_pool(
    pool: &Arc<ConnectionPool>,
    options: &ReadOptions,
    planned: Option<Vec<PartitionSpec>>,
) -> Result<(Schema, Vec<FetchedPartition>)> {
    let (schema, specs) = {
        let mut conn = pool.acquire().await?;

        let schema = match &options.schema {
            Some(schema) => schema.clone(),
            None => conn.describe(&options.query).await?,
        };
        if let Some(index) = &options.index_column {
            if schema.index_of(index).is_none() {
                return Err(LoadError::UnknownIndexColumn(index.clone()));
            }
        }

        let specs = match (planned, &options.partition) {
            (Some(specs), _) => specs,
            (None, Some(p)) => match conn.fetch_range(&options.query, &p.column).await? {
                Some((low, high)) => {
                    debug!("Looked up range of '{}': [{}, {}]", p.column, low, high);
                    plan_partitions(Some(p), low, high)?
                }
                // No non-null keys: only the catch-all could hold rows.
                None if p.include_outside => vec![PartitionSpec::unbounded()],
                None => Vec::new(),
            },
            (None, None) => vec![PartitionSpec::unbounded()],
        };
        (schema, specs)
    };

    if specs.is_empty() {
        info!("Partition column has no values; returning an empty result");
        return Ok((schema, Vec::new()));
    }
    info!("Fetching {} partitions", specs.len());

    let mut workers = JoinSet::new();
    let mut task_partitions = HashMap::with_capacity(specs.len());
    for spec in specs {
        let index = spec.index;
        let pool = Arc::clone(pool);
        let schema = schema.clone();
        let query = options.query.clone();
        let handle =
            workers.spawn(async move { fetch_partition(pool, &query, spec, schema).await });
        task_partitions.insert(handle.id(), index);
    }

    let mut fetched = Vec::with_capacity(task_partitions.len());
    while let Some(joined) = workers.join_next().await {
        let outcome = joined.map_err(|e| {
            let index = task_partitions.get(&e.id()).copied().unwrap_or_default();
            LoadError::WorkerPanicked(index)
        });
        match outcome.and_then(|r| r) {
            Ok(partition) => fetched.push(partition),
            Err(e) => {
                warn!(
                    "Read failed ({}); cancelling {} outstanding workers",
                    e,
                    workers.len()
                );
                workers.abort_all();
                return Err(e);
            }
        }
    }

    Ok((schema, fetched))
}

/// One worker: own a connection and a writer for exactly one partition.
async fn fetch_partition(
    pool: Arc<ConnectionPool>,
    query: &str,
    spec: PartitionSpec,
    schema: Schema,
) -> Result<FetchedPartition> {
    let mut conn = pool.acquire().await?;
    let mut writer = PartitionWriter::new(spec.index, schema);
    let started = Instant::now();

    match conn.fetch_into(query, &spec, &mut writer).await {
        Ok(()) => {
            debug!(
                "Partition {} fetched {} rows in {:?}",
                spec.index,
                writer.num_rows(),
                started.elapsed()
            );
            pool.release(conn);
            Ok((spec, writer.finish()))
        }
        Err(e) => {
            conn.discard();
            Err(e)
        }
    }
}
