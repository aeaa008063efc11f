//! PostgreSQL source
//!
//! Each worker holds its own `PgConnection` and runs one range-bounded
//! statement. Rows are streamed with `fetch` and decoded straight into the
//! partition's column writer. The schema comes from preparing the caller's
//! query, so no rows are read to learn column types.

use async_trait::async_trait;
use futures::TryStreamExt;
use parload_core::{
    DataType, Field, LoadError, PartitionSpec, PartitionWriter, Result, Schema, Value,
};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo};
use tracing::debug;

use crate::error::ResultExt;
use crate::query::{normalize_query, partition_query, range_query};
use crate::{Connector, SourceConnection};

/// Opens `PgConnection`s to one database.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    conn_string: String,
}

impl PostgresConnector {
    pub fn new(conn_string: impl Into<String>) -> Self {
        Self {
            conn_string: conn_string.into(),
        }
    }

    /// Access the connection string.
    pub fn conn_string(&self) -> &str {
        &self.conn_string
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn connect(&self) -> Result<Box<dyn SourceConnection>> {
        let conn = PgConnection::connect(&self.conn_string)
            .await
            .connection_err()?;
        Ok(Box::new(PostgresConnection { conn }))
    }
}

struct PostgresConnection {
    conn: PgConnection,
}

#[async_trait]
impl SourceConnection for PostgresConnection {
    async fn describe(&mut self, query: &str) -> Result<Schema> {
        let statement = (&mut self.conn)
            .prepare(normalize_query(query))
            .await
            .query_err(0)?;

        let mut fields = Vec::with_capacity(statement.columns().len());
        for column in statement.columns() {
            let type_name = column.type_info().name();
            let data_type =
                pg_type_to_data_type(type_name).ok_or_else(|| LoadError::UnsupportedType {
                    column: column.name().to_string(),
                    type_name: type_name.to_string(),
                })?;
            fields.push(Field::new(column.name(), data_type));
        }
        Schema::new(fields)
    }

    async fn fetch_range(&mut self, query: &str, column: &str) -> Result<Option<(i64, i64)>> {
        let sql = range_query(query, column);
        debug!("Range query: {}", sql);
        let (min, max): (Option<i64>, Option<i64>) = sqlx::query_as(&sql)
            .fetch_one(&mut self.conn)
            .await
            .query_err(0)?;
        Ok(min.zip(max))
    }

    async fn fetch_into(
        &mut self,
        query: &str,
        spec: &PartitionSpec,
        writer: &mut PartitionWriter,
    ) -> Result<()> {
        let partition = writer.partition();
        let sql = partition_query(query, spec);
        debug!("Partition {} query: {}", partition, sql);

        let mut rows = sqlx::query(&sql).fetch(&mut self.conn);
        while let Some(row) = rows.try_next().await.query_err(partition)? {
            let values = decode_row(&row, writer.schema(), partition)?;
            writer.append(values)?;
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await.connection_err()
    }
}

/// Decode one row into values matching `schema`, column by column.
fn decode_row(row: &PgRow, schema: &Schema, partition: usize) -> Result<Vec<Value>> {
    if row.len() != schema.len() {
        return Err(LoadError::QueryError {
            partition,
            message: format!(
                "row has {} columns, schema has {}",
                row.len(),
                schema.len()
            ),
        });
    }

    row.columns()
        .iter()
        .zip(schema.fields())
        .map(|(column, field)| {
            let i = column.ordinal();
            let type_name = column.type_info().name();
            let mismatch = |found: String| LoadError::TypeMismatch {
                partition,
                column: field.name.clone(),
                expected: field.data_type.to_string(),
                found,
            };

            let decoded: sqlx::Result<Value> = match (field.data_type, type_name) {
                (DataType::Int64 | DataType::Float64, "INT2") => row
                    .try_get::<Option<i16>, _>(i)
                    .map(|v| v.map(i64::from).into()),
                (DataType::Int64 | DataType::Float64, "INT4") => row
                    .try_get::<Option<i32>, _>(i)
                    .map(|v| v.map(i64::from).into()),
                (DataType::Int64 | DataType::Float64, "INT8") => {
                    row.try_get::<Option<i64>, _>(i).map(Value::from)
                }
                (DataType::Float64, "FLOAT4") => row
                    .try_get::<Option<f32>, _>(i)
                    .map(|v| v.map(f64::from).into()),
                (DataType::Float64, "FLOAT8") => row.try_get::<Option<f64>, _>(i).map(Value::from),
                (DataType::Boolean, "BOOL") => row.try_get::<Option<bool>, _>(i).map(Value::from),
                (DataType::Utf8, "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME") => {
                    row.try_get::<Option<String>, _>(i).map(Value::from)
                }
                (_, other) => return Err(mismatch(other.to_string())),
            };
            decoded.map_err(|e| mismatch(format!("{type_name} ({e})")))
        })
        .collect()
}

/// Map a PostgreSQL type name (as reported by the driver) to a column type.
///
/// Returns `None` for types outside the loader's closed type set.
pub fn pg_type_to_data_type(type_name: &str) -> Option<DataType> {
    match type_name.to_uppercase().as_str() {
        "INT2" | "INT4" | "INT8" | "SMALLINT" | "INTEGER" | "BIGINT" => Some(DataType::Int64),
        "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE PRECISION" => Some(DataType::Float64),
        "BOOL" | "BOOLEAN" => Some(DataType::Boolean),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "CHARACTER VARYING" => {
            Some(DataType::Utf8)
        }
        _ => None,
    }
}
