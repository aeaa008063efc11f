//! Loaded tables and the assembler that merges partition results.

use std::cmp::Ordering;

use tracing::debug;

use crate::column::ColumnBuffer;
use crate::error::{LoadError, Result};
use crate::planner::PartitionSpec;
use crate::types::{Field, Schema, Value};

/// A named column of a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub field: Field,
    pub data: ColumnBuffer,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.field.name
    }
}

/// Ordered, equal-length columns plus an optional index column.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    index: Option<Column>,
    num_rows: usize,
}

impl Table {
    /// Build a table from a schema and matching buffers.
    pub fn try_new(schema: &Schema, buffers: Vec<ColumnBuffer>) -> Result<Self> {
        if schema.len() != buffers.len() {
            return Err(LoadError::InvalidConfig(format!(
                "schema has {} fields but {} buffers were given",
                schema.len(),
                buffers.len()
            )));
        }
        let num_rows = buffers.first().map_or(0, ColumnBuffer::len);
        let mut columns = Vec::with_capacity(buffers.len());
        for (field, data) in schema.fields().iter().zip(buffers) {
            if data.data_type() != field.data_type || data.len() != num_rows {
                return Err(LoadError::InvalidConfig(format!(
                    "column '{}' is {} with {} rows, expected {} with {} rows",
                    field.name,
                    data.data_type(),
                    data.len(),
                    field.data_type,
                    num_rows
                )));
            }
            columns.push(Column {
                field: field.clone(),
                data,
            });
        }
        Ok(Self {
            columns,
            index: None,
            num_rows,
        })
    }

    pub fn empty(schema: &Schema) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| Column {
                field: f.clone(),
                data: ColumnBuffer::with_capacity(f.data_type, 0),
            })
            .collect();
        Self {
            columns,
            index: None,
            num_rows: 0,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// The index column, if the table was re-keyed.
    pub fn index(&self) -> Option<&Column> {
        self.index.as_ref()
    }

    /// One row of value columns (the index is not included).
    pub fn row(&self, i: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.data.value(i)).collect()
    }

    /// Move `name` out of the value columns into the index and stable-sort
    /// every column by it. NULLs sort last.
    pub fn set_index(mut self, name: &str) -> Result<Self> {
        if let Some(previous) = self.index.take() {
            self.columns.insert(0, previous);
        }
        let pos = self
            .columns
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| LoadError::UnknownIndexColumn(name.to_string()))?;
        let index = self.columns.remove(pos);

        let mut order: Vec<usize> = (0..self.num_rows).collect();
        // sort_by is stable, so equal keys keep partition/source order.
        order.sort_by(|&a, &b| compare_nulls_last(&index.data.value(a), &index.data.value(b)));

        let columns = self
            .columns
            .into_iter()
            .map(|c| Column {
                data: c.data.take(&order),
                field: c.field,
            })
            .collect();
        debug!("Re-keyed {} rows by index column '{}'", self.num_rows, name);

        Ok(Self {
            columns,
            index: Some(Column {
                data: index.data.take(&order),
                field: index.field,
            }),
            num_rows: self.num_rows,
        })
    }
}

/// Total order over same-typed values with NULLs last.
fn compare_nulls_last(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
        (Value::Float64(x), Value::Float64(y)) => x.total_cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        // A single column never mixes types.
        _ => Ordering::Equal,
    }
}

/// One partition's rows together with the partition it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionTable {
    pub spec: PartitionSpec,
    pub table: Table,
}

/// Merge per-partition buffers into one table.
///
/// Partitions are concatenated in `spec.index` order regardless of the
/// order they are passed in. With `index_column`, the result is re-keyed
/// and stable-sorted by that column.
pub fn assemble(
    schema: &Schema,
    mut partitions: Vec<(PartitionSpec, Vec<ColumnBuffer>)>,
    index_column: Option<&str>,
) -> Result<Table> {
    if let Some(name) = index_column {
        if schema.index_of(name).is_none() {
            return Err(LoadError::UnknownIndexColumn(name.to_string()));
        }
    }

    partitions.sort_by_key(|(spec, _)| spec.index);

    let mut merged: Vec<ColumnBuffer> = schema
        .fields()
        .iter()
        .map(|f| {
            let total = partitions
                .iter()
                .filter_map(|(_, cols)| cols.first().map(ColumnBuffer::len))
                .sum();
            ColumnBuffer::with_capacity(f.data_type, total)
        })
        .collect();

    for (spec, buffers) in partitions {
        if buffers.len() != merged.len() {
            return Err(LoadError::InvalidConfig(format!(
                "partition {} produced {} columns, schema has {}",
                spec.index,
                buffers.len(),
                merged.len()
            )));
        }
        for (target, buffer) in merged.iter_mut().zip(buffers) {
            target.extend(buffer)?;
        }
    }

    let table = Table::try_new(schema, merged)?;
    match index_column {
        Some(name) => table.set_index(name),
        None => Ok(table),
    }
}

/// Wrap each partition's buffers as its own table, in partition order.
pub fn split_partitions(
    schema: &Schema,
    mut partitions: Vec<(PartitionSpec, Vec<ColumnBuffer>)>,
) -> Result<Vec<PartitionTable>> {
    partitions.sort_by_key(|(spec, _)| spec.index);
    partitions
        .into_iter()
        .map(|(spec, buffers)| {
            Ok(PartitionTable {
                table: Table::try_new(schema, buffers)?,
                spec,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan;
    use crate::types::DataType;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64),
            Field::new("flag", DataType::Boolean),
            Field::new("name", DataType::Utf8),
        ])
        .unwrap()
    }

    fn parts() -> Vec<(PartitionSpec, Vec<ColumnBuffer>)> {
        let specs = plan("id", 0, 5, 2).unwrap();
        vec![
            (
                specs[0].clone(),
                vec![
                    ColumnBuffer::Int64(vec![Some(2), Some(0)]),
                    ColumnBuffer::Boolean(vec![Some(true), None]),
                    ColumnBuffer::Utf8(vec![Some("b".into()), Some("a".into())]),
                ],
            ),
            (
                specs[1].clone(),
                vec![
                    ColumnBuffer::Int64(vec![Some(4), Some(3)]),
                    ColumnBuffer::Boolean(vec![Some(false), Some(true)]),
                    ColumnBuffer::Utf8(vec![None, Some("c".into())]),
                ],
            ),
        ]
    }

    #[test]
    fn test_assemble_partition_order() {
        let table = assemble(&schema(), parts(), None).unwrap();
        assert_eq!(table.num_rows(), 4);
        assert_eq!(
            table.column("id").unwrap().data,
            ColumnBuffer::Int64(vec![Some(2), Some(0), Some(4), Some(3)])
        );
        assert!(table.index().is_none());
    }

    #[test]
    fn test_assemble_ignores_arrival_order() {
        let forward = assemble(&schema(), parts(), None).unwrap();
        let mut reversed_parts = parts();
        reversed_parts.reverse();
        let reversed = assemble(&schema(), reversed_parts, None).unwrap();
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_assemble_with_index_sorts_nulls_last() {
        let table = assemble(&schema(), parts(), Some("flag")).unwrap();
        let index = table.index().unwrap();
        assert_eq!(index.name(), "flag");
        assert_eq!(
            index.data,
            ColumnBuffer::Boolean(vec![Some(false), Some(true), Some(true), None])
        );
        // Stable: true rows keep their original relative order (id 2 before id 3).
        assert_eq!(
            table.column("id").unwrap().data,
            ColumnBuffer::Int64(vec![Some(4), Some(2), Some(3), Some(0)])
        );
        assert_eq!(table.column_names(), vec!["id", "name"]);
    }

    #[test]
    fn test_assemble_unknown_index_column() {
        let err = assemble(&schema(), parts(), Some("missing")).unwrap_err();
        assert!(matches!(err, LoadError::UnknownIndexColumn(c) if c == "missing"));
    }

    #[test]
    fn test_index_round_trip_matches_manual_set_index() {
        let keyed = assemble(&schema(), parts(), Some("name")).unwrap();
        let manual = assemble(&schema(), parts(), None)
            .unwrap()
            .set_index("name")
            .unwrap();
        assert_eq!(keyed, manual);
    }

    #[test]
    fn test_set_index_twice_restores_previous_index() {
        let table = assemble(&schema(), parts(), Some("flag"))
            .unwrap()
            .set_index("id")
            .unwrap();
        assert_eq!(table.index().unwrap().name(), "id");
        assert_eq!(table.column_names(), vec!["flag", "name"]);
        assert_eq!(
            table.index().unwrap().data,
            ColumnBuffer::Int64(vec![Some(0), Some(2), Some(3), Some(4)])
        );
    }

    #[test]
    fn test_try_new_rejects_ragged_columns() {
        let result = Table::try_new(
            &schema(),
            vec![
                ColumnBuffer::Int64(vec![Some(1)]),
                ColumnBuffer::Boolean(vec![]),
                ColumnBuffer::Utf8(vec![None]),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_split_partitions_keeps_specs() {
        let mut input = parts();
        input.reverse();
        let split = split_partitions(&schema(), input).unwrap();
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].spec.index, 0);
        assert_eq!(split[1].table.num_rows(), 2);
    }
}
