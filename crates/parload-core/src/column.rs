//! Typed column buffers and the per-partition row writer.

use crate::error::{LoadError, Result};
use crate::types::{DataType, Schema, Value};

/// A typed, nullable column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnBuffer {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
    Utf8(Vec<Option<String>>),
}

impl ColumnBuffer {
    pub fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Int64 => ColumnBuffer::Int64(Vec::with_capacity(capacity)),
            DataType::Float64 => ColumnBuffer::Float64(Vec::with_capacity(capacity)),
            DataType::Boolean => ColumnBuffer::Boolean(Vec::with_capacity(capacity)),
            DataType::Utf8 => ColumnBuffer::Utf8(Vec::with_capacity(capacity)),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnBuffer::Int64(_) => DataType::Int64,
            ColumnBuffer::Float64(_) => DataType::Float64,
            ColumnBuffer::Boolean(_) => DataType::Boolean,
            ColumnBuffer::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnBuffer::Int64(v) => v.len(),
            ColumnBuffer::Float64(v) => v.len(),
            ColumnBuffer::Boolean(v) => v.len(),
            ColumnBuffer::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnBuffer::Int64(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnBuffer::Float64(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnBuffer::Boolean(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnBuffer::Utf8(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Push one value, returning the value back if it does not fit the
    /// column type. Integers are accepted into float columns.
    pub fn push(&mut self, value: Value) -> std::result::Result<(), Value> {
        match (self, value) {
            (ColumnBuffer::Int64(v), Value::Null) => v.push(None),
            (ColumnBuffer::Float64(v), Value::Null) => v.push(None),
            (ColumnBuffer::Boolean(v), Value::Null) => v.push(None),
            (ColumnBuffer::Utf8(v), Value::Null) => v.push(None),
            (ColumnBuffer::Int64(v), Value::Int64(x)) => v.push(Some(x)),
            (ColumnBuffer::Float64(v), Value::Float64(x)) => v.push(Some(x)),
            (ColumnBuffer::Float64(v), Value::Int64(x)) => v.push(Some(x as f64)),
            (ColumnBuffer::Boolean(v), Value::Bool(x)) => v.push(Some(x)),
            (ColumnBuffer::Utf8(v), Value::Str(x)) => v.push(Some(x)),
            (_, other) => return Err(other),
        }
        Ok(())
    }

    /// Read back one cell as a [`Value`].
    pub fn value(&self, row: usize) -> Value {
        match self {
            ColumnBuffer::Int64(v) => v[row].into(),
            ColumnBuffer::Float64(v) => v[row].into(),
            ColumnBuffer::Boolean(v) => v[row].into(),
            ColumnBuffer::Utf8(v) => v[row].clone().into(),
        }
    }

    /// Append another buffer of the same type.
    pub fn extend(&mut self, other: ColumnBuffer) -> Result<()> {
        match (self, other) {
            (ColumnBuffer::Int64(a), ColumnBuffer::Int64(b)) => a.extend(b),
            (ColumnBuffer::Float64(a), ColumnBuffer::Float64(b)) => a.extend(b),
            (ColumnBuffer::Boolean(a), ColumnBuffer::Boolean(b)) => a.extend(b),
            (ColumnBuffer::Utf8(a), ColumnBuffer::Utf8(b)) => a.extend(b),
            (a, b) => {
                return Err(LoadError::InvalidConfig(format!(
                    "cannot concatenate {} buffer onto {} buffer",
                    b.data_type(),
                    a.data_type()
                )))
            }
        }
        Ok(())
    }

    /// Reorder rows so that row `i` of the result is row `order[i]` of self.
    pub fn take(&self, order: &[usize]) -> ColumnBuffer {
        match self {
            ColumnBuffer::Int64(v) => ColumnBuffer::Int64(order.iter().map(|&i| v[i]).collect()),
            ColumnBuffer::Float64(v) => {
                ColumnBuffer::Float64(order.iter().map(|&i| v[i]).collect())
            }
            ColumnBuffer::Boolean(v) => {
                ColumnBuffer::Boolean(order.iter().map(|&i| v[i]).collect())
            }
            ColumnBuffer::Utf8(v) => {
                ColumnBuffer::Utf8(order.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// Column builder owned by a single fetch worker.
///
/// Holds one buffer per schema field for exactly one partition. Rows are
/// appended as they stream in; nothing else writes to these buffers.
#[derive(Debug)]
pub struct PartitionWriter {
    partition: usize,
    schema: Schema,
    columns: Vec<ColumnBuffer>,
}

impl PartitionWriter {
    pub fn new(partition: usize, schema: Schema) -> Self {
        Self::with_capacity(partition, schema, 0)
    }

    pub fn with_capacity(partition: usize, schema: Schema, capacity: usize) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| ColumnBuffer::with_capacity(f.data_type, capacity))
            .collect();
        Self {
            partition,
            schema,
            columns,
        }
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, ColumnBuffer::len)
    }

    /// Append one row, checking every value against the schema.
    ///
    /// The row is validated before any buffer is touched, so a failed append
    /// leaves all columns at the same length.
    pub fn append(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(LoadError::QueryError {
                partition: self.partition,
                message: format!(
                    "row has {} values, schema has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            });
        }
        for (field, value) in self.schema.fields().iter().zip(&row) {
            let fits = match (field.data_type, value) {
                (_, Value::Null) => field.nullable,
                (DataType::Float64, Value::Int64(_)) => true,
                (expected, v) => v.data_type() == Some(expected),
            };
            if !fits {
                return Err(LoadError::TypeMismatch {
                    partition: self.partition,
                    column: field.name.clone(),
                    expected: field.data_type.to_string(),
                    found: value.type_name().to_string(),
                });
            }
        }
        for (buffer, value) in self.columns.iter_mut().zip(row) {
            // Types were checked above.
            let _ = buffer.push(value);
        }
        Ok(())
    }

    pub fn finish(self) -> Vec<ColumnBuffer> {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64),
            Field::new("score", DataType::Float64),
            Field::non_null("name", DataType::Utf8),
        ])
        .unwrap()
    }

    #[test]
    fn test_append_rows() {
        let mut writer = PartitionWriter::new(0, schema());
        writer
            .append(vec![1i64.into(), 2.5.into(), "a".into()])
            .unwrap();
        writer
            .append(vec![Value::Null, 3i64.into(), "b".into()])
            .unwrap();
        assert_eq!(writer.num_rows(), 2);
        let cols = writer.finish();
        assert_eq!(cols[0], ColumnBuffer::Int64(vec![Some(1), None]));
        assert_eq!(cols[1], ColumnBuffer::Float64(vec![Some(2.5), Some(3.0)]));
        assert_eq!(
            cols[2],
            ColumnBuffer::Utf8(vec![Some("a".to_string()), Some("b".to_string())])
        );
    }

    #[test]
    fn test_append_type_mismatch_reports_partition() {
        let mut writer = PartitionWriter::new(3, schema());
        let err = writer
            .append(vec!["oops".into(), 1.0.into(), "a".into()])
            .unwrap_err();
        match err {
            LoadError::TypeMismatch {
                partition, column, ..
            } => {
                assert_eq!(partition, 3);
                assert_eq!(column, "id");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing was written for the rejected row.
        assert_eq!(writer.num_rows(), 0);
    }

    #[test]
    fn test_null_in_non_nullable_column() {
        let mut writer = PartitionWriter::new(0, schema());
        let err = writer
            .append(vec![1i64.into(), 1.0.into(), Value::Null])
            .unwrap_err();
        assert!(matches!(err, LoadError::TypeMismatch { .. }));
    }

    #[test]
    fn test_take_reorders() {
        let col = ColumnBuffer::Boolean(vec![Some(true), None, Some(false)]);
        assert_eq!(
            col.take(&[2, 0, 1]),
            ColumnBuffer::Boolean(vec![Some(false), Some(true), None])
        );
    }

    #[test]
    fn test_extend_type_mismatch() {
        let mut a = ColumnBuffer::Int64(vec![Some(1)]);
        assert!(a.extend(ColumnBuffer::Utf8(vec![None])).is_err());
        a.extend(ColumnBuffer::Int64(vec![None])).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a.null_count(), 1);
    }
}
