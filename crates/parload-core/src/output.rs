//! Output adapters: hand loaded tables to Arrow and DataFusion.
//!
//! [`Table::to_record_batch`] produces an eager in-memory batch. For the
//! partitioned case, [`to_mem_table`] builds a DataFusion `MemTable` whose
//! partitions map one-to-one onto the read's `PartitionSpec`s, so a
//! downstream engine can schedule them independently.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, RecordBatchOptions, StringArray,
};
use arrow::datatypes::{
    DataType as ArrowType, Field as ArrowField, Schema as ArrowSchema, SchemaRef,
};
use datafusion::datasource::MemTable;

use crate::column::ColumnBuffer;
use crate::error::Result;
use crate::table::{Column, PartitionTable, Table};
use crate::types::{DataType, Field, Schema};

/// Field metadata key marking the index column in converted batches.
pub const INDEX_METADATA_KEY: &str = "parload.index";

fn arrow_type(data_type: DataType) -> ArrowType {
    match data_type {
        DataType::Int64 => ArrowType::Int64,
        DataType::Float64 => ArrowType::Float64,
        DataType::Boolean => ArrowType::Boolean,
        DataType::Utf8 => ArrowType::Utf8,
    }
}

fn arrow_field(field: &Field) -> ArrowField {
    ArrowField::new(&field.name, arrow_type(field.data_type), field.nullable)
}

/// Convert a loader schema to an Arrow schema (no index column).
pub fn arrow_schema(schema: &Schema) -> SchemaRef {
    Arc::new(ArrowSchema::new(
        schema.fields().iter().map(arrow_field).collect::<Vec<_>>(),
    ))
}

fn to_array(data: &ColumnBuffer) -> ArrayRef {
    match data {
        ColumnBuffer::Int64(v) => Arc::new(Int64Array::from(v.clone())),
        ColumnBuffer::Float64(v) => Arc::new(Float64Array::from(v.clone())),
        ColumnBuffer::Boolean(v) => Arc::new(BooleanArray::from(v.clone())),
        ColumnBuffer::Utf8(v) => Arc::new(StringArray::from(v.clone())),
    }
}

impl Table {
    /// Convert to a single Arrow `RecordBatch`.
    ///
    /// If the table has an index, it becomes the first field and carries
    /// `parload.index = "true"` in its metadata.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(self.num_columns() + 1);
        let mut arrays = Vec::with_capacity(self.num_columns() + 1);

        if let Some(index) = self.index() {
            let metadata = HashMap::from([(INDEX_METADATA_KEY.to_string(), "true".to_string())]);
            fields.push(arrow_field(&index.field).with_metadata(metadata));
            arrays.push(to_array(&index.data));
        }
        for Column { field, data } in self.columns() {
            fields.push(arrow_field(field));
            arrays.push(to_array(data));
        }

        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows()));
        let schema = Arc::new(ArrowSchema::new(fields));
        let batch = RecordBatch::try_new_with_options(schema, arrays, &options)?;
        Ok(batch)
    }
}

/// Build a DataFusion `MemTable` with one partition per loaded partition.
///
/// Keyed partitions keep their index column in front, so the table schema
/// is taken from the converted batches; `schema` is only used when there
/// are no partitions at all.
pub fn to_mem_table(schema: &Schema, partitions: &[PartitionTable]) -> Result<MemTable> {
    let batches = partitions
        .iter()
        .map(|p| p.table.to_record_batch())
        .collect::<Result<Vec<_>>>()?;
    let table_schema = batches
        .first()
        .map(RecordBatch::schema)
        .unwrap_or_else(|| arrow_schema(schema));
    let partitions = batches.into_iter().map(|b| vec![b]).collect();
    Ok(MemTable::try_new(table_schema, partitions)?)
}
