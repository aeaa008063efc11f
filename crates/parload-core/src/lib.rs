//! parload core - partition planning, column builders and table assembly
//!
//! This crate holds everything of a partitioned read that does not touch a
//! database: the planner, the value model, per-partition column writers, the
//! assembler, and the Arrow/DataFusion output adapters.

pub mod column;
pub mod error;
pub mod output;
pub mod planner;
pub mod table;
pub mod types;

pub use column::{ColumnBuffer, PartitionWriter};
pub use error::{LoadError, Result};
pub use output::{arrow_schema, to_mem_table};
pub use planner::{plan, plan_with_outside, PartitionBound, PartitionSpec};
pub use table::{assemble, split_partitions, Column, PartitionTable, Table};
pub use types::{infer_schema, DataType, Field, Schema, Value};

// Re-export for downstream consumers
pub use datafusion::datasource::MemTable;
