//! Partition planning: split an integer column range into near-equal
//! sub-ranges so each can be fetched by its own worker.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LoadError, Result};

/// Bound of a single partition on the partition column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionBound {
    /// No predicate; the whole query in one partition.
    Unbounded,
    /// `lower <= col < upper`, or `lower <= col <= upper` when `upper_inclusive`.
    Range {
        lower: i64,
        upper: i64,
        upper_inclusive: bool,
    },
    /// Rows outside `[low, high]` plus NULL partition values.
    Outside { low: i64, high: i64 },
}

/// One partition of a read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Position in the plan; the assembler orders results by it.
    pub index: usize,
    /// Partition column. `None` only for an unpartitioned read.
    pub column: Option<String>,
    pub bound: PartitionBound,
}

impl PartitionSpec {
    /// The partition of an unpartitioned read.
    pub fn unbounded() -> Self {
        Self {
            index: 0,
            column: None,
            bound: PartitionBound::Unbounded,
        }
    }

    /// SQL predicate for this partition, `None` when unbounded.
    pub fn where_clause(&self) -> Option<String> {
        let col = quote_identifier(self.column.as_deref()?);
        match self.bound {
            PartitionBound::Unbounded => None,
            PartitionBound::Range {
                lower,
                upper,
                upper_inclusive: true,
            } => Some(format!("{col} >= {lower} AND {col} <= {upper}")),
            PartitionBound::Range { lower, upper, .. } => {
                Some(format!("{col} >= {lower} AND {col} < {upper}"))
            }
            PartitionBound::Outside { low, high } => Some(format!(
                "({col} < {low} OR {col} > {high} OR {col} IS NULL)"
            )),
        }
    }

    /// Whether a partition column value belongs to this partition.
    pub fn contains(&self, value: Option<i64>) -> bool {
        match (self.bound, value) {
            (PartitionBound::Unbounded, _) => true,
            (PartitionBound::Range { .. }, None) => false,
            (
                PartitionBound::Range {
                    lower,
                    upper,
                    upper_inclusive,
                },
                Some(v),
            ) => v >= lower && (v < upper || (upper_inclusive && v == upper)),
            (PartitionBound::Outside { .. }, None) => true,
            (PartitionBound::Outside { low, high }, Some(v)) => v < low || v > high,
        }
    }

    /// Number of column values the bound admits (range partitions only).
    /// A single range over the whole `i64` domain holds 2^64 values.
    pub fn width(&self) -> Option<u128> {
        match self.bound {
            PartitionBound::Range {
                lower,
                upper,
                upper_inclusive,
            } => {
                let w = upper as i128 - lower as i128 + i128::from(upper_inclusive);
                Some(w as u128)
            }
            _ => None,
        }
    }
}

/// Quote a SQL identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Split `[range_low, range_high]` (both inclusive) into `num_partitions`
/// contiguous ranges whose widths differ by at most one.
///
/// The remainder of the division goes to the first partitions. Every range
/// but the last has an exclusive upper bound; the last is closed at
/// `range_high`. When the range holds fewer values than requested
/// partitions, the count is capped so no partition is empty.
pub fn plan(
    column: &str,
    range_low: i64,
    range_high: i64,
    num_partitions: usize,
) -> Result<Vec<PartitionSpec>> {
    if num_partitions == 0 {
        return Err(LoadError::InvalidPartitionCount(num_partitions));
    }
    if range_low > range_high {
        return Err(LoadError::InvalidRange {
            low: range_low,
            high: range_high,
        });
    }

    let span = range_high as i128 - range_low as i128 + 1;
    let n = (num_partitions as i128).min(span);
    if n < num_partitions as i128 {
        debug!(
            "Capping partitions on '{}' from {} to {} for range [{}, {}]",
            column, num_partitions, n, range_low, range_high
        );
    }
    let width = span / n;
    let remainder = span % n;

    let mut specs = Vec::with_capacity(n as usize);
    let mut start = range_low as i128;
    for i in 0..n {
        let size = width + i128::from(i < remainder);
        let last = i == n - 1;
        // Only the last range is closed; its upper bound is range_high itself,
        // so every bound stays within i64.
        let (upper, upper_inclusive) = if last {
            (range_high, true)
        } else {
            ((start + size) as i64, false)
        };
        specs.push(PartitionSpec {
            index: i as usize,
            column: Some(column.to_string()),
            bound: PartitionBound::Range {
                lower: start as i64,
                upper,
                upper_inclusive,
            },
        });
        start += size;
    }

    Ok(specs)
}

/// [`plan`] followed by a catch-all partition for values outside the range
/// and NULL partition values.
pub fn plan_with_outside(
    column: &str,
    range_low: i64,
    range_high: i64,
    num_partitions: usize,
) -> Result<Vec<PartitionSpec>> {
    let mut specs = plan(column, range_low, range_high, num_partitions)?;
    specs.push(PartitionSpec {
        index: specs.len(),
        column: Some(column.to_string()),
        bound: PartitionBound::Outside {
            low: range_low,
            high: range_high,
        },
    });
    Ok(specs)
}
