//! SQL text for partition, range and describe statements.
//!
//! The caller's query is treated as an opaque subquery; partition bounds are
//! applied around it.

use parload_core::planner::quote_identifier;
use parload_core::PartitionSpec;

/// Strip trailing whitespace and semicolons so the query can be nested.
pub fn normalize_query(query: &str) -> &str {
    query.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// The single statement a worker runs for `spec`.
pub fn partition_query(query: &str, spec: &PartitionSpec) -> String {
    let base = normalize_query(query);
    match spec.where_clause() {
        Some(predicate) => {
            format!("SELECT * FROM ({base}\n) AS __parload_part WHERE {predicate}")
        }
        None => base.to_string(),
    }
}

/// Statement returning `MIN` and `MAX` of `column` as 64-bit integers.
pub fn range_query(query: &str, column: &str) -> String {
    let col = quote_identifier(column);
    format!(
        "SELECT CAST(MIN({col}) AS BIGINT), CAST(MAX({col}) AS BIGINT) \
         FROM ({}\n) AS __parload_range",
        normalize_query(query)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use parload_core::plan;

    #[test]
    fn test_normalize_strips_semicolons() {
        assert_eq!(normalize_query("SELECT 1;"), "SELECT 1");
        assert_eq!(normalize_query("  SELECT 1 ; ;\n"), "SELECT 1");
        assert_eq!(normalize_query("SELECT ';'"), "SELECT ';'");
    }

    #[test]
    fn test_partition_query_wraps_base() {
        let specs = plan("test_int", 0, 2000, 3).unwrap();
        assert_eq!(
            partition_query("SELECT * FROM test_table;", &specs[1]),
            "SELECT * FROM (SELECT * FROM test_table\n) AS __parload_part \
             WHERE \"test_int\" >= 667 AND \"test_int\" < 1334"
        );
    }

    #[test]
    fn test_unbounded_partition_runs_query_as_is() {
        assert_eq!(
            partition_query("SELECT * FROM t ", &PartitionSpec::unbounded()),
            "SELECT * FROM t"
        );
    }

    #[test]
    fn test_range_query() {
        assert_eq!(
            range_query("SELECT * FROM t", "id"),
            "SELECT CAST(MIN(\"id\") AS BIGINT), CAST(MAX(\"id\") AS BIGINT) \
             FROM (SELECT * FROM t\n) AS __parload_range"
        );
    }

    #[test]
    fn test_trailing_line_comment_does_not_swallow_bounds() {
        let specs = plan("id", 0, 9, 2).unwrap();
        let sql = partition_query("SELECT * FROM t -- recent rows only", &specs[0]);
        let last_line = sql.lines().last().unwrap();
        assert_eq!(last_line, ") AS __parload_part WHERE \"id\" >= 0 AND \"id\" < 5");

        let sql = range_query("SELECT * FROM t -- recent rows only", "id");
        assert_eq!(sql.lines().last().unwrap(), ") AS __parload_range");
    }
}
