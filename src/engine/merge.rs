//! Consolidation of stale detail tables into a single source.
//!
//! More than one stale table means earlier sessions ended without being
//! rolled up. Their rows are copied into the transaction-scoped merge table
//! in (table order, id) order and renumbered, then every row sharing a
//! `created_at` with a lower-numbered row is deleted. A reading delivered
//! twice therefore survives once, as its earliest copy.

use sqlx::PgConnection;
use tracing::debug;

use crate::naming::quote_ident;
use crate::schema::{self, MERGE_TABLE};

/// Table the aggregator should read after merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeSource {
    /// Nothing to roll up.
    Empty,
    /// Exactly one stale table, read in place.
    Single(String),
    /// Deduplicated union in [`MERGE_TABLE`].
    Merged,
}

impl MergeSource {
    // ---
    pub fn table(&self) -> Option<&str> {
        // ---
        match self {
            MergeSource::Empty => None,
            MergeSource::Single(name) => Some(name),
            MergeSource::Merged => Some(MERGE_TABLE),
        }
    }
}

// ---

/// Statement filling the merge table from `tables`.
pub fn union_sql(tables: &[String]) -> String {
    // ---
    let branches = tables
        .iter()
        .enumerate()
        .map(|(i, t)| format!("SELECT {i} AS src, id, payload, created_at FROM {}", quote_ident(t)))
        .collect::<Vec<_>>()
        .join("\n            UNION ALL\n            ");

    format!(
        r#"
        INSERT INTO {} (payload, created_at)
        SELECT payload, created_at FROM (
            {branches}
        ) stale
        ORDER BY src, id
        "#,
        quote_ident(MERGE_TABLE)
    )
}

/// Statement keeping only the lowest id per `created_at`.
pub fn dedup_sql() -> String {
    // ---
    let merge = quote_ident(MERGE_TABLE);
    format!(
        "DELETE FROM {merge} t1 USING {merge} t2 \
         WHERE t1.created_at = t2.created_at AND t1.id > t2.id"
    )
}

/// Reduce `tables` to a single source table.
///
/// Must run inside a transaction: the merge table is dropped on commit.
pub async fn merge(conn: &mut PgConnection, tables: &[String]) -> sqlx::Result<MergeSource> {
    // ---
    match tables {
        [] => return Ok(MergeSource::Empty),
        [single] => return Ok(MergeSource::Single(single.clone())),
        _ => {}
    }

    sqlx::query(&schema::merge_table_ddl())
        .execute(&mut *conn)
        .await?;

    let copied = sqlx::query(&union_sql(tables))
        .execute(&mut *conn)
        .await?
        .rows_affected();

    let removed = sqlx::query(&dedup_sql())
        .execute(&mut *conn)
        .await?
        .rows_affected();

    debug!(
        tables = tables.len(),
        copied, removed, "Merged stale detail tables"
    );
    Ok(MergeSource::Merged)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_source_table() {
        // ---
        assert_eq!(MergeSource::Empty.table(), None);
        assert_eq!(MergeSource::Single("t".into()).table(), Some("t"));
        assert_eq!(MergeSource::Merged.table(), Some(MERGE_TABLE));
    }

    #[test]
    fn test_union_sql_orders_by_source_then_id() {
        // ---
        let sql = union_sql(&["a_1".to_string(), "a_2".to_string()]);
        assert!(sql.contains("INSERT INTO \"merge_tmp\" (payload, created_at)"));
        assert!(sql.contains("SELECT 0 AS src, id, payload, created_at FROM \"a_1\""));
        assert!(sql.contains("UNION ALL"));
        assert!(sql.contains("SELECT 1 AS src, id, payload, created_at FROM \"a_2\""));
        assert!(sql.contains("ORDER BY src, id"));
    }

    #[test]
    fn test_dedup_keeps_lowest_id() {
        // ---
        let sql = dedup_sql();
        assert!(sql.contains("t1.created_at = t2.created_at"));
        assert!(sql.contains("t1.id > t2.id"));
    }
}
