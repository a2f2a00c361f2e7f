//! Per-topic provisioning pass.
//!
//! Runs once per topic per session, on the first reading:
//!
//! 1. ensure the summary table exists
//! 2. discover stale detail tables left by earlier sessions
//! 3. merge them into a single source
//! 4. roll the source up into the summary table
//! 5. drop the stale tables and the merge table
//! 6. create this session's detail table
//!
//! All six steps share one transaction, so a failure at any point leaves
//! the stale tables in place and nothing double-counted.

use sqlx::{Connection, PgConnection};
use tracing::{debug, instrument};

use crate::naming::{self, SessionTableId};
use crate::schema::{self, MERGE_TABLE};

use super::aggregate;
use super::merge::{self, MergeSource};

/// Outcome of a provisioning pass.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    /// Detail tables rolled up and dropped, oldest first.
    pub stale_tables: Vec<String>,
    /// Summary rows appended.
    pub windows: u64,
}

// ---

/// Detail tables of earlier sessions for `basename`, oldest first.
///
/// The summary table and any other topic's tables are excluded. Names alone
/// are not enough: the summary of topic `x_20220314180000` is named like a
/// session table of topic `x`, so candidates must also have the detail
/// columns and none of the summary ones.
pub async fn discover_stale_tables(
    conn: &mut PgConnection,
    basename: &str,
) -> sqlx::Result<Vec<String>> {
    // ---
    let candidates: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT t.table_name::text
        FROM information_schema.tables t
        WHERE t.table_schema = current_schema()
          AND t.table_name LIKE $1
          AND (
              SELECT COUNT(*) FROM information_schema.columns c
              WHERE c.table_schema = t.table_schema
                AND c.table_name = t.table_name
                AND c.column_name IN ('payload', 'created_at')
          ) = 2
          AND NOT EXISTS (
              SELECT 1 FROM information_schema.columns c
              WHERE c.table_schema = t.table_schema
                AND c.table_name = t.table_name
                AND c.column_name = 'dt_window_cntr'
          )
        ORDER BY t.table_name
        "#,
    )
    .bind(naming::like_pattern(basename))
    .fetch_all(conn)
    .await?;

    Ok(candidates
        .into_iter()
        .filter(|name| naming::parse_session_table(basename, name).is_some())
        .collect())
}

/// Archive earlier sessions of `id`'s topic and open its new detail table.
#[instrument(skip_all, fields(basename = id.basename()))]
pub async fn provision(
    conn: &mut PgConnection,
    id: &SessionTableId,
) -> sqlx::Result<ProvisionReport> {
    // ---
    let basename = id.basename();
    let mut tx = conn.begin().await?;

    schema::ensure_summary_table(&mut *tx, basename).await?;

    let stale_tables = discover_stale_tables(&mut *tx, basename).await?;
    debug!(basename, stale = ?stale_tables, "Discovered stale detail tables");

    let source = merge::merge(&mut *tx, &stale_tables).await?;

    let windows = match source.table() {
        Some(table) => aggregate::aggregate_into(&mut *tx, basename, table).await?,
        None => 0,
    };

    for table in &stale_tables {
        schema::drop_table(&mut *tx, table).await?;
    }
    if source == MergeSource::Merged {
        schema::drop_table(&mut *tx, MERGE_TABLE).await?;
    }

    schema::create_detail_table(&mut *tx, &id.table_name()).await?;
    tx.commit().await?;

    Ok(ProvisionReport {
        stale_tables,
        windows,
    })
}
