//! Table definitions for `myqttsense-agent`.
//!
//! There is no fixed schema: every topic owns a durable summary table and a
//! detail table per session, created on demand by the provisioner. All
//! statements here are idempotent and take a `&mut PgConnection` so they run
//! equally on a plain connection or inside a transaction.

use sqlx::PgConnection;

use crate::naming::quote_ident;

/// Name of the per-connection temporary table used while merging.
pub const MERGE_TABLE: &str = "merge_tmp";

// ---

/// Raw reading table for one session of a topic.
///
/// `UNLOGGED` skips the WAL for insert throughput; losing a session's detail
/// rows on a server crash is the accepted trade-off. `created_at` keeps
/// second precision so redelivered readings collide on merge.
pub fn detail_table_ddl(name: &str) -> String {
    // ---
    format!(
        r#"
        CREATE UNLOGGED TABLE IF NOT EXISTS {} (
            id          BIGSERIAL PRIMARY KEY,
            payload     TEXT      NOT NULL,
            created_at  TIMESTAMP DEFAULT date_trunc('second', LOCALTIMESTAMP)
        )
        "#,
        quote_ident(name)
    )
}

/// Durable hourly rollup table for a topic.
pub fn summary_table_ddl(name: &str) -> String {
    // ---
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id               BIGSERIAL PRIMARY KEY,
            avg_temperature  REAL,
            var_temperature  REAL,
            avg_humidity     REAL,
            var_humidity     REAL,
            num_samples      INTEGER   NOT NULL DEFAULT 0 CHECK (num_samples >= 0),
            dt_window_cntr   TIMESTAMP DEFAULT NULL
        )
        "#,
        quote_ident(name)
    )
}

/// Merge table with the detail columns, dropped when the transaction ends.
pub fn merge_table_ddl() -> String {
    // ---
    format!(
        r#"
        CREATE TEMPORARY TABLE {} (
            id          BIGSERIAL PRIMARY KEY,
            payload     TEXT      NOT NULL,
            created_at  TIMESTAMP
        ) ON COMMIT DROP
        "#,
        quote_ident(MERGE_TABLE)
    )
}

// ---

/// Create the summary table for `basename` if it does not exist.
pub async fn ensure_summary_table(conn: &mut PgConnection, basename: &str) -> sqlx::Result<()> {
    // ---
    sqlx::query(&summary_table_ddl(basename))
        .execute(conn)
        .await?;
    Ok(())
}

/// Create a session detail table.
pub async fn create_detail_table(conn: &mut PgConnection, name: &str) -> sqlx::Result<()> {
    // ---
    sqlx::query(&detail_table_ddl(name)).execute(conn).await?;
    Ok(())
}

/// Drop a table if it exists.
pub async fn drop_table(conn: &mut PgConnection, name: &str) -> sqlx::Result<()> {
    // ---
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_detail_ddl_columns() {
        // ---
        let ddl = detail_table_ddl("topic_x_20220314180000");
        assert!(ddl.contains("CREATE UNLOGGED TABLE IF NOT EXISTS \"topic_x_20220314180000\""));
        assert!(ddl.contains("payload     TEXT      NOT NULL"));
        assert!(ddl.contains("date_trunc('second', LOCALTIMESTAMP)"));
    }

    #[test]
    fn test_summary_ddl_is_logged() {
        // ---
        let ddl = summary_table_ddl("topic_x");
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS \"topic_x\""));
        assert!(!ddl.contains("UNLOGGED"));
        assert!(ddl.contains("dt_window_cntr"));
        assert!(ddl.contains("CHECK (num_samples >= 0)"));
    }

    #[test]
    fn test_merge_ddl_is_transaction_scoped() {
        // ---
        let ddl = merge_table_ddl();
        assert!(ddl.contains("CREATE TEMPORARY TABLE \"merge_tmp\""));
        assert!(ddl.contains("ON COMMIT DROP"));
    }
}
