//! Hourly rollup of raw readings into a topic's summary table.
//!
//! Rows are bucketed by the calendar hour of `created_at` and each bucket is
//! labelled by its half-hour mark. Variances are population variances, so a
//! single-sample bucket has variance 0. Fields the payload codec cannot
//! extract are NULL and simply do not contribute to AVG/VAR_POP.

use sqlx::PgConnection;

use crate::models::SummaryRow;
use crate::naming::quote_ident;
use crate::payload::{self, Field};

// ---

/// Statement rolling `source` up into `summary`.
pub fn rollup_sql(summary: &str, source: &str) -> String {
    // ---
    format!(
        r#"
        INSERT INTO {summary} (
            avg_temperature, var_temperature, avg_humidity, var_humidity,
            num_samples, dt_window_cntr
        )
        SELECT AVG(t), VAR_POP(t), AVG(h), VAR_POP(h), COUNT(dt),
               date_trunc('hour', dt) + INTERVAL '30 minutes'
        FROM (
            SELECT {t} AS t, {h} AS h, dt
            FROM (SELECT {doc} AS doc, created_at AS dt FROM {source}) parsed
        ) readings
        GROUP BY date_trunc('hour', dt)
        ORDER BY date_trunc('hour', dt)
        "#,
        summary = quote_ident(summary),
        source = quote_ident(source),
        doc = payload::document_expr("payload"),
        t = payload::field_expr("doc", Field::Temperature),
        h = payload::field_expr("doc", Field::Humidity),
    )
}

/// Append one summary row per hour present in `source`.
///
/// Returns the number of windows written; an empty source writes nothing.
pub async fn aggregate_into(
    conn: &mut PgConnection,
    summary: &str,
    source: &str,
) -> sqlx::Result<u64> {
    // ---
    let result = sqlx::query(&rollup_sql(summary, source))
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// All rows of a summary table in insertion order.
pub async fn fetch_summary(conn: &mut PgConnection, summary: &str) -> sqlx::Result<Vec<SummaryRow>> {
    // ---
    sqlx::query_as::<_, SummaryRow>(&format!(
        r#"
        SELECT id, avg_temperature, var_temperature, avg_humidity, var_humidity,
               num_samples, dt_window_cntr
        FROM {}
        ORDER BY id
        "#,
        quote_ident(summary)
    ))
    .fetch_all(conn)
    .await
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_rollup_groups_by_full_hour() {
        // ---
        let sql = rollup_sql("topic_x", "topic_x_20220314180000");
        assert!(sql.contains("INSERT INTO \"topic_x\""));
        assert!(sql.contains("FROM \"topic_x_20220314180000\""));
        assert!(sql.contains("GROUP BY date_trunc('hour', dt)"));
        assert!(sql.contains("date_trunc('hour', dt) + INTERVAL '30 minutes'"));
        assert!(sql.contains("VAR_POP(t)"));
        assert!(sql.contains("COUNT(dt)"));
    }

    #[test]
    fn test_rollup_reads_through_codec() {
        // ---
        let sql = rollup_sql("s", "d");
        assert!(sql.contains(&payload::document_expr("payload")));
        assert!(sql.contains(&payload::field_expr("doc", Field::Temperature)));
        assert!(sql.contains(&payload::field_expr("doc", Field::Humidity)));
    }
}
