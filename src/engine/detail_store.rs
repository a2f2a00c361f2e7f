//! Append-only writer into a topic's current session table.

use sqlx::PgConnection;
use tracing::warn;

use crate::error::EngineError;
use crate::models::DetailRow;
use crate::naming::quote_ident;
use crate::payload;

use super::registry::SessionRegistry;

// ---

/// Insert one raw reading for an already provisioned topic.
///
/// `created_at` is left to the column default. Payloads that do not decode
/// are still stored; they contribute NULL when rolled up.
pub async fn append(
    conn: &mut PgConnection,
    registry: &SessionRegistry,
    topic: &str,
    raw_payload: &str,
) -> Result<(), EngineError> {
    // ---
    let id = registry
        .active(topic)
        .ok_or_else(|| EngineError::NotProvisioned(topic.to_string()))?;

    if let Err(e) = payload::decode(raw_payload) {
        warn!(topic, error = %e, "Storing undecodable payload");
    }

    sqlx::query(&format!(
        "INSERT INTO {} (payload) VALUES ($1)",
        quote_ident(&id.table_name())
    ))
    .bind(raw_payload)
    .execute(conn)
    .await?;

    Ok(())
}

/// All rows of a detail-shaped table in id order.
pub async fn fetch_rows(conn: &mut PgConnection, table: &str) -> sqlx::Result<Vec<DetailRow>> {
    // ---
    sqlx::query_as::<_, DetailRow>(&format!(
        "SELECT id, payload, created_at FROM {} ORDER BY id",
        quote_ident(table)
    ))
    .fetch_all(conn)
    .await
}
