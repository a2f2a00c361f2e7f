//! One-time database bootstrap, run out-of-band with admin credentials.
//!
//! The engine itself never creates the database. It only checks at startup
//! that [`database_exists`] and aborts otherwise.
//!
//! Privileges granted to the application user map the MySQL-style set
//! (select, insert, update, delete, create, index, drop, alter, create
//! temporary tables, lock tables) onto PostgreSQL: `CREATE` on the database
//! and schema plus `TEMPORARY`, and DML on tables. Index, drop, alter and
//! lock come with ownership, and the engine owns every table it creates.
//! Host scoping belongs in `pg_hba.conf`.

use anyhow::{anyhow, Result};
use sqlx::{Connection, PgConnection};
use tracing::info;

use crate::config::Config;
use crate::naming::quote_ident;

/// Database every server has, used to inspect and create others.
pub const MAINTENANCE_DB: &str = "postgres";

// ---

/// Grants on the database object itself.
pub fn database_grants(db_name: &str, app_user: &str) -> Vec<String> {
    // ---
    vec![format!(
        "GRANT CONNECT, CREATE, TEMPORARY ON DATABASE {} TO {}",
        quote_ident(db_name),
        quote_ident(app_user)
    )]
}

/// Grants inside the target database, issued while connected to it.
pub fn schema_grants(app_user: &str) -> Vec<String> {
    // ---
    let user = quote_ident(app_user);
    vec![
        format!("GRANT USAGE, CREATE ON SCHEMA public TO {user}"),
        format!("GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO {user}"),
        format!("GRANT USAGE, SELECT, UPDATE ON ALL SEQUENCES IN SCHEMA public TO {user}"),
        format!(
            "ALTER DEFAULT PRIVILEGES IN SCHEMA public \
             GRANT SELECT, INSERT, UPDATE, DELETE ON TABLES TO {user}"
        ),
    ]
}

async fn exists(conn: &mut PgConnection, db_name: &str) -> sqlx::Result<bool> {
    // ---
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(db_name)
        .fetch_one(conn)
        .await
}

/// Check with the application credential that the configured database exists.
pub async fn database_exists(cfg: &Config) -> Result<bool> {
    // ---
    let mut conn = PgConnection::connect_with(&cfg.pg_options(MAINTENANCE_DB))
        .await
        .map_err(|e| anyhow!("Failed to connect to database server '{}': {}", cfg.db_host, e))?;

    let found = exists(&mut conn, &cfg.db_name).await?;
    conn.close().await?;
    Ok(found)
}

/// Create the configured database if absent and grant the application user.
///
/// Idempotent; safe to re-run.
pub async fn create_database_and_grant(
    cfg: &Config,
    admin_user: &str,
    admin_password: &str,
) -> Result<()> {
    // ---
    let admin = cfg
        .pg_options(MAINTENANCE_DB)
        .username(admin_user)
        .password(admin_password);

    let mut conn = PgConnection::connect_with(&admin)
        .await
        .map_err(|e| anyhow!("Failed to connect as '{}': {}", admin_user, e))?;

    if exists(&mut conn, &cfg.db_name).await? {
        info!("Database `{}` already exists", cfg.db_name);
    } else {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&cfg.db_name)))
            .execute(&mut conn)
            .await?;
        info!("Created database `{}`", cfg.db_name);
    }

    for stmt in database_grants(&cfg.db_name, &cfg.db_user) {
        sqlx::query(&stmt).execute(&mut conn).await?;
    }
    conn.close().await?;

    let mut conn = PgConnection::connect_with(&admin.database(&cfg.db_name))
        .await
        .map_err(|e| anyhow!("Failed to connect to '{}': {}", cfg.db_name, e))?;

    for stmt in schema_grants(&cfg.db_user) {
        sqlx::query(&stmt).execute(&mut conn).await?;
    }
    conn.close().await?;

    info!("Granted `{}` access to `{}`", cfg.db_user, cfg.db_name);
    Ok(())
}
