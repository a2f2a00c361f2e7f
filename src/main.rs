//! Application entry point for the `myqttsense-agent` service.
//!
//! This binary orchestrates the full startup sequence for the sensor
//! archiver, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Verifying that the target database exists (fatal otherwise)
//! - Running one MQTT session that feeds readings to the table engine
//!
//! Run as `myqttsense-agent bootstrap` instead to create the database and
//! grant the application user, using `ADMIN_DB_USERNAME` and
//! `ADMIN_DB_PASSWORD`. This is a one-time administrative step.
//!
//! # Environment Variables
//! - see [`myqttsense_agent::config::load_from_env`] for the agent settings
//! - `AGENT_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AGENT_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! This module follows the Explicit Module Boundary Pattern (EMBP) by
//! delegating configuration parsing to `config`, database bootstrap to
//! `admin`, and the broker session to `bus`.
use std::env;

use anyhow::{anyhow, bail, Result};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use myqttsense_agent::{admin, bus, config};

/// Accepted values of `AGENT_LOG_LEVEL`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    match env::args().nth(1).as_deref() {
        None | Some("run") => {}
        Some("bootstrap") => return bootstrap(&cfg).await,
        Some(other) => bail!("Unknown command '{}'. Usage: myqttsense-agent [run|bootstrap]", other),
    }

    if !admin::database_exists(&cfg).await? {
        bail!(
            "Database `{}` does not exist. Please create database first (myqttsense-agent bootstrap)",
            cfg.db_name
        );
    }

    bus::run_session(&cfg).await
}

/// Create the database and grant the application user with admin credentials.
async fn bootstrap(cfg: &config::Config) -> Result<()> {
    // ---
    let admin_user = env::var("ADMIN_DB_USERNAME")
        .map_err(|_| anyhow!("ADMIN_DB_USERNAME must be set in .env or environment"))?;
    let admin_password = env::var("ADMIN_DB_PASSWORD")
        .map_err(|_| anyhow!("ADMIN_DB_PASSWORD must be set in .env or environment"))?;

    admin::create_database_and_grant(cfg, &admin_user, &admin_password).await
}

// ---

/// Install the process-wide tracing subscriber.
///
/// Output is compact and carries target, file and line. Settings, read
/// after `.env` is loaded:
/// - `RUST_LOG` wins when set and valid; otherwise `AGENT_LOG_LEVEL` (default
///   `debug`) with `sqlx::query` held at `warn` and `rumqttc` at `info`
/// - `AGENT_SPAN_EVENTS`: `full` or `enter_exit`; anything else logs span
///   close only
/// - `FORCE_COLOR`: `1|true|yes` or `0|false|no`, else colour follows
///   whether stdout is a terminal
///
/// Call once, before the first log line.
fn init_tracing() {
    // ---
    let span_events = match env::var("AGENT_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = env::var("AGENT_LOG_LEVEL")
            .ok()
            .filter(|l| LOG_LEVELS.contains(&l.as_str()))
            .unwrap_or_else(|| "debug".to_string());
        EnvFilter::new(format!("{level},sqlx::query=warn,rumqttc=info"))
    });

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
