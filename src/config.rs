//! Configuration loader for the `myqttsense-agent` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Any missing or malformed value is fatal: the
//! agent does not start on a partial configuration.
//!
use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use sqlx::postgres::PgConnectOptions;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL server host.
    pub db_host: String,

    /// PostgreSQL server port.
    pub db_port: u16,

    /// Application credential used by the engine.
    pub db_user: String,
    pub db_password: String,

    /// Database holding every topic table.
    pub db_name: String,

    /// MQTT broker host and port.
    pub broker_host: String,
    pub broker_port: u16,

    /// Topic prefix; the agent subscribes to `<prefix>/#`.
    pub topic_prefix: String,

    /// CA certificate (PEM) used to verify the broker.
    pub ca_cert: PathBuf,

    /// MQTT client identifier.
    pub client_id: String,

    /// MQTT keep-alive interval in seconds.
    pub keep_alive_secs: u64,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DB_HOST`, `DB_USERNAME`, `DB_PASSWORD`, `DB_NAME` – database access
/// - `MQTT_BROKER_URI` – broker as `scheme://host:port`; the port is mandatory
/// - `MQTT_TOPIC_PREFIX` – topic prefix of the sensor nodes
/// - `MQTT_CA_CERT` – path to the broker CA certificate
///
/// Optional:
/// - `DB_PORT` – database port (default: 5432)
/// - `MQTT_CLIENT_ID` – client id (default: `myqttsense-<uuid>`)
/// - `MQTT_KEEP_ALIVE_SECS` – keep-alive interval (default: 120)
///
/// Returns an error if any required variable is missing or invalid, or if
/// the certificate file does not exist.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_host = require_env!("DB_HOST");
    let db_user = require_env!("DB_USERNAME");
    let db_password = require_env!("DB_PASSWORD");
    let db_name = require_env!("DB_NAME");
    let db_port = parse_env!("DB_PORT", u16, 5432);

    let (broker_host, broker_port) = parse_broker_uri(&require_env!("MQTT_BROKER_URI"))?;
    let topic_prefix = require_env!("MQTT_TOPIC_PREFIX");

    let ca_cert = PathBuf::from(require_env!("MQTT_CA_CERT"));
    if !ca_cert.is_file() {
        bail!("'{}' is not a valid certificate file", ca_cert.display());
    }

    let client_id = env::var("MQTT_CLIENT_ID")
        .unwrap_or_else(|_| format!("myqttsense-{}", uuid::Uuid::new_v4().simple()));
    let keep_alive_secs = parse_env!("MQTT_KEEP_ALIVE_SECS", u64, 120);
    if keep_alive_secs < 5 {
        bail!("MQTT_KEEP_ALIVE_SECS must be at least 5, got {keep_alive_secs}");
    }

    Ok(Config {
        db_host,
        db_port,
        db_user,
        db_password,
        db_name,
        broker_host,
        broker_port,
        topic_prefix,
        ca_cert,
        client_id,
        keep_alive_secs,
    })
}

/// Split a broker URI into host and port.
///
/// Accepts `mqtts://host:port` as well as bare `host:port`; the port must be
/// present and non-zero.
pub fn parse_broker_uri(uri: &str) -> Result<(String, u16)> {
    // ---
    let parts: Vec<&str> = uri.split("://").last().unwrap_or(uri).split(':').collect();
    let [.., host, port] = parts.as_slice() else {
        bail!("MQTT_BROKER_URI must contain port number: '{uri}'");
    };

    let port: u16 = port
        .parse()
        .map_err(|e| anyhow!("MQTT_BROKER_URI port read error in '{uri}': {e}"))?;
    if port == 0 || host.is_empty() {
        bail!("MQTT_BROKER_URI must name a host and a non-zero port: '{uri}'");
    }

    Ok((host.to_string(), port))
}

impl Config {
    // ---
    /// Topic filter covering every sensor under the prefix.
    pub fn subscription(&self) -> String {
        // ---
        format!("{}/#", self.topic_prefix.trim_end_matches('/'))
    }

    /// Connect options for `database` with the application credential.
    pub fn pg_options(&self, database: &str) -> PgConnectOptions {
        // ---
        PgConnectOptions::new()
            .host(&self.db_host)
            .port(self.db_port)
            .username(&self.db_user)
            .password(&self.db_password)
            .database(database)
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// The database password is never printed.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DB_HOST           : {}:{}", self.db_host, self.db_port);
        tracing::info!("  DB_USERNAME       : {}", self.db_user);
        tracing::info!("  DB_PASSWORD       : ****");
        tracing::info!("  DB_NAME           : {}", self.db_name);
        tracing::info!("  MQTT_BROKER       : {}:{}", self.broker_host, self.broker_port);
        tracing::info!("  MQTT_TOPIC_PREFIX : {}", self.topic_prefix);
        tracing::info!("  MQTT_CA_CERT      : {}", self.ca_cert.display());
        tracing::info!("  MQTT_CLIENT_ID    : {}", self.client_id);
        tracing::info!("  MQTT_KEEP_ALIVE   : {}s", self.keep_alive_secs);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn sample() -> Config {
        // ---
        Config {
            db_host: "localhost".into(),
            db_port: 5432,
            db_user: "sense".into(),
            db_password: "secret".into(),
            db_name: "myqttsense".into(),
            broker_host: "broker".into(),
            broker_port: 8883,
            topic_prefix: "myqttsense".into(),
            ca_cert: PathBuf::from("/etc/ssl/broker.crt"),
            client_id: "test".into(),
            keep_alive_secs: 120,
        }
    }

    #[test]
    fn test_broker_uri_with_scheme() {
        // ---
        let (host, port) = parse_broker_uri("mqtts://broker.local:8883").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 8883);
    }

    #[test]
    fn test_broker_uri_without_scheme() {
        // ---
        let (host, port) = parse_broker_uri("192.168.1.10:1883").unwrap();
        assert_eq!(host, "192.168.1.10");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_broker_uri_rejects_missing_or_bad_port() {
        // ---
        assert!(parse_broker_uri("mqtts://broker.local").is_err());
        assert!(parse_broker_uri("broker.local:0").is_err());
        assert!(parse_broker_uri("broker.local:http").is_err());
        assert!(parse_broker_uri("mqtts://:8883").is_err());
    }

    #[test]
    fn test_subscription_adds_wildcard() {
        // ---
        let mut cfg = sample();
        assert_eq!(cfg.subscription(), "myqttsense/#");

        cfg.topic_prefix = "home/sensors/".into();
        assert_eq!(cfg.subscription(), "home/sensors/#");
    }

    #[test]
    fn test_pg_options_target_database() {
        // ---
        let opts = sample().pg_options("postgres");
        assert_eq!(opts.get_host(), "localhost");
        assert_eq!(opts.get_port(), 5432);
        assert_eq!(opts.get_username(), "sense");
        assert_eq!(opts.get_database(), Some("postgres"));
    }
}
