//! MQTT session driving the engine.
//!
//! One broker connection is one session. On `ConnAck` the engine opens its
//! database connection with an empty registry; each publish is handled to
//! completion before the next is polled. When the connection drops (or on
//! Ctrl-C) the engine is closed and the session ends. Reconnecting is left to
//! the process supervisor, which starts a fresh session.

use std::time::Duration;

use anyhow::{anyhow, Result};
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS, TlsConfiguration,
    Transport,
};
use sqlx::{Connection, PgConnection};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::Engine;

/// Capacity of the client request channel.
const REQUEST_CAPACITY: usize = 64;

/// How long Ctrl-C waits for the DISCONNECT packet to go out.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

// ---

/// Broker options: TLS with the configured CA, clean session.
pub fn mqtt_options(cfg: &Config) -> Result<MqttOptions> {
    // ---
    let ca = std::fs::read(&cfg.ca_cert)
        .map_err(|e| anyhow!("Failed to read certificate '{}': {}", cfg.ca_cert.display(), e))?;

    let mut opts = MqttOptions::new(&cfg.client_id, &cfg.broker_host, cfg.broker_port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
    opts.set_clean_session(true);
    opts.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth: None,
    }));
    Ok(opts)
}

/// Run one broker session until disconnect, a fatal engine error, or Ctrl-C.
///
/// A lost broker connection is reported as an error so the supervisor can
/// restart the agent; Ctrl-C returns `Ok`.
pub async fn run_session(cfg: &Config) -> Result<()> {
    // ---
    let subscription = cfg.subscription();
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(cfg)?, REQUEST_CAPACITY);
    client.subscribe(subscription.as_str(), QoS::AtLeastOnce).await?;

    let mut engine: Option<Engine> = None;

    let outcome = loop {
        let event = tokio::select! {
            event = eventloop.poll() => Some(event),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(event) = event else {
            info!("Interrupted. Stopping");
            disconnect(&client, &mut eventloop).await;
            break Ok(());
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker {}:{}", cfg.broker_host, cfg.broker_port);
                if let Some(previous) = engine.take() {
                    close_engine(previous).await;
                }
                match PgConnection::connect_with(&cfg.pg_options(&cfg.db_name)).await {
                    Ok(conn) => {
                        engine = Some(Engine::new(conn));
                        info!("Connected to SQL database `{}`", cfg.db_name);
                    }
                    Err(e) => break Err(anyhow!("Failed to open database '{}': {}", cfg.db_name, e)),
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                info!("Subscribed to {}", subscription);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some(engine) = engine.as_mut() else {
                    warn!(topic = %publish.topic, "Reading before database session. Dropped");
                    continue;
                };
                if let Err(e) = dispatch(engine, &publish).await {
                    break Err(e);
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                info!("MQTT broker connection lost. Stopping");
                break Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                info!("MQTT broker connection lost. Stopping");
                break Err(anyhow!("MQTT connection error: {}", e));
            }
        }
    };

    if let Some(engine) = engine.take() {
        close_engine(engine).await;
    }
    outcome
}

/// Hand one publish to the engine; only fatal errors propagate.
async fn dispatch(engine: &mut Engine, publish: &Publish) -> Result<()> {
    // ---
    let payload = match std::str::from_utf8(&publish.payload) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(topic = %publish.topic, error = %e, "Non UTF-8 payload. Dropped");
            return Ok(());
        }
    };

    match engine.handle_reading(&publish.topic, payload).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => {
            error!(topic = %publish.topic, error = %e, "Engine failure. Ending session");
            Err(e.into())
        }
        Err(e) => {
            warn!(topic = %publish.topic, error = %e, "Reading dropped");
            Ok(())
        }
    }
}

/// Send DISCONNECT and drive the event loop until it is written out.
///
/// Returns whether the packet went out before the connection ended or
/// [`DISCONNECT_TIMEOUT`] elapsed.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) -> bool {
    // ---
    if let Err(e) = client.try_disconnect() {
        debug!("Disconnect request not queued: {}", e);
        return false;
    }

    let flush = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
    };

    match tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await {
        Ok(Ok(())) => {
            debug!("Sent DISCONNECT to broker");
            true
        }
        Ok(Err(e)) => {
            debug!("Connection ended before DISCONNECT: {}", e);
            false
        }
        Err(_) => {
            warn!("DISCONNECT not sent within {:?}", DISCONNECT_TIMEOUT);
            false
        }
    }
}

async fn close_engine(engine: Engine) {
    // ---
    let topics = engine.registry().active_count();
    match engine.close().await {
        Ok(()) => info!("Closed SQL database session ({} topics)", topics),
        Err(e) => warn!("Failed to close SQL database session cleanly: {}", e),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn test_disconnect_without_broker_is_bounded() {
        // ---
        // Nothing listens on port 1; the first poll fails to connect
        let opts = MqttOptions::new("myqttsense-test", "127.0.0.1", 1);
        let (client, mut eventloop) = AsyncClient::new(opts, REQUEST_CAPACITY);

        let sent = tokio::time::timeout(
            DISCONNECT_TIMEOUT + Duration::from_secs(1),
            disconnect(&client, &mut eventloop),
        )
        .await
        .expect("disconnect gives up within its timeout");
        assert!(!sent);
    }
}
