//! Table-lifecycle and rollup engine.
//!
//! Gateway for the engine submodules (EMBP): the bus session only sees
//! [`Engine`], which owns the session's single database connection and its
//! [`SessionRegistry`]. Every reading is handled to completion, provisioning
//! first when the topic is new to the session, then appended.

use chrono::{Local, NaiveDateTime};
use sqlx::{Connection, PgConnection};
use tracing::info;

use crate::error::EngineError;
use crate::naming::SessionTableId;

pub mod aggregate;
pub mod detail_store;
pub mod merge;
pub mod provisioner;
pub mod registry;

pub use provisioner::ProvisionReport;
pub use registry::{SessionRegistry, TopicState};

// ---

/// Engine state for one connected session.
pub struct Engine {
    // ---
    conn: PgConnection,
    registry: SessionRegistry,
}

impl Engine {
    // ---
    /// Start a session on an open connection with an empty registry.
    pub fn new(conn: PgConnection) -> Self {
        // ---
        Self {
            conn,
            registry: SessionRegistry::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Provision-if-new, then append, stamped with the local wall clock.
    pub async fn handle_reading(&mut self, topic: &str, payload: &str) -> Result<(), EngineError> {
        // ---
        self.handle_reading_at(topic, payload, Local::now().naive_local())
            .await
    }

    /// As [`Engine::handle_reading`], provisioning with the given session time.
    pub async fn handle_reading_at(
        &mut self,
        topic: &str,
        payload: &str,
        now: NaiveDateTime,
    ) -> Result<(), EngineError> {
        // ---
        self.ensure_provisioned(topic, now).await?;
        detail_store::append(&mut self.conn, &self.registry, topic, payload).await
    }

    /// Move `topic` to Active, provisioning it if it is unregistered.
    ///
    /// Returns `None` when the topic was already active this session.
    pub async fn ensure_provisioned(
        &mut self,
        topic: &str,
        now: NaiveDateTime,
    ) -> Result<Option<ProvisionReport>, EngineError> {
        // ---
        match self.registry.state(topic) {
            TopicState::Active(_) => return Ok(None),
            TopicState::Provisioning => return Err(EngineError::NotProvisioned(topic.to_string())),
            TopicState::Unregistered => {}
        }

        let id = SessionTableId::new(topic, now)?;
        self.registry.begin(topic);

        match provisioner::provision(&mut self.conn, &id).await {
            Ok(report) => {
                info!(
                    "new topic: {} => `{}` ({} stale tables, {} windows)",
                    topic,
                    id.table_name(),
                    report.stale_tables.len(),
                    report.windows
                );
                self.registry.activate(topic, id);
                Ok(Some(report))
            }
            Err(e) => {
                self.registry.abandon(topic);
                Err(e.into())
            }
        }
    }

    /// End the session: forget every topic and close the connection.
    pub async fn close(mut self) -> Result<(), EngineError> {
        // ---
        self.registry.clear();
        self.conn.close().await?;
        Ok(())
    }
}
