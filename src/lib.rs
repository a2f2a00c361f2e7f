//! `myqttsense-agent`: archives environmental sensor readings from MQTT.
//!
//! Readings land in a per-topic, per-session detail table. When a topic is
//! first seen in a new session, detail tables left by earlier sessions are
//! merged, deduplicated and rolled up into the topic's hourly summary table,
//! then dropped, so raw history never outlives its session.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): the
//! binary talks to `config`, `admin` and `bus`; only `bus` talks to the
//! `engine` gateway.

pub mod admin;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod naming;
pub mod payload;
pub mod schema;

pub use config::Config;
pub use engine::{Engine, ProvisionReport, SessionRegistry, TopicState};
pub use error::{EngineError, PayloadError, TopicError};
pub use models::{DetailRow, Measurement, SummaryRow};
pub use naming::SessionTableId;
