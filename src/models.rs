//! Simple data models for the sensor archiver.

use chrono::NaiveDateTime;
use serde::Deserialize;

// ---

/// Reading payload as published by a sensor node.
///
/// Only the `measurement` object is interpreted; any other field is ignored.
#[derive(Debug, Deserialize)]
pub struct SensorPayload {
    // ---
    pub measurement: Measurement,
}

/// The two numeric fields extracted from a reading.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Measurement {
    // ---
    pub temperature: f64,
    pub humidity: f64,
}

/// Raw reading as stored in a per-session detail table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DetailRow {
    // ---
    pub id: i64,
    pub payload: String,
    pub created_at: Option<NaiveDateTime>,
}

/// One hourly window as stored in a topic's summary table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SummaryRow {
    // ---
    pub id: i64,
    pub avg_temperature: Option<f32>,
    pub var_temperature: Option<f32>,
    pub avg_humidity: Option<f32>,
    pub var_humidity: Option<f32>,
    pub num_samples: i32,
    pub dt_window_cntr: Option<NaiveDateTime>,
}
