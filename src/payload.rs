//! Reading payload codec.
//!
//! Payloads are stored verbatim and only interpreted when they are rolled up,
//! which happens inside the database. The Rust decoder and the SQL
//! expressions below share the same field path so that a payload the decoder
//! rejects is exactly one that contributes NULL to an aggregate.

use crate::error::PayloadError;
use crate::models::{Measurement, SensorPayload};

/// Key of the object holding the numeric fields.
pub const MEASUREMENT_KEY: &str = "measurement";

// ---

/// Numeric field of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Temperature,
    Humidity,
}

impl Field {
    // ---
    pub fn key(self) -> &'static str {
        match self {
            Field::Temperature => "temperature",
            Field::Humidity => "humidity",
        }
    }
}

/// Decode a raw payload into its measurement.
pub fn decode(raw: &str) -> Result<Measurement, PayloadError> {
    // ---
    let payload: SensorPayload = serde_json::from_str(raw)?;
    Ok(payload.measurement)
}

/// SQL expression turning a text column into `jsonb`, NULL when it is not JSON.
pub fn document_expr(payload_column: &str) -> String {
    // ---
    format!("CASE WHEN pg_input_is_valid({payload_column}, 'jsonb') THEN {payload_column}::jsonb END")
}

/// SQL expression extracting `field` from a `jsonb` column as double precision.
///
/// Yields NULL when the field is missing or not a JSON number.
pub fn field_expr(document_column: &str, field: Field) -> String {
    // ---
    let key = field.key();
    format!(
        "CASE WHEN jsonb_typeof({document_column} -> '{MEASUREMENT_KEY}' -> '{key}') = 'number' \
         THEN ({document_column} -> '{MEASUREMENT_KEY}' ->> '{key}')::double precision END"
    )
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_decode_reading() {
        // ---
        let m = decode(r#"{"measurement":{"temperature":21.5,"humidity":40.0}}"#).unwrap();
        assert_eq!(m.temperature, 21.5);
        assert_eq!(m.humidity, 40.0);
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        // ---
        let raw = r#"{"node":"esp32","measurement":{"temperature":-3,"humidity":99.99,"dew":1}}"#;
        let m = decode(raw).unwrap();
        assert_eq!(m.temperature, -3.0);
        assert_eq!(m.humidity, 99.99);
    }

    #[test]
    fn test_decode_sensor_error_sentinel() {
        // ---
        // Nodes publish this when the SHT3x read fails; it is still a number.
        let m = decode(r#"{"measurement":{"temperature":-99.99,"humidity":100.00}}"#).unwrap();
        assert_eq!(m.temperature, -99.99);
    }

    #[test]
    fn test_decode_failures() {
        // ---
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"measurement":{"temperature":21.5}}"#).is_err());
        assert!(decode(r#"{"measurement":{"temperature":"21.5","humidity":40}}"#).is_err());
        assert!(decode(r#"{"temperature":21.5,"humidity":40}"#).is_err());
    }

    #[test]
    fn test_sql_expressions_share_field_path() {
        // ---
        let doc = document_expr("payload");
        assert!(doc.contains("pg_input_is_valid(payload, 'jsonb')"));

        let t = field_expr("doc", Field::Temperature);
        assert!(t.contains("doc -> 'measurement' -> 'temperature'"));
        assert!(t.contains("doc -> 'measurement' ->> 'temperature'"));
        assert!(field_expr("doc", Field::Humidity).contains("'humidity'"));
    }
}
