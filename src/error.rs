//! Error types for the table-lifecycle engine.
//!
//! The binary works with `anyhow::Result` for startup and configuration;
//! everything below the dispatch point returns one of these typed errors so
//! the bus session can tell a dropped reading from a dead session.

use thiserror::Error;

/// Errors raised while dispatching a reading into storage.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Append attempted for a topic that was never provisioned this session.
    #[error("Topic '{0}' is not provisioned in the current session")]
    NotProvisioned(String),

    /// The topic cannot be mapped onto a table name.
    #[error("Invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),

    /// Any statement failure, including loss of the connection.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EngineError {
    /// Whether the error must end the current session.
    ///
    /// Only an unusable topic is local to the reading that carried it.
    pub fn is_fatal(&self) -> bool {
        // ---
        !matches!(self, EngineError::InvalidTopic(_))
    }
}

/// Errors deriving table identifiers from a topic.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TopicError {
    /// The server would silently truncate the name, aliasing other topics.
    #[error("table name '{name}' for topic '{topic}' exceeds {max} bytes")]
    NameTooLong {
        topic: String,
        name: String,
        max: usize,
    },
}

/// Errors decoding a reading payload on the Rust side.
#[derive(Error, Debug)]
pub enum PayloadError {
    /// Not JSON, or JSON without numeric `measurement.temperature`/`humidity`.
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_fatality_classification() {
        // ---
        let invalid = EngineError::from(TopicError::NameTooLong {
            topic: "t".into(),
            name: "topic_t".into(),
            max: 63,
        });
        assert!(!invalid.is_fatal());

        assert!(EngineError::NotProvisioned("t".into()).is_fatal());
        assert!(EngineError::Database(sqlx::Error::PoolClosed).is_fatal());
    }
}
