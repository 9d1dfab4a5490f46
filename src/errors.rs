//! Unified error types and result handling.
//!
//! Handler-level misses (unmapped keys, empty ids, failed conditional updates)
//! are reported through empty results or `false`, never through [`Error`].
//! `Error` covers storage, serialization and configuration failures.

use thiserror::Error;

/// Errors raised by the catalog tables layer
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Error reported by the database driver
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A complex legacy value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading a file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The entity id does not resolve to a catalog entity
    #[error("Entity {entity_id} not found")]
    EntityNotFound {
        /// Requested entity id
        entity_id: i64,
    },

    /// A legacy value could not be converted for the structured store
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue {
        /// Legacy field key
        key: String,
        /// Why the value was rejected
        message: String,
    },

    /// One or more entities failed to migrate
    #[error("Migration failed for {failed} entities")]
    MigrationFailed {
        /// Number of entities rolled back
        failed: usize,
    },
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
