//! Error types for the dynscan core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! Per-item transform failures are modelled separately as [`ItemError`]: they
//! are logged and counted by the engine, never returned from a scan.

use thiserror::Error;

/// Result type alias for dynscan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by user-supplied transformers and consumers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for dynscan.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid scan setup, raised before the store is touched
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store-related error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A consumer callback asked to abort the scan
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// The scan thread was interrupted during a pause
    #[error("Scan interrupted")]
    Interrupted,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// True for errors raised before any store access.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// True if the referenced table does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Store(StoreError::TableNotFound { .. }))
    }
}

/// Errors raised by the backing store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Table does not exist
    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    /// Request failed at the transport level
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Throttling persisted past the retry budget
    #[error("Throttled reading {table} after {attempts} attempts")]
    Throttled { table: String, attempts: u32 },
}

/// A single record failed transformation.
///
/// Recovered locally: the item is dropped and the scan continues.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Couldn't process item #{position}: {message}")]
pub struct ItemError {
    /// Zero-based position of the record in the scan
    pub position: u64,
    /// Transformer failure message
    pub message: String,
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("items_per_page must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: items_per_page must be at least 1"
        );

        let err: Error = StoreError::TableNotFound {
            table: "Orders".into(),
        }
        .into();
        assert!(err.to_string().contains("Table not found: Orders"));
        assert!(err.is_not_found());
        assert!(!err.is_config());
    }

    #[test]
    fn test_item_error() {
        let err = ItemError {
            position: 7,
            message: "missing field `id`".into(),
        };
        assert_eq!(
            err.to_string(),
            "Couldn't process item #7: missing field `id`"
        );
    }

    #[test]
    fn test_throttled_error() {
        let err = StoreError::Throttled {
            table: "Products".into(),
            attempts: 6,
        };
        assert!(err.to_string().contains("after 6 attempts"));
    }
}
