//! Error taxonomy for the loader.
//!
//! Object-level read failures are recoverable (the batch driver skips the
//! object); everything else aborts the current load call after cleanup.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Debug, Error)]
pub enum LoadError {
    /// A source object could not be fetched or parsed.
    #[error("storage read error: {0}")]
    StorageRead(String),

    /// The staging artifact could not be uploaded or deleted.
    #[error("storage write error: {0}")]
    StorageWrite(String),

    /// The warehouse connection could not be opened.
    #[error("warehouse connection error: {0}")]
    Connection(String),

    /// A statement failed on the warehouse side.
    #[error("warehouse query error: {0}")]
    Query(String),

    /// Invalid caller-supplied configuration. Raised before any network I/O.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LoadError {
    pub fn storage_read(msg: impl Into<String>) -> Self {
        Self::StorageRead(msg.into())
    }

    pub fn storage_write(msg: impl Into<String>) -> Self {
        Self::StorageWrite(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// True for the per-object failures the batch driver recovers from.
    pub fn is_object_local(&self) -> bool {
        matches!(self, Self::StorageRead(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category_and_message() {
        let err = LoadError::query("COPY failed: access denied");
        assert_eq!(
            err.to_string(),
            "warehouse query error: COPY failed: access denied"
        );
        assert!(LoadError::storage_read("x").is_object_local());
        assert!(!LoadError::configuration("x").is_object_local());
    }
}
