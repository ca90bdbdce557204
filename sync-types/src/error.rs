//! Error types for roomlink sync.

use thiserror::Error;

/// Errors that can occur while handling roomlink wire payloads.
#[derive(Debug, Error)]
pub enum SyncError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// A single object entry inside a snapshot could not be parsed
    #[error("malformed object {object}: {reason}")]
    MalformedObject {
        /// Name of the offending object entry.
        object: String,
        /// Why the entry was rejected.
        reason: String,
    },

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::MalformedObject {
            object: "light1".into(),
            reason: "missing type".into(),
        };
        assert_eq!(err.to_string(), "malformed object light1: missing type");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncError>();
    }
}
