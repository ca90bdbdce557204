//! Error types for the controller.

use std::path::PathBuf;
use sync_core::Capability;

/// Main error type for controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Outbound link error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A satellite with this name is already registered.
    #[error("satellite already registered: {name}")]
    DuplicateSatellite {
        /// Satellite name.
        name: String,
    },

    /// No satellite with this name is registered.
    #[error("unknown satellite: {name}")]
    UnknownSatellite {
        /// Satellite name.
        name: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Satellite row not found.
    #[error("satellite not found: {name}")]
    NotFound {
        /// The satellite name that was not found.
        name: String,
    },

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Outbound link errors (controller → satellite node).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Could not reach the node.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The node answered with a non-success status.
    #[error("node answered with status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The node answered with a body we could not decode.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Any other HTTP client failure.
    #[error("http error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            Self::InvalidPayload(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Failures of a proxy mutation or a queue append.
///
/// None of these are fatal; the command simply never reaches the node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The satellite's queue is full; the new command was dropped.
    #[error("command queue for {satellite} is full ({capacity} pending), command dropped")]
    QueueFull {
        /// Target satellite.
        satellite: String,
        /// Queue bound.
        capacity: usize,
    },

    /// The satellite has been torn down and its queue is closed.
    #[error("command queue for {satellite} is closed")]
    QueueClosed {
        /// Target satellite.
        satellite: String,
    },

    /// The owning satellite is offline; nothing was queued.
    #[error("satellite {satellite} is offline, command not queued")]
    SatelliteOffline {
        /// Owning satellite.
        satellite: String,
    },

    /// The owning satellite no longer exists.
    #[error("owner of {object} is gone")]
    OwnerGone {
        /// Target object.
        object: String,
    },

    /// The device does not report this capability.
    #[error("{object} does not support {capability}")]
    Unsupported {
        /// Target object.
        object: String,
        /// Requested capability.
        capability: Capability,
    },

    /// The object is not mirrored from any satellite.
    #[error("{object} is not bound to a satellite")]
    NotBound {
        /// Target object.
        object: String,
    },
}

/// Rejections of an inbound satellite request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InboundError {
    /// No satellite holds the presented secret.
    #[error("authentication failed")]
    Unauthorized,

    /// The request exceeded a rate limit.
    #[error("rate limited: {0}")]
    RateLimited(#[from] crate::limits::RateLimitError),
}

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
