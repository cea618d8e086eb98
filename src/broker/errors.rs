//! Error types for broker operations

use crate::config::ConfigError;

/// Error types for broker operations
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Every candidate endpoint refused the connection
    #[error("No broker available ({attempted} endpoints tried)")]
    NoBrokerAvailable { attempted: usize },

    /// The connection failed or was closed underneath us
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// A channel-level operation failed
    #[error("Broker channel error: {0}")]
    Channel(String),

    /// The broker did not acknowledge a confirmed publish
    #[error("Publish was not confirmed by the broker")]
    NotConfirmed,

    /// The in-process publish buffer is at capacity
    #[error("Publish buffer is full, message lost")]
    QueueFull,

    /// The client has been stopped
    #[error("Broker client shut down")]
    Shutdown,

    #[error("Broker configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BrokerError {
    /// Whether invalidating the session and retrying may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NoBrokerAvailable { .. }
                | Self::Connection(_)
                | Self::Channel(_)
                | Self::NotConfirmed
        )
    }
}
