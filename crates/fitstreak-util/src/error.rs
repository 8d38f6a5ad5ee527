//! Error types for fitstreak

use thiserror::Error;

use crate::UserId;

/// Core error type for streak engine operations
#[derive(Debug, Error)]
pub enum StreakError {
    /// Malformed or missing timestamp/user, empty history, bad configuration.
    /// Never retried; nothing is committed.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// An optimistic snapshot update lost a race with another writer
    #[error("Concurrent update conflict for user {user}")]
    ConcurrencyConflict { user: UserId },

    /// Conflicts kept recurring past the retry budget
    #[error("Transient failure for user {user} after {attempts} attempts")]
    TransientFailure { user: UserId, attempts: u32 },

    /// Persistence or notification collaborator unavailable
    #[error("Dependency error: {0}")]
    DependencyError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StreakError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn dependency(msg: impl Into<String>) -> Self {
        Self::DependencyError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the orchestrator should reload and retry
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, StreakError>;
