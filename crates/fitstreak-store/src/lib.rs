//! Persistence layer for fitstreak
//!
//! Provides:
//! - Workout history (the inbound event source)
//! - Versioned per-user streak records (optimistic compare-and-swap)
//! - Awarded badge ledger
//! - Audit log (append-only)

mod audit;
mod sqlite;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use fitstreak_util::{StreakError, UserId};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored record version did not match the expected one
    #[error("Version conflict for user {user}: expected {expected:?}, found {found:?}")]
    Conflict {
        user: UserId,
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// A stored row could not be decoded (e.g. unparseable timestamp)
    #[error("Malformed record: {0}")]
    Malformed(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for StreakError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { user, .. } => StreakError::ConcurrencyConflict { user },
            StoreError::Malformed(msg) => StreakError::validation(msg),
            other => StreakError::dependency(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
