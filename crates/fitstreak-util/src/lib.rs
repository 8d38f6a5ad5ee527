//! Shared utilities for fitstreak
//!
//! This crate provides:
//! - ID types (UserId, WorkoutId, NotificationId)
//! - Clock and calendar adapter (injected "now", day bucketing)
//! - Error types
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
