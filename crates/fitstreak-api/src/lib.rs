//! Shared data model for fitstreak
//!
//! This crate defines the values that cross component boundaries:
//! - Workout events (inbound)
//! - Streak snapshots and per-user streak state
//! - Milestone badges
//! - Notification requests (outbound)

mod notifications;
mod types;

pub use notifications::*;
pub use types::*;
