//! Audit event types

use chrono::{DateTime, Utc};
use fitstreak_util::{UserId, WorkoutId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Configuration loaded at startup
    ConfigLoaded {
        weekly_goal: u32,
        grace_days: f64,
        milestones: Vec<u32>,
    },

    /// A workout was applied to the streak
    WorkoutApplied {
        user_id: UserId,
        workout_id: WorkoutId,
        current_streak: u32,
        longest_streak: u32,
    },

    /// A workout was removed from the history
    WorkoutDeleted {
        user_id: UserId,
        workout_id: WorkoutId,
    },

    /// A milestone badge was newly earned
    BadgeAwarded {
        user_id: UserId,
        threshold: u32,
        label: String,
    },

    /// The grace window lapsed
    StreakBroken {
        user_id: UserId,
        previous_streak: u32,
    },

    /// At-risk reminder sent
    ReminderSent {
        user_id: UserId,
        current_streak: u32,
    },

    /// Full recomputation after an external history change
    StreakRecomputed {
        user_id: UserId,
        current_streak: u32,
        longest_streak: u32,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }
}
