//! Outbound notification requests

use chrono::{DateTime, Utc};
use fitstreak_util::{NotificationId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Badge;

/// Kinds of notification the engine can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A milestone badge was newly earned
    Milestone,
    /// Streak is alive but will break unless the user works out today
    Reminder,
    /// The grace window lapsed and the streak was reset
    Broken,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Milestone => "milestone",
            NotificationKind::Reminder => "reminder",
            NotificationKind::Broken => "broken",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request handed to the notification collaborator.
///
/// Delivery is fire-and-forget from the engine's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    /// Human-readable text
    pub message: String,
    /// Structured details for the sink
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NotificationRequest {
    fn new(
        user_id: UserId,
        kind: NotificationKind,
        message: String,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            kind,
            message,
            payload,
            created_at,
        }
    }

    pub fn milestone(user_id: UserId, badge: &Badge, created_at: DateTime<Utc>) -> Self {
        Self::new(
            user_id,
            NotificationKind::Milestone,
            format!("Congratulations! You've earned the {} badge!", badge.label),
            serde_json::json!({
                "badge": badge.label,
                "threshold": badge.threshold,
            }),
            created_at,
        )
    }

    pub fn reminder(user_id: UserId, current_streak: u32, created_at: DateTime<Utc>) -> Self {
        Self::new(
            user_id,
            NotificationKind::Reminder,
            "Don't break your streak! Log a workout today to keep it going!".to_string(),
            serde_json::json!({ "current_streak": current_streak }),
            created_at,
        )
    }

    pub fn broken(user_id: UserId, previous_streak: u32, created_at: DateTime<Utc>) -> Self {
        Self::new(
            user_id,
            NotificationKind::Broken,
            "Oh no! Your streak was broken. Start a new one today!".to_string(),
            serde_json::json!({ "previous_streak": previous_streak }),
            created_at,
        )
    }
}
