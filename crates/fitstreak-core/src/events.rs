//! Outcomes reported by the streak engine

use fitstreak_api::{Badge, NotificationKind, StreakSnapshot};
use fitstreak_util::{NotificationId, UserId};
use serde::Serialize;

/// How a user's streak state moved during one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakTransition {
    /// NoHistory -> Active
    Started,
    /// Active -> Active with a longer current streak
    Extended,
    /// Broken -> Active
    Restarted,
    /// Active -> Broken (grace window lapsed)
    Broken,
    Unchanged,
}

/// What happened to the notification for this operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Nothing to send
    NotRequired,
    Sent {
        id: NotificationId,
        kind: NotificationKind,
    },
    /// Delivery failed; the persisted snapshot stands
    Failed {
        kind: NotificationKind,
        error: String,
    },
}

impl NotificationStatus {
    pub fn kind(&self) -> Option<NotificationKind> {
        match self {
            NotificationStatus::NotRequired => None,
            NotificationStatus::Sent { kind, .. } | NotificationStatus::Failed { kind, .. } => {
                Some(*kind)
            }
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, NotificationStatus::Sent { .. })
    }
}

/// Result of applying one workout
#[derive(Debug, Clone, Serialize)]
pub struct WorkoutOutcome {
    pub snapshot: StreakSnapshot,
    pub triggered_badge: Option<Badge>,
    pub transition: StreakTransition,
    pub notification: NotificationStatus,
}

/// Result of a read-side refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub snapshot: StreakSnapshot,
    /// Milestone crossed by workouts the stored record had not seen
    pub triggered_badge: Option<Badge>,
    pub transition: StreakTransition,
    pub notification: NotificationStatus,
    /// Whether the stored record was rewritten
    pub persisted: bool,
}

/// Summary of one sweep over all known users
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub reminded: usize,
    pub broken: usize,
    pub failures: Vec<SweepFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub user_id: UserId,
    pub error: String,
}
