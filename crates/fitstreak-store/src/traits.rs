//! Store trait definitions

use chrono::{DateTime, Utc};
use fitstreak_api::{Badge, StreakSnapshot, StreakState, WorkoutEvent};
use fitstreak_util::{CalendarDay, UserId, WorkoutId};
use serde::{Deserialize, Serialize};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Workout history

    /// Record a logged workout
    fn append_workout(&self, event: &WorkoutEvent) -> StoreResult<()>;

    /// All workouts for a user, in no particular order
    fn list_workout_events(&self, user: &UserId) -> StoreResult<Vec<WorkoutEvent>>;

    /// Workouts at or after `since`
    fn list_workout_events_since(
        &self,
        user: &UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<WorkoutEvent>> {
        Ok(self
            .list_workout_events(user)?
            .into_iter()
            .filter(|e| e.timestamp >= since)
            .collect())
    }

    /// Remove a workout. Returns false if it did not exist.
    fn delete_workout(&self, user: &UserId, id: &WorkoutId) -> StoreResult<bool>;

    // Streak records

    /// Load the persisted streak record for a user
    fn load_streak(&self, user: &UserId) -> StoreResult<Option<StoredStreak>>;

    /// Compare-and-swap the streak record.
    ///
    /// `expected_version` is the version that was loaded (`None` if no record
    /// existed). If `award` is set, the badge is recorded in the same
    /// transaction. Returns the new version, or `StoreError::Conflict`.
    fn save_streak(
        &self,
        user: &UserId,
        record: &StoredStreak,
        expected_version: Option<u64>,
        award: Option<&Badge>,
    ) -> StoreResult<u64>;

    /// Append `event` and compare-and-swap its user's streak record in one
    /// transaction. On any error neither is written.
    fn commit_workout(
        &self,
        event: &WorkoutEvent,
        record: &StoredStreak,
        expected_version: Option<u64>,
        award: Option<&Badge>,
    ) -> StoreResult<u64>;

    /// Users with any workout or streak record
    fn list_users(&self) -> StoreResult<Vec<UserId>>;

    // Badges

    /// Thresholds already signalled for a user
    fn awarded_badges(&self, user: &UserId) -> StoreResult<Vec<u32>>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Persisted per-user streak record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredStreak {
    pub snapshot: StreakSnapshot,

    /// Length of the contiguous run ending at `last_workout_date`,
    /// before the grace window is applied
    pub open_run: u32,

    pub state: StreakState,

    /// Reference instant the snapshot was computed at
    pub computed_at: DateTime<Utc>,

    /// Day the last at-risk reminder went out
    #[serde(default)]
    pub reminded_on: Option<CalendarDay>,

    /// Record version; assigned by the store on save
    #[serde(default)]
    pub version: u64,
}
