//! Shared types for the streak engine

use chrono::{DateTime, Utc};
use fitstreak_util::{parse_timestamp, CalendarDay, StreakError, UserId, WorkoutId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One completed workout occurrence. Immutable once logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutEvent {
    pub id: WorkoutId,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

impl WorkoutEvent {
    pub fn new(user_id: impl Into<UserId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: WorkoutId::new(),
            user_id: user_id.into(),
            timestamp,
        }
    }

    /// Build an event from untrusted input (RFC 3339 timestamp)
    pub fn parse(user_id: &str, timestamp: &str) -> fitstreak_util::Result<Self> {
        let event = Self::new(user_id, parse_timestamp(timestamp)?);
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> fitstreak_util::Result<()> {
        if self.user_id.is_blank() {
            return Err(StreakError::validation(format!(
                "workout {} has no user id",
                self.id
            )));
        }
        Ok(())
    }
}

/// Engagement state of a user, as tracked by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakState {
    /// No workout has ever been logged
    #[default]
    NoHistory,
    /// The most recent active day is still inside the grace window
    Active,
    /// History exists but the grace window has lapsed
    Broken,
}

impl StreakState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreakState::NoHistory => "no_history",
            StreakState::Active => "active",
            StreakState::Broken => "broken",
        }
    }
}

impl fmt::Display for StreakState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived, recomputable summary of a user's engagement at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSnapshot {
    /// Consecutive active days up to the most recent one (0 once broken)
    pub current_streak: u32,
    /// Historical maximum; never below `current_streak`
    pub longest_streak: u32,
    pub last_workout_date: Option<CalendarDay>,
    /// Distinct active days in the trailing 7-day window ending now
    pub weekly_progress: u32,
    pub weekly_goal: u32,
    /// Smallest milestone above `current_streak`, saturating at the largest
    pub next_milestone: u32,
}

impl StreakSnapshot {
    /// Snapshot for a user with no workouts
    pub fn empty(weekly_goal: u32, next_milestone: u32) -> Self {
        Self {
            current_streak: 0,
            longest_streak: 0,
            last_workout_date: None,
            weekly_progress: 0,
            weekly_goal,
            next_milestone,
        }
    }

    pub fn days_to_next_milestone(&self) -> u32 {
        self.next_milestone.saturating_sub(self.current_streak)
    }

    pub fn weekly_goal_met(&self) -> bool {
        self.weekly_progress >= self.weekly_goal
    }

    /// Weekly progress as a percentage of the goal, capped at 100
    pub fn weekly_progress_percent(&self) -> u32 {
        if self.weekly_goal == 0 {
            return 100;
        }
        ((self.weekly_progress * 100) / self.weekly_goal).min(100)
    }

    pub fn has_history(&self) -> bool {
        self.last_workout_date.is_some()
    }
}

/// A milestone badge: a streak-length threshold and its display label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Badge {
    pub threshold: u32,
    pub label: String,
}

impl Badge {
    pub fn new(threshold: u32, label: impl Into<String>) -> Self {
        Self {
            threshold,
            label: label.into(),
        }
    }

    pub fn with_default_label(threshold: u32) -> Self {
        Self::new(threshold, default_badge_label(threshold))
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} days)", self.label, self.threshold)
    }
}

/// Default milestone thresholds, in days
pub const DEFAULT_MILESTONES: [u32; 4] = [7, 30, 100, 365];

/// Built-in label for a milestone threshold
pub fn default_badge_label(threshold: u32) -> String {
    match threshold {
        7 => "Week Champion".to_string(),
        30 => "Monthly Master".to_string(),
        100 => "Century Club".to_string(),
        365 => "Year Warrior".to_string(),
        n => format!("{}-Day Streak", n),
    }
}
