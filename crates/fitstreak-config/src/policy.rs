//! Validated policy structures

use crate::schema::{RawConfig, RawStorageConfig};
use fitstreak_api::{default_badge_label, Badge, DEFAULT_MILESTONES};
use fitstreak_util::default_data_dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default target active days per week
pub const DEFAULT_WEEKLY_GOAL: u32 = 3;

/// Default grace window: a streak survives one day without a workout
pub const DEFAULT_GRACE_DAYS: f64 = 1.5;

/// Default retries after an optimistic update conflict
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How the orchestrator refreshes a snapshot after a new workout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeStrategy {
    /// Re-derive everything from the complete workout history
    #[default]
    FullHistory,
    /// Extend the stored open run using only the trailing week of events,
    /// falling back to a full pass for backfills
    Incremental,
}

impl RecomputeStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "full" | "full_history" => Some(Self::FullHistory),
            "incremental" => Some(Self::Incremental),
            _ => None,
        }
    }
}

impl fmt::Display for RecomputeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullHistory => f.write_str("full"),
            Self::Incremental => f.write_str("incremental"),
        }
    }
}

/// Validated policy ready for use by the streak engine
#[derive(Debug, Clone, PartialEq)]
pub struct StreakPolicy {
    pub storage: StorageConfig,

    /// Target active days per week
    pub weekly_goal: u32,

    /// Grace window in calendar days
    pub grace_days: f64,

    /// Reference timezone offset from UTC, in minutes
    pub utc_offset_minutes: i32,

    /// Milestone badges, ascending by threshold
    pub milestones: Vec<Badge>,

    pub strategy: RecomputeStrategy,

    pub max_retries: u32,
}

impl StreakPolicy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let thresholds = raw
            .streak
            .milestone_thresholds
            .unwrap_or_else(|| DEFAULT_MILESTONES.to_vec());

        let mut milestones: Vec<Badge> = thresholds
            .into_iter()
            .map(|threshold| {
                let label = raw
                    .badges
                    .iter()
                    .find(|b| b.threshold == threshold)
                    .map(|b| b.label.trim().to_string())
                    .unwrap_or_else(|| default_badge_label(threshold));
                Badge::new(threshold, label)
            })
            .collect();
        milestones.sort_by_key(|b| b.threshold);

        Self {
            storage: StorageConfig::from_raw(raw.storage),
            weekly_goal: raw.streak.weekly_goal.unwrap_or(DEFAULT_WEEKLY_GOAL),
            grace_days: raw.streak.grace_days.unwrap_or(DEFAULT_GRACE_DAYS),
            utc_offset_minutes: raw.streak.utc_offset_minutes.unwrap_or(0),
            milestones,
            strategy: raw
                .streak
                .strategy
                .as_deref()
                .and_then(RecomputeStrategy::parse)
                .unwrap_or_default(),
            max_retries: raw.streak.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        }
    }

    /// Milestone thresholds, ascending
    pub fn thresholds(&self) -> Vec<u32> {
        self.milestones.iter().map(|b| b.threshold).collect()
    }
}

impl Default for StreakPolicy {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            weekly_goal: DEFAULT_WEEKLY_GOAL,
            grace_days: DEFAULT_GRACE_DAYS,
            utc_offset_minutes: 0,
            milestones: DEFAULT_MILESTONES
                .iter()
                .map(|t| Badge::with_default_label(*t))
                .collect(),
            strategy: RecomputeStrategy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_raw(raw: RawStorageConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}
