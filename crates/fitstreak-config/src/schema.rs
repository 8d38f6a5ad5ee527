//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Storage settings
    #[serde(default)]
    pub storage: RawStorageConfig,

    /// Streak engine parameters
    #[serde(default)]
    pub streak: RawStreakConfig,

    /// Label overrides for milestone badges
    #[serde(default)]
    pub badges: Vec<RawBadge>,
}

/// Storage settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawStorageConfig {
    /// Data directory for the database
    pub data_dir: Option<PathBuf>,
}

/// Streak engine parameters. Every field is optional and falls back to its default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawStreakConfig {
    /// Target active days per week
    pub weekly_goal: Option<u32>,

    /// Calendar days after the last active day during which the streak survives
    pub grace_days: Option<f64>,

    /// Offset of the reference timezone from UTC, in minutes
    pub utc_offset_minutes: Option<i32>,

    /// Streak lengths that earn a badge
    pub milestone_thresholds: Option<Vec<u32>>,

    /// "full" or "incremental"
    pub strategy: Option<String>,

    /// Retries after an optimistic update conflict
    pub max_retries: Option<u32>,
}

/// Badge label override
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawBadge {
    pub threshold: u32,
    pub label: String,
}
