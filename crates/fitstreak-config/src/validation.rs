//! Configuration validation

use crate::schema::{RawBadge, RawConfig, RawStreakConfig};
use crate::RecomputeStrategy;
use fitstreak_util::MAX_UTC_OFFSET_MINUTES;
use std::collections::HashSet;
use thiserror::Error;

/// Upper bound for `max_retries`
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("weekly_goal must be between 1 and 7, got {0}")]
    WeeklyGoalOutOfRange(u32),

    #[error("grace_days must be a finite, non-negative number, got {0}")]
    InvalidGraceDays(f64),

    #[error("utc_offset_minutes {value} is outside +/-{max}")]
    UtcOffsetOutOfRange { value: i32, max: i32 },

    #[error("milestone_thresholds cannot be empty")]
    EmptyMilestones,

    #[error("Milestone thresholds must be positive")]
    ZeroMilestone,

    #[error("Duplicate milestone threshold: {0}")]
    DuplicateMilestone(u32),

    #[error("Badge '{label}' refers to unknown threshold {threshold}")]
    UnknownBadgeThreshold { threshold: u32, label: String },

    #[error("Badge for threshold {0} is defined more than once")]
    DuplicateBadge(u32),

    #[error("Badge label for threshold {0} cannot be empty")]
    EmptyBadgeLabel(u32),

    #[error("Unknown recompute strategy '{0}' (expected \"full\" or \"incremental\")")]
    UnknownStrategy(String),

    #[error("max_retries must be at most {max}, got {value}")]
    TooManyRetries { value: u32, max: u32 },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = validate_streak(&config.streak);

    let thresholds = config
        .streak
        .milestone_thresholds
        .clone()
        .unwrap_or_else(|| fitstreak_api::DEFAULT_MILESTONES.to_vec());
    errors.extend(validate_badges(&config.badges, &thresholds));

    errors
}

fn validate_streak(streak: &RawStreakConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(goal) = streak.weekly_goal
        && !(1..=7).contains(&goal)
    {
        errors.push(ValidationError::WeeklyGoalOutOfRange(goal));
    }

    if let Some(grace) = streak.grace_days
        && (!grace.is_finite() || grace < 0.0)
    {
        errors.push(ValidationError::InvalidGraceDays(grace));
    }

    if let Some(offset) = streak.utc_offset_minutes
        && offset.abs() > MAX_UTC_OFFSET_MINUTES
    {
        errors.push(ValidationError::UtcOffsetOutOfRange {
            value: offset,
            max: MAX_UTC_OFFSET_MINUTES,
        });
    }

    if let Some(thresholds) = &streak.milestone_thresholds {
        errors.extend(validate_milestones(thresholds));
    }

    if let Some(strategy) = &streak.strategy
        && RecomputeStrategy::parse(strategy).is_none()
    {
        errors.push(ValidationError::UnknownStrategy(strategy.clone()));
    }

    if let Some(retries) = streak.max_retries
        && retries > MAX_RETRIES_LIMIT
    {
        errors.push(ValidationError::TooManyRetries {
            value: retries,
            max: MAX_RETRIES_LIMIT,
        });
    }

    errors
}

/// Validate a milestone threshold list
pub fn validate_milestones(thresholds: &[u32]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if thresholds.is_empty() {
        errors.push(ValidationError::EmptyMilestones);
        return errors;
    }

    if thresholds.contains(&0) {
        errors.push(ValidationError::ZeroMilestone);
    }

    let mut seen = HashSet::new();
    for threshold in thresholds {
        if !seen.insert(threshold) {
            errors.push(ValidationError::DuplicateMilestone(*threshold));
        }
    }

    errors
}

fn validate_badges(badges: &[RawBadge], thresholds: &[u32]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for badge in badges {
        if !thresholds.contains(&badge.threshold) {
            errors.push(ValidationError::UnknownBadgeThreshold {
                threshold: badge.threshold,
                label: badge.label.clone(),
            });
        }

        if badge.label.trim().is_empty() {
            errors.push(ValidationError::EmptyBadgeLabel(badge.threshold));
        }

        if !seen.insert(badge.threshold) {
            errors.push(ValidationError::DuplicateBadge(badge.threshold));
        }
    }

    errors
}
