//! Milestone thresholds and badge evaluation

use fitstreak_api::{Badge, DEFAULT_MILESTONES};
use fitstreak_config::validate_milestones;
use fitstreak_util::{Result, StreakError};

/// Validated set of milestone badges, ascending by threshold
#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneTable {
    badges: Vec<Badge>,
}

impl MilestoneTable {
    pub fn new(mut badges: Vec<Badge>) -> Result<Self> {
        let thresholds: Vec<u32> = badges.iter().map(|b| b.threshold).collect();
        let errors = validate_milestones(&thresholds);
        if !errors.is_empty() {
            let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(StreakError::config(reasons.join("; ")));
        }

        badges.sort_by_key(|b| b.threshold);
        Ok(Self { badges })
    }

    /// Table with default labels for each threshold
    pub fn from_thresholds(thresholds: &[u32]) -> Result<Self> {
        Self::new(
            thresholds
                .iter()
                .map(|t| Badge::with_default_label(*t))
                .collect(),
        )
    }

    pub fn badges(&self) -> &[Badge] {
        &self.badges
    }

    pub fn thresholds(&self) -> Vec<u32> {
        self.badges.iter().map(|b| b.threshold).collect()
    }
}

impl Default for MilestoneTable {
    fn default() -> Self {
        Self {
            badges: DEFAULT_MILESTONES
                .iter()
                .map(|t| Badge::with_default_label(*t))
                .collect(),
        }
    }
}

/// Pure streak-length to badge lookup
#[derive(Debug, Clone, Default)]
pub struct MilestoneEvaluator {
    table: MilestoneTable,
}

impl MilestoneEvaluator {
    pub fn new(table: MilestoneTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &MilestoneTable {
        &self.table
    }

    /// Highest badge whose threshold `streak_length` meets
    pub fn badge_for(&self, streak_length: u32) -> Option<&Badge> {
        self.table
            .badges
            .iter()
            .rev()
            .find(|b| streak_length >= b.threshold)
    }

    /// True only when moving from `previous` to `current` crosses upward
    /// into a higher badge
    pub fn is_newly_earned(&self, previous: u32, current: u32) -> bool {
        match (self.badge_for(previous), self.badge_for(current)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(before), Some(after)) => after.threshold > before.threshold,
        }
    }

    /// Smallest threshold strictly above `current`, saturating at the largest
    pub fn next_milestone(&self, current: u32) -> u32 {
        self.table
            .badges
            .iter()
            .find(|b| b.threshold > current)
            .or_else(|| self.table.badges.last())
            .map_or(0, |b| b.threshold)
    }

    pub fn smallest(&self) -> u32 {
        self.table.badges.first().map_or(0, |b| b.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator(thresholds: &[u32]) -> MilestoneEvaluator {
        MilestoneEvaluator::new(MilestoneTable::from_thresholds(thresholds).unwrap())
    }

    #[test]
    fn table_rejects_bad_thresholds() {
        assert!(MilestoneTable::from_thresholds(&[]).is_err());
        assert!(MilestoneTable::from_thresholds(&[0, 7]).is_err());
        assert!(MilestoneTable::from_thresholds(&[7, 7]).is_err());
    }

    #[test]
    fn table_sorts_ascending() {
        let table = MilestoneTable::from_thresholds(&[365, 7, 100, 30]).unwrap();
        assert_eq!(table.thresholds(), vec![7, 30, 100, 365]);
        assert_eq!(table, MilestoneTable::default());
    }

    #[test]
    fn badge_for_picks_highest_met() {
        let eval = MilestoneEvaluator::default();
        assert!(eval.badge_for(0).is_none());
        assert!(eval.badge_for(6).is_none());
        assert_eq!(eval.badge_for(7).unwrap().threshold, 7);
        assert_eq!(eval.badge_for(29).unwrap().threshold, 7);
        assert_eq!(eval.badge_for(100).unwrap().label, "Century Club");
        assert_eq!(eval.badge_for(1000).unwrap().threshold, 365);
    }

    #[test]
    fn crossing_fires_once() {
        let eval = evaluator(&[7, 30]);

        assert!(eval.is_newly_earned(6, 7));
        assert_eq!(eval.badge_for(7).unwrap().threshold, 7);

        // Next event keeps the streak above the threshold
        assert!(!eval.is_newly_earned(7, 8));
        // Unchanged
        assert!(!eval.is_newly_earned(7, 7));
        // Decrease
        assert!(!eval.is_newly_earned(7, 6));
        assert!(!eval.is_newly_earned(31, 8));
        // Backfill can jump straight past several thresholds
        assert!(eval.is_newly_earned(3, 31));
        assert!(eval.is_newly_earned(29, 30));
    }

    #[test]
    fn next_milestone_saturates() {
        let eval = MilestoneEvaluator::default();
        assert_eq!(eval.smallest(), 7);
        assert_eq!(eval.next_milestone(0), 7);
        assert_eq!(eval.next_milestone(7), 30);
        assert_eq!(eval.next_milestone(99), 100);
        assert_eq!(eval.next_milestone(365), 365);
        assert_eq!(eval.next_milestone(500), 365);
    }
}
