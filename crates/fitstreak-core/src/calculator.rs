//! Streak calculator
//!
//! Pure derivation of a [`StreakSnapshot`] from a user's workout history.
//! The calculator never reads a clock; callers pass `reference_now`.

use chrono::{DateTime, Utc};
use fitstreak_api::{StreakSnapshot, WorkoutEvent};
use fitstreak_config::StreakPolicy;
use fitstreak_util::{Calendar, CalendarDay, Result, StreakError};

use crate::{MilestoneEvaluator, MilestoneTable};

/// Length of the trailing weekly-progress window, in calendar days
pub const WEEK_DAYS: i64 = 7;

/// A snapshot together with the open run it was derived from.
///
/// `open_run` is the length of the contiguous run ending at
/// `last_workout_date` before the grace check, which is what an
/// incremental update needs to extend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computation {
    pub snapshot: StreakSnapshot,
    pub open_run: u32,
}

/// Stateless streak calculator with explicit parameters
#[derive(Debug, Clone)]
pub struct StreakCalculator {
    calendar: Calendar,
    weekly_goal: u32,
    grace_days: f64,
    milestones: MilestoneEvaluator,
}

impl StreakCalculator {
    pub fn new(
        calendar: Calendar,
        weekly_goal: u32,
        grace_days: f64,
        milestones: MilestoneEvaluator,
    ) -> Self {
        Self {
            calendar,
            weekly_goal,
            grace_days,
            milestones,
        }
    }

    /// Build from a policy, rejecting parameters the config loader would refuse
    pub fn from_policy(policy: &StreakPolicy) -> Result<Self> {
        if !(1..=WEEK_DAYS as u32).contains(&policy.weekly_goal) {
            return Err(StreakError::config(format!(
                "weekly_goal must be between 1 and {}, got {}",
                WEEK_DAYS, policy.weekly_goal
            )));
        }
        if !policy.grace_days.is_finite() || policy.grace_days < 0.0 {
            return Err(StreakError::config(format!(
                "grace_days must be a finite, non-negative number, got {}",
                policy.grace_days
            )));
        }

        let calendar = Calendar::new(policy.utc_offset_minutes)?;
        let table = MilestoneTable::new(policy.milestones.clone())?;
        Ok(Self::new(
            calendar,
            policy.weekly_goal,
            policy.grace_days,
            MilestoneEvaluator::new(table),
        ))
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn milestones(&self) -> &MilestoneEvaluator {
        &self.milestones
    }

    pub fn weekly_goal(&self) -> u32 {
        self.weekly_goal
    }

    pub fn grace_days(&self) -> f64 {
        self.grace_days
    }

    /// Zero snapshot for a user with no history
    pub fn empty_snapshot(&self) -> StreakSnapshot {
        StreakSnapshot::empty(self.weekly_goal, self.milestones.smallest())
    }

    /// Whether a run whose last active day is `last_day` is still alive on `today`
    pub fn is_alive(&self, last_day: CalendarDay, today: CalendarDay) -> bool {
        let days_since = self.calendar.days_between(today, last_day);
        (days_since as f64) <= self.grace_days
    }

    /// Alive today, but broken tomorrow unless the user works out
    pub fn is_at_risk(&self, last_day: CalendarDay, today: CalendarDay) -> bool {
        self.is_alive(last_day, today) && !self.is_alive(last_day, today.add_days(1))
    }

    pub fn compute_snapshot(
        &self,
        events: &[WorkoutEvent],
        reference_now: DateTime<Utc>,
    ) -> StreakSnapshot {
        self.compute(events, reference_now).snapshot
    }

    /// Full pass over the whole history
    pub fn compute(&self, events: &[WorkoutEvent], reference_now: DateTime<Utc>) -> Computation {
        let days = self.distinct_days_desc(events);
        let Some(&last_day) = days.first() else {
            return Computation {
                snapshot: self.empty_snapshot(),
                open_run: 0,
            };
        };

        let runs = self.runs(&days);
        let open_run = runs.first().copied().unwrap_or(0);
        let longest = runs.iter().copied().max().unwrap_or(0);

        self.finish(last_day, open_run, longest, &days, reference_now)
    }

    /// Extend `previous` with a workout on `new_day`.
    ///
    /// `recent` must hold at least the events of the trailing weekly window,
    /// including the new one. Returns `None` when the new day precedes the
    /// previous last active day (or there is no previous history); callers
    /// fall back to [`StreakCalculator::compute`] in that case.
    pub fn advance(
        &self,
        previous: &Computation,
        new_day: CalendarDay,
        recent: &[WorkoutEvent],
        reference_now: DateTime<Utc>,
    ) -> Option<Computation> {
        let last_day = previous.snapshot.last_workout_date?;
        if new_day < last_day {
            return None;
        }

        let open_run = match self.calendar.days_between(new_day, last_day) {
            0 => previous.open_run.max(1),
            1 => previous.open_run + 1,
            _ => 1,
        };
        let longest = previous.snapshot.longest_streak.max(open_run);

        let days = self.distinct_days_desc(recent);
        Some(self.finish(new_day, open_run, longest, &days, reference_now))
    }

    /// Re-evaluate `previous` at a later `reference_now` with no new workout
    pub fn reevaluate(
        &self,
        previous: &Computation,
        recent: &[WorkoutEvent],
        reference_now: DateTime<Utc>,
    ) -> Computation {
        match previous.snapshot.last_workout_date {
            Some(last_day) => {
                let days = self.distinct_days_desc(recent);
                self.finish(
                    last_day,
                    previous.open_run,
                    previous.snapshot.longest_streak,
                    &days,
                    reference_now,
                )
            }
            None => Computation {
                snapshot: self.empty_snapshot(),
                open_run: 0,
            },
        }
    }

    fn finish(
        &self,
        last_day: CalendarDay,
        open_run: u32,
        longest: u32,
        days_desc: &[CalendarDay],
        reference_now: DateTime<Utc>,
    ) -> Computation {
        let today = self.calendar.day_of(reference_now);

        // Grace only protects the open run; past runs count in full
        let current = if self.is_alive(last_day, today) {
            open_run
        } else {
            0
        };

        let weekly_progress = days_desc
            .iter()
            .filter(|day| {
                let age = self.calendar.days_between(today, **day);
                (0..WEEK_DAYS).contains(&age)
            })
            .count() as u32;

        Computation {
            snapshot: StreakSnapshot {
                current_streak: current,
                longest_streak: longest.max(current),
                last_workout_date: Some(last_day),
                weekly_progress,
                weekly_goal: self.weekly_goal,
                next_milestone: self.milestones.next_milestone(current),
            },
            open_run,
        }
    }

    fn distinct_days_desc(&self, events: &[WorkoutEvent]) -> Vec<CalendarDay> {
        let mut days: Vec<CalendarDay> = events
            .iter()
            .map(|e| self.calendar.day_of(e.timestamp))
            .collect();
        days.sort_unstable_by(|a, b| b.cmp(a));
        days.dedup();
        days
    }

    /// Contiguous run lengths, most recent first
    fn runs(&self, days_desc: &[CalendarDay]) -> Vec<u32> {
        let mut runs = Vec::new();
        let mut run = 0u32;
        let mut previous: Option<CalendarDay> = None;

        for &day in days_desc {
            match previous {
                Some(later) if self.calendar.days_between(later, day) <= 1 => run += 1,
                Some(_) => {
                    runs.push(run);
                    run = 1;
                }
                None => run = 1,
            }
            previous = Some(day);
        }
        if run > 0 {
            runs.push(run);
        }

        runs
    }
}

impl Default for StreakCalculator {
    fn default() -> Self {
        Self::new(
            Calendar::utc(),
            fitstreak_config::DEFAULT_WEEKLY_GOAL,
            fitstreak_config::DEFAULT_GRACE_DAYS,
            MilestoneEvaluator::default(),
        )
    }
}
