//! Streak update orchestrator
//!
//! The only stateful component: loads the stored record, recomputes, evaluates
//! badges, persists with compare-and-swap and emits at most one notification
//! per operation. Every mutating operation is serialized per user.

use chrono::{DateTime, Utc};
use fitstreak_api::{Badge, NotificationRequest, StreakSnapshot, StreakState, WorkoutEvent};
use fitstreak_config::{RecomputeStrategy, StreakPolicy};
use fitstreak_notify::Notifier;
use fitstreak_store::{AuditEvent, AuditEventType, Store, StoredStreak};
use fitstreak_util::{Calendar, CalendarDay, Clock, Result, StreakError, UserId, WorkoutId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::{
    Computation, NotificationStatus, RefreshOutcome, StreakCalculator, StreakTransition,
    SweepFailure, SweepReport, WEEK_DAYS, WorkoutOutcome,
};

/// The streak engine
pub struct StreakEngine {
    calculator: StreakCalculator,
    strategy: RecomputeStrategy,
    max_retries: u32,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    user_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

/// A committed apply, before side effects
struct Applied {
    snapshot: StreakSnapshot,
    badge: Option<Badge>,
    transition: StreakTransition,
    previous_streak: u32,
}

/// A committed refresh, before side effects
struct Refreshed {
    snapshot: StreakSnapshot,
    badge: Option<Badge>,
    transition: StreakTransition,
    previous_streak: u32,
    record: Option<StoredStreak>,
    persisted: bool,
}

impl StreakEngine {
    pub fn new(
        policy: &StreakPolicy,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let calculator = StreakCalculator::from_policy(policy)?;

        info!(
            weekly_goal = policy.weekly_goal,
            grace_days = policy.grace_days,
            strategy = %policy.strategy,
            milestones = ?policy.thresholds(),
            "Streak engine initialized"
        );

        let engine = Self {
            calculator,
            strategy: policy.strategy,
            max_retries: policy.max_retries,
            store,
            notifier,
            clock,
            user_locks: Mutex::new(HashMap::new()),
        };

        engine.audit(AuditEventType::ConfigLoaded {
            weekly_goal: policy.weekly_goal,
            grace_days: policy.grace_days,
            milestones: policy.thresholds(),
        });

        Ok(engine)
    }

    pub fn calculator(&self) -> &StreakCalculator {
        &self.calculator
    }

    pub fn strategy(&self) -> RecomputeStrategy {
        self.strategy
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Today in the deployment calendar
    pub fn today(&self) -> CalendarDay {
        self.calendar().today(self.clock.as_ref())
    }

    fn calendar(&self) -> &Calendar {
        self.calculator.calendar()
    }

    /// Store a newly logged workout and fold it into the streak.
    ///
    /// The event row and the updated record are written in one transaction:
    /// if the update fails, the workout is not stored either.
    pub fn record_workout(&self, event: &WorkoutEvent) -> Result<WorkoutOutcome> {
        let outcome = self.apply(event, true)?;
        debug!(user_id = %event.user_id, workout_id = %event.id, "Workout recorded");
        Ok(outcome)
    }

    /// Fold a workout into the user's streak.
    ///
    /// The event is included in the history even if the store does not
    /// hold it yet. Emits at most one notification: a milestone badge, or
    /// `Broken` if the stored streak lapsed and the event does not revive it.
    pub fn apply_workout(&self, event: &WorkoutEvent) -> Result<WorkoutOutcome> {
        self.apply(event, false)
    }

    fn apply(&self, event: &WorkoutEvent, append: bool) -> Result<WorkoutOutcome> {
        let now = self.clock.now();
        self.check_event(event, now)?;

        let user = &event.user_id;
        let lock = self.user_lock(user);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let applied = self.with_retries(user, || self.try_apply(event, append, now))?;

        info!(
            user_id = %user,
            workout_id = %event.id,
            current_streak = applied.snapshot.current_streak,
            longest_streak = applied.snapshot.longest_streak,
            weekly_progress = applied.snapshot.weekly_progress,
            transition = ?applied.transition,
            "Workout applied"
        );

        self.audit(AuditEventType::WorkoutApplied {
            user_id: user.clone(),
            workout_id: event.id,
            current_streak: applied.snapshot.current_streak,
            longest_streak: applied.snapshot.longest_streak,
        });

        let notification = if let Some(badge) = &applied.badge {
            self.badge_earned(user, badge, now)
        } else if applied.transition == StreakTransition::Broken {
            self.streak_broken(user, applied.previous_streak, now)
        } else {
            NotificationStatus::NotRequired
        };

        Ok(WorkoutOutcome {
            snapshot: applied.snapshot,
            triggered_badge: applied.badge,
            transition: applied.transition,
            notification,
        })
    }

    fn try_apply(
        &self,
        event: &WorkoutEvent,
        append: bool,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        let user = &event.user_id;
        let today = self.calendar().day_of(now);

        let previous = self.store.load_streak(user)?;
        let computation = self.compute_with_event(previous.as_ref(), event, now)?;

        let state = state_of(&computation.snapshot);
        let current = computation.snapshot.current_streak;
        let transition = self.transition(previous.as_ref(), today, state, current);
        let previous_streak = previous.as_ref().map_or(0, |p| p.snapshot.current_streak);
        let badge = self.newly_awarded(user, previous_streak, current)?;

        let record = StoredStreak {
            snapshot: computation.snapshot,
            open_run: computation.open_run,
            state,
            computed_at: now,
            reminded_on: previous.as_ref().and_then(|p| p.reminded_on),
            version: 0,
        };
        let expected = previous.as_ref().map(|p| p.version);
        if append {
            self.store
                .commit_workout(event, &record, expected, badge.as_ref())?;
        } else {
            self.store.save_streak(user, &record, expected, badge.as_ref())?;
        }

        Ok(Applied {
            snapshot: record.snapshot,
            badge,
            transition,
            previous_streak,
        })
    }

    fn compute_with_event(
        &self,
        previous: Option<&StoredStreak>,
        event: &WorkoutEvent,
        now: DateTime<Utc>,
    ) -> Result<Computation> {
        let user = &event.user_id;

        if let (RecomputeStrategy::Incremental, Some(prev)) = (self.strategy, previous) {
            let today = self.calendar().day_of(now);
            let mut recent = self
                .store
                .list_workout_events_since(user, self.window_start(today))?;
            include_event(&mut recent, event);

            let day = self.calendar().day_of(event.timestamp);
            if let Some(computation) =
                self.calculator
                    .advance(&computation_of(prev), day, &recent, now)
            {
                return Ok(computation);
            }
            debug!(
                user_id = %user,
                workout_id = %event.id,
                "Backdated workout, recomputing from full history"
            );
        }

        let mut history = self.store.list_workout_events(user)?;
        include_event(&mut history, event);
        Ok(self.calculator.compute(&history, now))
    }

    /// Badge to award for this change, unless it was signalled before
    fn newly_awarded(&self, user: &UserId, previous: u32, current: u32) -> Result<Option<Badge>> {
        let evaluator = self.calculator.milestones();
        if !evaluator.is_newly_earned(previous, current) {
            return Ok(None);
        }
        let Some(badge) = evaluator.badge_for(current) else {
            return Ok(None);
        };

        if self.store.awarded_badges(user)?.contains(&badge.threshold) {
            debug!(user_id = %user, threshold = badge.threshold, "Badge already signalled");
            return Ok(None);
        }

        Ok(Some(badge.clone()))
    }

    /// Current snapshot for `user`, applying any lazy transition at now
    pub fn snapshot(&self, user: &UserId) -> Result<StreakSnapshot> {
        Ok(self.refresh(user)?.snapshot)
    }

    /// Re-evaluate a user's streak at now.
    ///
    /// Persists only when something changed. A stored `Active` streak whose
    /// grace window has lapsed becomes `Broken` here, with one notification.
    /// If the stored record lagged behind the history and the streak crossed
    /// a milestone that was never signalled, the badge is awarded here.
    pub fn refresh(&self, user: &UserId) -> Result<RefreshOutcome> {
        check_user(user)?;
        let now = self.clock.now();

        let lock = self.user_lock(user);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (outcome, _) = self.refresh_locked(user, now)?;
        Ok(outcome)
    }

    fn refresh_locked(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(RefreshOutcome, Option<StoredStreak>)> {
        let refreshed = self.with_retries(user, || self.try_refresh(user, now))?;

        let notification = if let Some(badge) = &refreshed.badge {
            self.badge_earned(user, badge, now)
        } else if refreshed.transition == StreakTransition::Broken {
            self.streak_broken(user, refreshed.previous_streak, now)
        } else {
            NotificationStatus::NotRequired
        };

        if refreshed.persisted {
            debug!(
                user_id = %user,
                current_streak = refreshed.snapshot.current_streak,
                transition = ?refreshed.transition,
                "Snapshot refreshed"
            );
        }

        Ok((
            RefreshOutcome {
                snapshot: refreshed.snapshot,
                triggered_badge: refreshed.badge,
                transition: refreshed.transition,
                notification,
                persisted: refreshed.persisted,
            },
            refreshed.record,
        ))
    }

    fn try_refresh(&self, user: &UserId, now: DateTime<Utc>) -> Result<Refreshed> {
        let today = self.calendar().day_of(now);
        let previous = self.store.load_streak(user)?;

        let computation = match (self.strategy, previous.as_ref()) {
            (RecomputeStrategy::Incremental, Some(prev)) => {
                let recent = self
                    .store
                    .list_workout_events_since(user, self.window_start(today))?;
                self.calculator
                    .reevaluate(&computation_of(prev), &recent, now)
            }
            _ => {
                let history = self.store.list_workout_events(user)?;
                self.calculator.compute(&history, now)
            }
        };

        let state = state_of(&computation.snapshot);
        let transition = self.transition(
            previous.as_ref(),
            today,
            state,
            computation.snapshot.current_streak,
        );
        let previous_streak = previous.as_ref().map_or(0, |p| p.snapshot.current_streak);
        let badge =
            self.newly_awarded(user, previous_streak, computation.snapshot.current_streak)?;

        let changed = match &previous {
            Some(prev) => {
                prev.snapshot != computation.snapshot
                    || prev.state != state
                    || prev.open_run != computation.open_run
            }
            None => state != StreakState::NoHistory,
        };

        if !changed {
            return Ok(Refreshed {
                snapshot: computation.snapshot,
                badge: None,
                transition,
                previous_streak,
                record: previous,
                persisted: false,
            });
        }

        let mut record = StoredStreak {
            snapshot: computation.snapshot,
            open_run: computation.open_run,
            state,
            computed_at: now,
            reminded_on: previous.as_ref().and_then(|p| p.reminded_on),
            version: 0,
        };
        record.version = self.store.save_streak(
            user,
            &record,
            previous.as_ref().map(|p| p.version),
            badge.as_ref(),
        )?;

        Ok(Refreshed {
            snapshot: record.snapshot.clone(),
            badge,
            transition,
            previous_streak,
            record: Some(record),
            persisted: true,
        })
    }

    /// Full recomputation after the history changed underneath the engine.
    ///
    /// Badges already signalled stay recorded. The only notification is a
    /// milestone the rebuilt streak newly crossed.
    pub fn recompute(&self, user: &UserId) -> Result<StreakSnapshot> {
        check_user(user)?;

        let lock = self.user_lock(user);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.recompute_locked(user)
    }

    fn recompute_locked(&self, user: &UserId) -> Result<StreakSnapshot> {
        let now = self.clock.now();

        let (snapshot, badge) = self.with_retries(user, || {
            let previous = self.store.load_streak(user)?;
            let history = self.store.list_workout_events(user)?;
            let computation = self.calculator.compute(&history, now);
            let state = state_of(&computation.snapshot);

            if previous.is_none() && state == StreakState::NoHistory {
                return Ok((computation.snapshot, None));
            }

            let previous_streak = previous.as_ref().map_or(0, |p| p.snapshot.current_streak);
            let badge =
                self.newly_awarded(user, previous_streak, computation.snapshot.current_streak)?;

            let record = StoredStreak {
                snapshot: computation.snapshot,
                open_run: computation.open_run,
                state,
                computed_at: now,
                reminded_on: previous.as_ref().and_then(|p| p.reminded_on),
                version: 0,
            };
            self.store.save_streak(
                user,
                &record,
                previous.as_ref().map(|p| p.version),
                badge.as_ref(),
            )?;
            Ok((record.snapshot, badge))
        })?;

        info!(
            user_id = %user,
            current_streak = snapshot.current_streak,
            longest_streak = snapshot.longest_streak,
            "Streak recomputed"
        );

        self.audit(AuditEventType::StreakRecomputed {
            user_id: user.clone(),
            current_streak: snapshot.current_streak,
            longest_streak: snapshot.longest_streak,
        });

        if let Some(badge) = &badge {
            self.badge_earned(user, badge, now);
        }

        Ok(snapshot)
    }

    /// Remove a logged workout and recompute the streak without it
    pub fn delete_workout(&self, user: &UserId, workout_id: &WorkoutId) -> Result<StreakSnapshot> {
        check_user(user)?;

        let lock = self.user_lock(user);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.store.delete_workout(user, workout_id)? {
            return Err(StreakError::validation(format!(
                "no workout {} for user {}",
                workout_id, user
            )));
        }

        info!(user_id = %user, workout_id = %workout_id, "Workout deleted");
        self.audit(AuditEventType::WorkoutDeleted {
            user_id: user.clone(),
            workout_id: *workout_id,
        });

        self.recompute_locked(user)
    }

    /// Refresh every known user and remind those whose streak ends tomorrow.
    ///
    /// Per-user failures are collected in the report and do not stop the sweep.
    pub fn sweep(&self) -> Result<SweepReport> {
        let users = self.store.list_users()?;
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for user in users {
            report.checked += 1;
            match self.sweep_user(&user, now) {
                Ok((broken, reminded)) => {
                    report.broken += usize::from(broken);
                    report.reminded += usize::from(reminded);
                }
                Err(e) => {
                    warn!(user_id = %user, error = %e, "Sweep failed for user");
                    report.failures.push(SweepFailure {
                        user_id: user,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            checked = report.checked,
            reminded = report.reminded,
            broken = report.broken,
            failures = report.failures.len(),
            "Sweep complete"
        );

        Ok(report)
    }

    /// Returns (broke, reminded)
    fn sweep_user(&self, user: &UserId, now: DateTime<Utc>) -> Result<(bool, bool)> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (outcome, record) = self.refresh_locked(user, now)?;
        let broken = outcome.transition == StreakTransition::Broken;

        let Some(record) = record else {
            return Ok((broken, false));
        };

        let today = self.calendar().day_of(now);
        let at_risk = record.state == StreakState::Active
            && record.snapshot.current_streak > 0
            && record
                .snapshot
                .last_workout_date
                .is_some_and(|last| self.calculator.is_at_risk(last, today));

        if !at_risk || record.reminded_on == Some(today) {
            return Ok((broken, false));
        }

        let current_streak = record.snapshot.current_streak;
        if let NotificationStatus::Failed { error, .. } =
            self.send(NotificationRequest::reminder(user.clone(), current_streak, now))
        {
            return Err(StreakError::dependency(error));
        }

        self.with_retries(user, || {
            let Some(mut latest) = self.store.load_streak(user)? else {
                return Ok(());
            };
            let expected = latest.version;
            latest.reminded_on = Some(today);
            self.store.save_streak(user, &latest, Some(expected), None)?;
            Ok(())
        })?;

        info!(user_id = %user, current_streak, "At-risk reminder sent");
        self.audit(AuditEventType::ReminderSent {
            user_id: user.clone(),
            current_streak,
        });

        Ok((broken, true))
    }

    fn transition(
        &self,
        previous: Option<&StoredStreak>,
        today: CalendarDay,
        state: StreakState,
        current: u32,
    ) -> StreakTransition {
        let Some(prev) = previous else {
            return if state == StreakState::Active {
                StreakTransition::Started
            } else {
                StreakTransition::Unchanged
            };
        };

        // The stored state may be stale: re-check it against today
        let was_alive = prev.state == StreakState::Active
            && prev.snapshot.current_streak > 0
            && prev
                .snapshot
                .last_workout_date
                .is_some_and(|last| self.calculator.is_alive(last, today));

        match state {
            StreakState::Active if prev.state == StreakState::NoHistory => {
                StreakTransition::Started
            }
            StreakState::Active if !was_alive => StreakTransition::Restarted,
            StreakState::Active if current > prev.snapshot.current_streak => {
                StreakTransition::Extended
            }
            StreakState::Broken if prev.state == StreakState::Active => StreakTransition::Broken,
            _ => StreakTransition::Unchanged,
        }
    }

    fn badge_earned(
        &self,
        user: &UserId,
        badge: &Badge,
        now: DateTime<Utc>,
    ) -> NotificationStatus {
        info!(
            user_id = %user,
            threshold = badge.threshold,
            label = %badge.label,
            "Badge earned"
        );
        self.audit(AuditEventType::BadgeAwarded {
            user_id: user.clone(),
            threshold: badge.threshold,
            label: badge.label.clone(),
        });
        self.send(NotificationRequest::milestone(user.clone(), badge, now))
    }

    fn streak_broken(
        &self,
        user: &UserId,
        previous_streak: u32,
        now: DateTime<Utc>,
    ) -> NotificationStatus {
        info!(user_id = %user, previous_streak, "Streak broken");
        self.audit(AuditEventType::StreakBroken {
            user_id: user.clone(),
            previous_streak,
        });
        self.send(NotificationRequest::broken(user.clone(), previous_streak, now))
    }

    /// Best-effort delivery; failures are logged and reported, never rolled back
    fn send(&self, request: NotificationRequest) -> NotificationStatus {
        match self.notifier.notify(&request) {
            Ok(()) => {
                debug!(
                    user_id = %request.user_id,
                    notification_id = %request.id,
                    kind = %request.kind,
                    "Notification sent"
                );
                NotificationStatus::Sent {
                    id: request.id,
                    kind: request.kind,
                }
            }
            Err(e) => {
                warn!(
                    user_id = %request.user_id,
                    kind = %request.kind,
                    error = %e,
                    "Notification delivery failed"
                );
                NotificationStatus::Failed {
                    kind: request.kind,
                    error: e.to_string(),
                }
            }
        }
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event, self.clock.now())) {
            warn!(error = %e, "Failed to append audit event");
        }
    }

    /// Run `op`, reloading and retrying on version conflicts
    fn with_retries<T>(&self, user: &UserId, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            match op() {
                Err(e) if e.is_conflict() => {
                    debug!(user_id = %user, attempt, "Streak record changed concurrently, retrying");
                }
                other => return other,
            }
        }

        warn!(user_id = %user, attempts, "Giving up after repeated conflicts");
        Err(StreakError::TransientFailure {
            user: user.clone(),
            attempts,
        })
    }

    fn user_lock(&self, user: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self
            .user_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(user.clone()).or_default())
    }

    fn check_event(&self, event: &WorkoutEvent, now: DateTime<Utc>) -> Result<()> {
        event.validate()?;

        let day = self.calendar().day_of(event.timestamp);
        let today = self.calendar().day_of(now);
        if day > today {
            return Err(StreakError::validation(format!(
                "workout {} is dated {}, after today ({})",
                event.id, day, today
            )));
        }
        Ok(())
    }

    /// First instant of the trailing weekly window ending today
    fn window_start(&self, today: CalendarDay) -> DateTime<Utc> {
        self.calendar().start_of_day(today.add_days(1 - WEEK_DAYS))
    }
}

fn check_user(user: &UserId) -> Result<()> {
    if user.is_blank() {
        return Err(StreakError::validation("user id is empty"));
    }
    Ok(())
}

fn state_of(snapshot: &StreakSnapshot) -> StreakState {
    if !snapshot.has_history() {
        StreakState::NoHistory
    } else if snapshot.current_streak > 0 {
        StreakState::Active
    } else {
        StreakState::Broken
    }
}

fn computation_of(record: &StoredStreak) -> Computation {
    Computation {
        snapshot: record.snapshot.clone(),
        open_run: record.open_run,
    }
}

fn include_event(events: &mut Vec<WorkoutEvent>, event: &WorkoutEvent) {
    if !events.iter().any(|e| e.id == event.id) {
        events.push(event.clone());
    }
}
