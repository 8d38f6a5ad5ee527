//! Integration tests for fitstreak
//!
//! These exercise the engine end to end against an on-disk store, the way
//! separate CLI invocations share one database.

use chrono::{DateTime, Duration, TimeZone, Utc};
use fitstreak_api::{NotificationKind, StreakState, WorkoutEvent};
use fitstreak_config::{RecomputeStrategy, StreakPolicy, parse_config};
use fitstreak_core::{StreakEngine, StreakTransition};
use fitstreak_notify::MockNotifier;
use fitstreak_store::{AuditEventType, SqliteStore, Store};
use fitstreak_util::{Clock, DATABASE_FILENAME, FixedClock, UserId};
use std::path::Path;
use std::sync::Arc;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 7, 30, 0).unwrap()
}

fn make_test_policy() -> StreakPolicy {
    parse_config(
        r#"
        config_version = 1

        [streak]
        weekly_goal = 4
        grace_days = 1.5
        milestone_thresholds = [3, 7]

        [[badges]]
        threshold = 3
        label = "Hat Trick"
        "#,
    )
    .unwrap()
}

fn open_engine(
    db: &Path,
    policy: &StreakPolicy,
    clock: &Arc<FixedClock>,
    notifier: &MockNotifier,
) -> (StreakEngine, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open(db).unwrap());
    let engine = StreakEngine::new(
        policy,
        store.clone(),
        Arc::new(notifier.clone()),
        clock.clone(),
    )
    .unwrap();
    (engine, store)
}

#[test]
fn test_streak_lifecycle_across_processes() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join(DATABASE_FILENAME);
    let policy = make_test_policy();
    let clock = Arc::new(FixedClock::new(start()));
    let notifier = MockNotifier::new();
    let alice = UserId::new("alice");

    // Three days in a row, each logged by a fresh engine on the same file
    for _ in 0..3 {
        let (engine, _) = open_engine(&db, &policy, &clock, &notifier);
        engine
            .record_workout(&WorkoutEvent::new("alice", clock.now()))
            .unwrap();
        clock.advance(Duration::days(1));
    }

    let milestones = notifier.sent_of(NotificationKind::Milestone);
    assert_eq!(milestones.len(), 1);
    assert_eq!(milestones[0].payload["badge"], "Hat Trick");

    // Day 4, no workout yet: still alive, and at risk
    let (engine, store) = open_engine(&db, &policy, &clock, &notifier);
    let snapshot = engine.snapshot(&alice).unwrap();
    assert_eq!(snapshot.current_streak, 3);
    assert_eq!(snapshot.weekly_progress, 3);
    assert_eq!(snapshot.weekly_goal, 4);
    assert!(!snapshot.weekly_goal_met());
    assert_eq!(snapshot.next_milestone, 7);

    let report = engine.sweep().unwrap();
    assert_eq!(report.reminded, 1);
    assert_eq!(notifier.sent_of(NotificationKind::Reminder).len(), 1);

    // Day 5: the grace window has lapsed
    clock.advance(Duration::days(1));
    let (engine, _) = open_engine(&db, &policy, &clock, &notifier);
    let refreshed = engine.refresh(&alice).unwrap();
    assert_eq!(refreshed.transition, StreakTransition::Broken);
    assert_eq!(refreshed.snapshot.current_streak, 0);
    assert_eq!(refreshed.snapshot.longest_streak, 3);
    assert_eq!(notifier.sent_of(NotificationKind::Broken).len(), 1);

    let stored = store.load_streak(&alice).unwrap().unwrap();
    assert_eq!(stored.state, StreakState::Broken);

    let audits = store.get_recent_audits(100).unwrap();
    assert!(audits.iter().any(|a| matches!(
        &a.event,
        AuditEventType::BadgeAwarded { threshold: 3, .. }
    )));
    assert!(audits.iter().any(|a| matches!(
        &a.event,
        AuditEventType::StreakBroken { previous_streak: 3, .. }
    )));
    assert!(
        audits
            .iter()
            .any(|a| matches!(&a.event, AuditEventType::ReminderSent { .. }))
    );
}

#[test]
fn test_two_engines_share_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join(DATABASE_FILENAME);
    let policy = make_test_policy();
    let clock = Arc::new(FixedClock::new(start()));
    let notifier = MockNotifier::new();

    let (first, store) = open_engine(&db, &policy, &clock, &notifier);
    let (second, _) = open_engine(&db, &policy, &clock, &notifier);

    for day in 0..7 {
        let engine = if day % 2 == 0 { &first } else { &second };
        engine
            .record_workout(&WorkoutEvent::new("bob", clock.now()))
            .unwrap();
        if day < 6 {
            clock.advance(Duration::days(1));
        }
    }

    let bob = UserId::new("bob");
    assert_eq!(first.snapshot(&bob).unwrap(), second.snapshot(&bob).unwrap());
    assert_eq!(first.snapshot(&bob).unwrap().current_streak, 7);
    assert_eq!(store.awarded_badges(&bob).unwrap(), vec![3, 7]);

    let thresholds: Vec<u64> = notifier
        .sent_of(NotificationKind::Milestone)
        .iter()
        .map(|r| r.payload["threshold"].as_u64().unwrap())
        .collect();
    assert_eq!(thresholds, vec![3, 7]);
}

#[test]
fn test_backfill_then_delete() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join(DATABASE_FILENAME);
    let policy = StreakPolicy {
        strategy: RecomputeStrategy::Incremental,
        ..make_test_policy()
    };
    let clock = Arc::new(FixedClock::new(start()));
    let notifier = MockNotifier::new();
    let (engine, store) = open_engine(&db, &policy, &clock, &notifier);
    let carol = UserId::new("carol");

    // Logged today, then backfilled for the two previous days
    engine
        .record_workout(&WorkoutEvent::new("carol", clock.now()))
        .unwrap();
    let two_days_ago = WorkoutEvent::new("carol", clock.now() - Duration::days(2));
    engine.record_workout(&two_days_ago).unwrap();
    let outcome = engine
        .record_workout(&WorkoutEvent::new("carol", clock.now() - Duration::days(1)))
        .unwrap();
    assert_eq!(outcome.snapshot.current_streak, 3);
    assert_eq!(outcome.triggered_badge.unwrap().threshold, 3);

    let snapshot = engine.delete_workout(&carol, &two_days_ago.id).unwrap();
    assert_eq!(snapshot.current_streak, 2);
    assert_eq!(store.list_workout_events(&carol).unwrap().len(), 2);

    // The badge stays signalled; rebuilding past 3 does not fire it again
    engine
        .record_workout(&WorkoutEvent::new("carol", clock.now() - Duration::days(2)))
        .unwrap();
    assert_eq!(notifier.sent_of(NotificationKind::Milestone).len(), 1);
    assert_eq!(store.awarded_badges(&carol).unwrap(), vec![3]);
}

#[test]
fn test_reject_future_workout() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join(DATABASE_FILENAME);
    let clock = Arc::new(FixedClock::new(start()));
    let notifier = MockNotifier::new();
    let (engine, store) = open_engine(&db, &StreakPolicy::default(), &clock, &notifier);

    let event = WorkoutEvent::parse("dave", "2025-03-04T07:30:00Z").unwrap();
    assert!(engine.record_workout(&event).is_err());
    assert!(store.list_users().unwrap().is_empty());

    assert!(WorkoutEvent::parse("dave", "last tuesday").is_err());
    assert!(WorkoutEvent::parse("", "2025-03-03T07:30:00Z").is_err());
}
