//! SQLite-based store implementation

use chrono::{DateTime, SecondsFormat, Utc};
use fitstreak_api::{Badge, WorkoutEvent};
use fitstreak_util::{UserId, WorkoutId};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{AuditEvent, AuditEventType, Store, StoreError, StoreResult, StoredStreak};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Workout history
            CREATE TABLE IF NOT EXISTS workouts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            -- Streak records (one row per user, versioned)
            CREATE TABLE IF NOT EXISTS streaks (
                user_id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                record_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Badges already signalled
            CREATE TABLE IF NOT EXISTS badges (
                user_id TEXT NOT NULL,
                threshold INTEGER NOT NULL,
                label TEXT NOT NULL,
                awarded_at TEXT NOT NULL,
                PRIMARY KEY (user_id, threshold)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_workouts_user_ts ON workouts(user_id, timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

/// Fixed-width UTC form so that text comparison orders like time
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str, what: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Malformed(format!("{what}: bad timestamp '{raw}': {e}")))
}

fn workout_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode_workouts(
    rows: impl Iterator<Item = rusqlite::Result<(String, String, String)>>,
) -> StoreResult<Vec<WorkoutEvent>> {
    let mut events = Vec::new();
    for row in rows {
        let (id, user_id, ts) = row?;
        let workout_id = WorkoutId::parse(&id)
            .ok_or_else(|| StoreError::Malformed(format!("workout id '{id}' is not a UUID")))?;
        let timestamp = decode_timestamp(&ts, &format!("workout {id}"))?;
        events.push(WorkoutEvent {
            id: workout_id,
            user_id: UserId::new(user_id),
            timestamp,
        });
    }
    Ok(events)
}

fn insert_workout(conn: &Connection, event: &WorkoutEvent) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO workouts (id, user_id, timestamp) VALUES (?, ?, ?)",
        params![
            event.id.to_string(),
            event.user_id.as_str(),
            encode_timestamp(event.timestamp)
        ],
    )?;
    Ok(())
}

/// Version check, upsert and optional badge award inside an open transaction
fn write_streak(
    tx: &Transaction<'_>,
    user: &UserId,
    record: &StoredStreak,
    expected_version: Option<u64>,
    award: Option<&Badge>,
) -> StoreResult<u64> {
    let found: Option<i64> = tx
        .query_row(
            "SELECT version FROM streaks WHERE user_id = ?",
            [user.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    let found = found.map(|v| v as u64);

    if found != expected_version {
        debug!(user_id = %user, ?expected_version, ?found, "Streak version conflict");
        return Err(StoreError::Conflict {
            user: user.clone(),
            expected: expected_version,
            found,
        });
    }

    let version = expected_version.map_or(1, |v| v + 1);
    let mut stored = record.clone();
    stored.version = version;
    let json = serde_json::to_string(&stored)?;

    tx.execute(
        "INSERT INTO streaks (user_id, version, record_json, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
            version = excluded.version,
            record_json = excluded.record_json,
            updated_at = excluded.updated_at",
        params![
            user.as_str(),
            version as i64,
            json,
            encode_timestamp(record.computed_at)
        ],
    )?;

    if let Some(badge) = award {
        tx.execute(
            "INSERT OR IGNORE INTO badges (user_id, threshold, label, awarded_at)
             VALUES (?, ?, ?, ?)",
            params![
                user.as_str(),
                badge.threshold,
                badge.label,
                encode_timestamp(record.computed_at)
            ],
        )?;
    }

    Ok(version)
}

impl Store for SqliteStore {
    fn append_workout(&self, event: &WorkoutEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        insert_workout(&conn, event)?;

        debug!(user_id = %event.user_id, workout_id = %event.id, "Workout appended");
        Ok(())
    }

    fn list_workout_events(&self, user: &UserId) -> StoreResult<Vec<WorkoutEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, timestamp FROM workouts WHERE user_id = ? ORDER BY timestamp",
        )?;
        let rows = stmt.query_map([user.as_str()], workout_row)?;
        decode_workouts(rows)
    }

    fn list_workout_events_since(
        &self,
        user: &UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<WorkoutEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, timestamp FROM workouts
             WHERE user_id = ? AND timestamp >= ? ORDER BY timestamp",
        )?;
        let rows = stmt.query_map(params![user.as_str(), encode_timestamp(since)], workout_row)?;
        decode_workouts(rows)
    }

    fn delete_workout(&self, user: &UserId, id: &WorkoutId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM workouts WHERE user_id = ? AND id = ?",
            params![user.as_str(), id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    fn load_streak(&self, user: &UserId) -> StoreResult<Option<StoredStreak>> {
        let conn = self.conn()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT version, record_json FROM streaks WHERE user_id = ?",
                [user.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((version, json)) => {
                let mut record: StoredStreak = serde_json::from_str(&json)?;
                record.version = version as u64;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn save_streak(
        &self,
        user: &UserId,
        record: &StoredStreak,
        expected_version: Option<u64>,
        award: Option<&Badge>,
    ) -> StoreResult<u64> {
        let mut conn = self.conn()?;
        // Take the write lock up front so other processes wait on busy_timeout
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let version = write_streak(&tx, user, record, expected_version, award)?;
        tx.commit()?;

        debug!(user_id = %user, version, "Streak saved");
        Ok(version)
    }

    fn commit_workout(
        &self,
        event: &WorkoutEvent,
        record: &StoredStreak,
        expected_version: Option<u64>,
        award: Option<&Badge>,
    ) -> StoreResult<u64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_workout(&tx, event)?;
        let version = write_streak(&tx, &event.user_id, record, expected_version, award)?;
        tx.commit()?;

        debug!(
            user_id = %event.user_id,
            workout_id = %event.id,
            version,
            "Workout committed"
        );
        Ok(version)
    }

    fn list_users(&self) -> StoreResult<Vec<UserId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id FROM workouts
             UNION
             SELECT user_id FROM streaks
             ORDER BY user_id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(UserId::new(row?));
        }
        Ok(users)
    }

    fn awarded_badges(&self, user: &UserId) -> StoreResult<Vec<u32>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT threshold FROM badges WHERE user_id = ? ORDER BY threshold")?;
        let rows = stmt.query_map([user.as_str()], |row| row.get::<_, u32>(0))?;

        let mut thresholds = Vec::new();
        for row in rows {
            thresholds.push(row?);
        }
        Ok(thresholds)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![encode_timestamp(event.timestamp), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = decode_timestamp(&timestamp_str, &format!("audit event {id}"))?;
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fitstreak_api::{StreakSnapshot, StreakState};
    use fitstreak_util::CalendarDay;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn record(current: u32) -> StoredStreak {
        StoredStreak {
            snapshot: StreakSnapshot {
                current_streak: current,
                longest_streak: current,
                last_workout_date: CalendarDay::from_ymd(2025, 6, 15),
                weekly_progress: current.min(7),
                weekly_goal: 3,
                next_milestone: 7,
            },
            open_run: current,
            state: StreakState::Active,
            computed_at: ts(2025, 6, 15, 20),
            reminded_on: None,
            version: 0,
        }
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        let event = AuditEvent::new(
            AuditEventType::ReminderSent {
                user_id: UserId::new("alice"),
                current_streak: 4,
            },
            ts(2025, 6, 15, 20),
        );
        store.append_audit(event).unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, ts(2025, 6, 15, 20));
        assert!(matches!(
            events[0].event,
            AuditEventType::ReminderSent { current_streak: 4, .. }
        ));
    }

    #[test]
    fn test_workout_history() {
        let store = SqliteStore::in_memory().unwrap();
        let alice = UserId::new("alice");

        let late = WorkoutEvent::new("alice", ts(2025, 6, 15, 7));
        let early = WorkoutEvent::new("alice", ts(2025, 6, 10, 7));
        let other = WorkoutEvent::new("bob", ts(2025, 6, 12, 7));
        store.append_workout(&late).unwrap();
        store.append_workout(&early).unwrap();
        store.append_workout(&other).unwrap();

        let events = store.list_workout_events(&alice).unwrap();
        assert_eq!(events, vec![early.clone(), late.clone()]);

        let recent = store
            .list_workout_events_since(&alice, ts(2025, 6, 12, 0))
            .unwrap();
        assert_eq!(recent, vec![late.clone()]);

        assert!(store.delete_workout(&alice, &late.id).unwrap());
        assert!(!store.delete_workout(&alice, &late.id).unwrap());
        // Deleting another user's workout through the wrong user is a no-op
        assert!(!store.delete_workout(&alice, &other.id).unwrap());
        assert_eq!(store.list_workout_events(&alice).unwrap(), vec![early]);
    }

    #[test]
    fn test_duplicate_workout_id_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        let event = WorkoutEvent::new("alice", ts(2025, 6, 15, 7));
        store.append_workout(&event).unwrap();
        assert!(matches!(
            store.append_workout(&event),
            Err(StoreError::Database(_))
        ));
    }

    #[test]
    fn test_malformed_timestamp_row() {
        let store = SqliteStore::in_memory().unwrap();
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "INSERT INTO workouts (id, user_id, timestamp) VALUES (?, 'alice', 'yesterday')",
                [WorkoutId::new().to_string()],
            )
            .unwrap();
        }

        let result = store.list_workout_events(&UserId::new("alice"));
        assert!(matches!(result, Err(StoreError::Malformed(_))));
    }

    #[test]
    fn test_streak_compare_and_swap() {
        let store = SqliteStore::in_memory().unwrap();
        let alice = UserId::new("alice");

        assert!(store.load_streak(&alice).unwrap().is_none());

        // Create
        let v1 = store.save_streak(&alice, &record(1), None, None).unwrap();
        assert_eq!(v1, 1);

        // Creating again must conflict
        let err = store.save_streak(&alice, &record(1), None, None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { expected: None, found: Some(1), .. }
        ));

        // Update from the right version
        let v2 = store.save_streak(&alice, &record(2), Some(1), None).unwrap();
        assert_eq!(v2, 2);

        // Stale version conflicts and leaves the record untouched
        assert!(store.save_streak(&alice, &record(9), Some(1), None).is_err());

        let loaded = store.load_streak(&alice).unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.snapshot.current_streak, 2);
        assert_eq!(loaded.open_run, 2);
    }

    #[test]
    fn test_badge_recorded_with_streak() {
        let store = SqliteStore::in_memory().unwrap();
        let alice = UserId::new("alice");
        let badge = Badge::with_default_label(7);

        store
            .save_streak(&alice, &record(7), None, Some(&badge))
            .unwrap();
        assert_eq!(store.awarded_badges(&alice).unwrap(), vec![7]);

        // Conflicting save must not record its badge
        let thirty = Badge::with_default_label(30);
        assert!(
            store
                .save_streak(&alice, &record(30), Some(5), Some(&thirty))
                .is_err()
        );
        assert_eq!(store.awarded_badges(&alice).unwrap(), vec![7]);

        // Re-awarding is idempotent
        store
            .save_streak(&alice, &record(7), Some(1), Some(&badge))
            .unwrap();
        assert_eq!(store.awarded_badges(&alice).unwrap(), vec![7]);
    }

    #[test]
    fn test_commit_workout_is_atomic() {
        let store = SqliteStore::in_memory().unwrap();
        let alice = UserId::new("alice");
        let first = WorkoutEvent::new("alice", ts(2025, 6, 14, 7));
        let badge = Badge::with_default_label(7);

        let v1 = store
            .commit_workout(&first, &record(7), None, Some(&badge))
            .unwrap();
        assert_eq!(v1, 1);
        assert_eq!(store.list_workout_events(&alice).unwrap(), vec![first]);
        assert_eq!(store.awarded_badges(&alice).unwrap(), vec![7]);

        // A stale version rolls back the workout row too
        let second = WorkoutEvent::new("alice", ts(2025, 6, 15, 7));
        let err = store
            .commit_workout(&second, &record(8), None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.list_workout_events(&alice).unwrap().len(), 1);
        assert_eq!(store.load_streak(&alice).unwrap().unwrap().version, 1);

        // A duplicate workout id leaves the record untouched
        assert!(
            store
                .commit_workout(&second, &record(8), Some(1), None)
                .is_ok()
        );
        assert!(matches!(
            store.commit_workout(&second, &record(9), Some(2), None),
            Err(StoreError::Database(_))
        ));
        let loaded = store.load_streak(&alice).unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.snapshot.current_streak, 8);
    }

    #[test]
    fn test_list_users() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .append_workout(&WorkoutEvent::new("carol", ts(2025, 6, 15, 7)))
            .unwrap();
        store
            .save_streak(&UserId::new("alice"), &record(1), None, None)
            .unwrap();
        store
            .append_workout(&WorkoutEvent::new("alice", ts(2025, 6, 15, 7)))
            .unwrap();

        let users = store.list_users().unwrap();
        assert_eq!(users, vec![UserId::new("alice"), UserId::new("carol")]);
    }

    #[test]
    fn test_reopen_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fitstreak.db");
        let alice = UserId::new("alice");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .append_workout(&WorkoutEvent::new("alice", ts(2025, 6, 15, 7)))
                .unwrap();
            store.save_streak(&alice, &record(1), None, None).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_workout_events(&alice).unwrap().len(), 1);
        assert_eq!(store.load_streak(&alice).unwrap().unwrap().version, 1);
    }
}
