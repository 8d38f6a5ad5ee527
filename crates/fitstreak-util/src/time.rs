//! Clock and calendar adapter for fitstreak
//!
//! Streak math only ever looks at calendar days. This module supplies the
//! two pieces it needs from the outside world:
//! - [`Clock`]: an injected source of "now" (never read inside the calculator)
//! - [`Calendar`]: deterministic truncation of instants to calendar days in a
//!   fixed, per-deployment UTC offset
//!
//! # Mock Time for Development
//!
//! In debug builds, the `FITSTREAK_MOCK_TIME` environment variable can be set
//! to override the time returned by [`SystemClock`]. The mock time advances
//! at the same rate as real time.
//!
//! Format: `YYYY-MM-DD HH:MM:SS`, interpreted as UTC (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! FITSTREAK_MOCK_TIME="2025-12-25 14:30:00" fitstreak status alice
//! ```

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, OnceLock};

use crate::{Result, StreakError};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "FITSTREAK_MOCK_TIME";

/// Format accepted by the mock time override
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Largest UTC offset accepted by [`Calendar::new`], in minutes
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Cached mock time offset from the real time when the process started.
static MOCK_TIME_OFFSET: OnceLock<Option<Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Utc::now()
fn get_mock_time_offset() -> Option<Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT) {
                    Ok(naive_dt) => {
                        let mock_dt = Utc.from_utc_datetime(&naive_dt);
                        let offset = mock_dt.signed_duration_since(Utc::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = MOCK_TIME_FORMAT,
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time, respecting the mock time override in debug builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
    fn now(&self) -> DateTime<Utc> {
        let real_now = Utc::now();

        if let Some(offset) = get_mock_time_offset() {
            real_now + offset
        } else {
            real_now
        }
    }
}

/// Settable clock for deterministic tests and replays
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A calendar day in the deployment's reference timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarDay(NaiveDate);

impl CalendarDay {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// Day offset by a signed number of days. Saturates at chrono's date range.
    pub fn add_days(&self, days: i64) -> Self {
        self.0
            .checked_add_signed(Duration::days(days))
            .map(Self)
            .unwrap_or(*self)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }
}

impl fmt::Display for CalendarDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Timezone-fixed day bucketing.
///
/// Two instants on the same local calendar day always map to the same
/// [`CalendarDay`], regardless of time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Calendar {
    /// Calendar in a fixed offset from UTC, in minutes (east positive)
    pub fn new(utc_offset_minutes: i32) -> Result<Self> {
        if utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(StreakError::config(format!(
                "UTC offset {} minutes is outside +/-{}",
                utc_offset_minutes, MAX_UTC_OFFSET_MINUTES
            )));
        }

        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            StreakError::config(format!("invalid UTC offset: {} minutes", utc_offset_minutes))
        })?;

        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Calendar day containing `timestamp`
    pub fn day_of(&self, timestamp: DateTime<Utc>) -> CalendarDay {
        CalendarDay(timestamp.with_timezone(&self.offset).date_naive())
    }

    /// Signed difference `a - b` in whole calendar days
    pub fn days_between(&self, a: CalendarDay, b: CalendarDay) -> i64 {
        a.0.signed_duration_since(b.0).num_days()
    }

    /// First instant of `day`, expressed in UTC
    pub fn start_of_day(&self, day: CalendarDay) -> DateTime<Utc> {
        let midnight = day.0.and_hms_opt(0, 0, 0).unwrap_or_default();
        self.offset
            .from_local_datetime(&midnight)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    }

    /// Today, according to `clock`
    pub fn today(&self, clock: &dyn Clock) -> CalendarDay {
        self.day_of(clock.now())
    }
}

impl Default for Calendar {
    fn default() -> Self {
        Self::utc()
    }
}

/// Parse an RFC 3339 timestamp into a UTC instant
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StreakError::validation(format!("unparseable timestamp '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn same_day_maps_to_same_calendar_day() {
        let cal = Calendar::utc();
        let morning = cal.day_of(utc(2025, 6, 15, 0, 5));
        let night = cal.day_of(utc(2025, 6, 15, 23, 55));
        assert_eq!(morning, night);
        assert_eq!(morning, CalendarDay::from_ymd(2025, 6, 15).unwrap());
    }

    #[test]
    fn offset_shifts_day_boundary() {
        // 23:30 UTC is already the next day at UTC+02:00
        let cal = Calendar::new(120).unwrap();
        let day = cal.day_of(utc(2025, 6, 15, 23, 30));
        assert_eq!(day, CalendarDay::from_ymd(2025, 6, 16).unwrap());

        // and still the previous day at UTC-05:00 for an early UTC instant
        let cal = Calendar::new(-300).unwrap();
        let day = cal.day_of(utc(2025, 6, 15, 3, 0));
        assert_eq!(day, CalendarDay::from_ymd(2025, 6, 14).unwrap());
    }

    #[test]
    fn days_between_is_signed() {
        let cal = Calendar::utc();
        let a = CalendarDay::from_ymd(2025, 6, 15).unwrap();
        let b = CalendarDay::from_ymd(2025, 6, 12).unwrap();
        assert_eq!(cal.days_between(a, b), 3);
        assert_eq!(cal.days_between(b, a), -3);
        assert_eq!(cal.days_between(a, a), 0);
    }

    #[test]
    fn days_between_ignores_time_of_day() {
        // 00:01 is one calendar day after 23:59 the night before
        let cal = Calendar::utc();
        let late = cal.day_of(utc(2025, 6, 14, 23, 59));
        let early = cal.day_of(utc(2025, 6, 15, 0, 1));
        assert_eq!(cal.days_between(early, late), 1);
    }

    #[test]
    fn start_of_day_round_trips() {
        let cal = Calendar::new(90).unwrap();
        let day = CalendarDay::from_ymd(2025, 3, 1).unwrap();
        let start = cal.start_of_day(day);
        assert_eq!(cal.day_of(start), day);
        assert_eq!(cal.day_of(start - Duration::seconds(1)), day.add_days(-1));
    }

    #[test]
    fn reject_out_of_range_offset() {
        assert!(Calendar::new(MAX_UTC_OFFSET_MINUTES).is_ok());
        assert!(Calendar::new(MAX_UTC_OFFSET_MINUTES + 1).is_err());
        assert!(Calendar::new(-MAX_UTC_OFFSET_MINUTES - 1).is_err());
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(utc(2025, 6, 15, 12, 0));
        assert_eq!(clock.now(), utc(2025, 6, 15, 12, 0));

        clock.advance(Duration::days(2));
        assert_eq!(clock.now(), utc(2025, 6, 17, 12, 0));

        clock.set(utc(2025, 1, 1, 0, 0));
        assert_eq!(Calendar::utc().today(&clock), CalendarDay::from_ymd(2025, 1, 1).unwrap());
    }

    #[test]
    fn system_clock_returns_time() {
        let t = SystemClock.now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn parse_rfc3339_timestamps() {
        let ts = parse_timestamp("2025-06-15T08:30:00+02:00").unwrap();
        assert_eq!(ts, utc(2025, 6, 15, 6, 30));

        assert!(parse_timestamp("2025-06-15").is_err());
        assert!(parse_timestamp("yesterday").is_err());
        assert!(matches!(
            parse_timestamp(""),
            Err(StreakError::ValidationError(_))
        ));
    }

    #[test]
    fn parse_mock_time_format() {
        let valid = ["2025-12-25 14:30:00", "2025-01-01 00:00:00"];
        for s in &valid {
            assert!(NaiveDateTime::parse_from_str(s, MOCK_TIME_FORMAT).is_ok());
        }

        let invalid = ["2025-12-25", "2025-12-25T14:30:00", "not a date"];
        for s in &invalid {
            assert!(NaiveDateTime::parse_from_str(s, MOCK_TIME_FORMAT).is_err());
        }
    }

    #[test]
    fn calendar_day_display() {
        let day = CalendarDay::from_ymd(2025, 2, 3).unwrap();
        assert_eq!(day.to_string(), "2025-02-03");
        assert_eq!(day.add_days(-3).to_string(), "2025-01-31");
    }
}
