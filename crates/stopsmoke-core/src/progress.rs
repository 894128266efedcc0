//! Smoked-versus-allowed aggregation.
//!
//! Everything here only reads from the [`EventStore`]; two calls without a
//! write in between return the same figures.

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::allowance::{current_allowance, total_allowed, AllowanceConfig};
use crate::error::{Result, ValidationError};
use crate::storage::{local_day_bounds, EventStore, LogEntry};

/// Longest window any report covers: ten years.
pub const MAX_WINDOW_WEEKS: u32 = 520;
const MAX_WINDOW_DAYS: i64 = MAX_WINDOW_WEEKS as i64 * 7;

/// Taper progress over a window of whole weeks ending now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_allowed: u64,
    pub total_smoked: u64,
    /// `total_allowed - total_smoked`, floored at zero.
    pub remaining_allowance: u64,
    pub over_allowance: bool,
}

/// Allowed and smoked counts for one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub allowed: u32,
    pub smoked: u64,
}

/// Build the snapshot for `[now - window_weeks * 7d, now]`.
///
/// The allowed total sums the taper allowance of each week in the window;
/// going over it is reported, not rejected.
///
/// # Errors
/// Fails on a window of zero or more than [`MAX_WINDOW_WEEKS`] weeks, or a
/// storage error.
pub fn snapshot<S: EventStore + ?Sized>(
    store: &S,
    config: &AllowanceConfig,
    window_weeks: u32,
    now: DateTime<Utc>,
) -> Result<ProgressSnapshot> {
    if window_weeks == 0 || window_weeks > MAX_WINDOW_WEEKS {
        return Err(ValidationError::InvalidValue {
            field: "window_weeks".into(),
            message: format!("must be between 1 and {MAX_WINDOW_WEEKS} weeks"),
        }
        .into());
    }

    let window_start = Duration::try_weeks(i64::from(window_weeks))
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| ValidationError::InvalidValue {
            field: "window_weeks".into(),
            message: "window reaches before the earliest representable date".into(),
        })?;
    let total_allowed = total_allowed(config, window_weeks);
    let total_smoked = store.query_between(window_start, now)?.len() as u64;

    Ok(ProgressSnapshot {
        window_start,
        window_end: now,
        total_allowed,
        total_smoked,
        remaining_allowance: total_allowed.saturating_sub(total_smoked),
        over_allowance: total_smoked > total_allowed,
    })
}

/// One [`DaySummary`] per local day from `from` to `to`, both included.
///
/// Each day's allowance is the taper allowance of the program week the day
/// starts in, counting from the first logged cigarette.
///
/// # Errors
/// Fails when `to` is before `from`, when the range spans more than
/// [`MAX_WINDOW_WEEKS`] weeks, or on a storage error.
pub fn daily_breakdown<S: EventStore + ?Sized>(
    store: &S,
    config: &AllowanceConfig,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DaySummary>> {
    if to < from {
        return Err(ValidationError::InvalidTimeRange {
            start: local_day_bounds(from).0,
            end: local_day_bounds(to).0,
        }
        .into());
    }
    if (to - from).num_days() >= MAX_WINDOW_DAYS {
        return Err(ValidationError::InvalidValue {
            field: "days".into(),
            message: format!("at most {MAX_WINDOW_DAYS} days per breakdown"),
        }
        .into());
    }

    let program_start = store.earliest()?.map(|entry| entry.occurred_at);
    from.iter_days()
        .take_while(|day| *day <= to)
        .map(|day| day_summary(store, config, program_start, day))
        .collect()
}

/// Today's figures in the local time zone.
///
/// # Errors
/// Fails on a storage error.
pub fn today<S: EventStore + ?Sized>(
    store: &S,
    config: &AllowanceConfig,
    now: DateTime<Utc>,
) -> Result<DaySummary> {
    let program_start = store.earliest()?.map(|entry| entry.occurred_at);
    let day = now.with_timezone(&Local).date_naive();
    let smoked = store.count_on(day)? as u64;
    Ok(DaySummary {
        date: day,
        allowed: current_allowance(config, program_start, now),
        smoked,
    })
}

/// Logged entries between two instants, oldest first.
///
/// # Errors
/// Fails when `end` is before `start` or on a storage error.
pub fn history<S: EventStore + ?Sized>(
    store: &S,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<LogEntry>> {
    if end < start {
        return Err(ValidationError::InvalidTimeRange { start, end }.into());
    }
    store.query_between(start, end)
}

fn day_summary<S: EventStore + ?Sized>(
    store: &S,
    config: &AllowanceConfig,
    program_start: Option<DateTime<Utc>>,
    day: NaiveDate,
) -> Result<DaySummary> {
    let (day_start, _) = local_day_bounds(day);
    Ok(DaySummary {
        date: day,
        allowed: current_allowance(config, program_start, day_start),
        smoked: store.count_on(day)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::storage::Database;

    fn config(base: u32, reduction: u32) -> AllowanceConfig {
        AllowanceConfig::new(base, reduction).unwrap()
    }

    #[test]
    fn snapshot_sums_weekly_allowance() {
        let db = Database::open_memory().unwrap();
        let snap = snapshot(&db, &config(20, 3), 4, Utc::now()).unwrap();
        assert_eq!(snap.total_allowed, 62);
        assert_eq!(snap.total_smoked, 0);
        assert_eq!(snap.remaining_allowance, 62);
        assert!(!snap.over_allowance);
        assert_eq!(snap.window_end - snap.window_start, Duration::days(28));
    }

    #[test]
    fn snapshot_counts_only_the_window() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        db.append(now - Duration::days(29)).unwrap();
        db.append(now - Duration::days(27)).unwrap();
        db.append(now - Duration::minutes(1)).unwrap();
        db.append(now).unwrap();

        let snap = snapshot(&db, &config(20, 1), 4, now).unwrap();
        assert_eq!(snap.total_smoked, 3);
    }

    #[test]
    fn snapshot_reports_overage() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        for minutes in 0..5 {
            db.append(now - Duration::minutes(minutes)).unwrap();
        }
        let snap = snapshot(&db, &config(2, 1), 2, now).unwrap();
        assert_eq!(snap.total_allowed, 3);
        assert_eq!(snap.total_smoked, 5);
        assert_eq!(snap.remaining_allowance, 0);
        assert!(snap.over_allowance);
    }

    #[test]
    fn snapshot_is_repeatable() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        db.append(now - Duration::hours(3)).unwrap();
        let first = snapshot(&db, &config(20, 1), 4, now).unwrap();
        let second = snapshot(&db, &config(20, 1), 4, now).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_week_window_is_rejected() {
        let db = Database::open_memory().unwrap();
        assert!(snapshot(&db, &config(20, 1), 0, Utc::now()).is_err());
    }

    #[test]
    fn oversized_window_is_rejected_not_panicking() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        for weeks in [MAX_WINDOW_WEEKS + 1, 20_000_000, u32::MAX] {
            let err = snapshot(&db, &config(20, 1), weeks, now).unwrap_err();
            assert!(matches!(
                err,
                CoreError::Validation(ValidationError::InvalidValue { .. })
            ));
        }
        let widest = snapshot(&db, &config(20, 1), MAX_WINDOW_WEEKS, now).unwrap();
        assert_eq!(widest.total_allowed, 210);
    }

    #[test]
    fn oversized_breakdown_is_rejected() {
        let db = Database::open_memory().unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let from = to - Duration::days(MAX_WINDOW_DAYS);
        assert!(daily_breakdown(&db, &config(20, 1), from, to).is_err());
        assert!(daily_breakdown(&db, &config(20, 1), NaiveDate::MIN, NaiveDate::MAX).is_err());
    }

    #[test]
    fn breakdown_covers_each_day_inclusive() {
        let db = Database::open_memory().unwrap();
        let from = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let (may_2, _) = local_day_bounds(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        db.append(may_2 + Duration::hours(9)).unwrap();
        db.append(may_2 + Duration::hours(13)).unwrap();

        let days = daily_breakdown(&db, &config(10, 2), from, to).unwrap();
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].smoked, 0);
        assert_eq!(days[1].smoked, 2);
        assert_eq!(days[2].smoked, 0);
        assert!(days.iter().all(|d| d.allowed == 10));
    }

    #[test]
    fn breakdown_follows_taper_from_first_log() {
        let db = Database::open_memory().unwrap();
        let start_day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let (start, _) = local_day_bounds(start_day);
        db.append(start + Duration::hours(8)).unwrap();

        let to = start_day + Duration::days(15);
        let days = daily_breakdown(&db, &config(10, 2), start_day, to).unwrap();
        assert_eq!(days.first().map(|d| d.allowed), Some(10));
        // Day 8 starts after one full week of the program.
        assert_eq!(days[8].allowed, 8);
        assert_eq!(days[15].allowed, 6);
    }

    #[test]
    fn breakdown_rejects_inverted_range() {
        let db = Database::open_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let earlier = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(daily_breakdown(&db, &config(10, 2), day, earlier).is_err());
    }

    #[test]
    fn history_rejects_inverted_range() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        assert!(history(&db, now, now - Duration::seconds(1)).is_err());
        assert!(history(&db, now, now).unwrap().is_empty());
    }
}
