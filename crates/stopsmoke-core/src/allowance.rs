//! Taper schedule and cooldown arithmetic.
//!
//! Everything here is a pure function of an [`AllowanceConfig`] and a point
//! in time. The allowance for week `n` of the program is
//! `max(base - reduction * n, 0)`, and the cooldown between two cigarettes is
//! the day split evenly across the allowance, in whole minutes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Daily allowance used when nothing (or something invalid) is configured.
pub const DEFAULT_DAILY_ALLOWANCE: u32 = 20;

/// Weekly reduction used when nothing (or something invalid) is configured.
pub const DEFAULT_WEEKLY_REDUCTION: u32 = 1;

const MINUTES_PER_DAY: i64 = 24 * 60;
const DAYS_PER_WEEK: i64 = 7;

/// Validated taper settings. Both fields are always > 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceConfig {
    daily_allowance_base: u32,
    weekly_reduction: u32,
}

impl AllowanceConfig {
    /// Build a config, rejecting zero values.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming the offending key.
    pub fn new(daily_allowance_base: u32, weekly_reduction: u32) -> Result<Self, ConfigError> {
        if daily_allowance_base == 0 {
            return Err(ConfigError::InvalidValue {
                key: "allowance.daily_allowance_base".into(),
                message: "must be a positive integer".into(),
            });
        }
        if weekly_reduction == 0 {
            return Err(ConfigError::InvalidValue {
                key: "allowance.weekly_reduction".into(),
                message: "must be a positive integer".into(),
            });
        }
        Ok(Self {
            daily_allowance_base,
            weekly_reduction,
        })
    }

    /// Build a config from raw settings values, replacing anything
    /// non-positive with the documented default.
    pub fn coerced(daily_allowance_base: i64, weekly_reduction: i64) -> Self {
        let base = positive_or(daily_allowance_base, DEFAULT_DAILY_ALLOWANCE, "daily_allowance_base");
        let reduction = positive_or(weekly_reduction, DEFAULT_WEEKLY_REDUCTION, "weekly_reduction");
        Self {
            daily_allowance_base: base,
            weekly_reduction: reduction,
        }
    }

    pub fn daily_allowance_base(&self) -> u32 {
        self.daily_allowance_base
    }

    pub fn weekly_reduction(&self) -> u32 {
        self.weekly_reduction
    }
}

impl Default for AllowanceConfig {
    fn default() -> Self {
        Self {
            daily_allowance_base: DEFAULT_DAILY_ALLOWANCE,
            weekly_reduction: DEFAULT_WEEKLY_REDUCTION,
        }
    }
}

fn positive_or(value: i64, fallback: u32, key: &str) -> u32 {
    match u32::try_from(value) {
        Ok(v) if v > 0 => v,
        _ => {
            tracing::warn!(key, value, fallback, "non-positive allowance setting, using default");
            fallback
        }
    }
}

/// Allowed cigarettes per day during the given 0-based program week.
///
/// Non-increasing in `week_index` and never below zero.
pub fn allowed_for_week(config: &AllowanceConfig, week_index: u32) -> u32 {
    let reduction = u64::from(config.weekly_reduction) * u64::from(week_index);
    u64::from(config.daily_allowance_base)
        .saturating_sub(reduction)
        .try_into()
        .unwrap_or(0)
}

/// Sum of the weekly allowances for weeks `0..weeks`.
///
/// Closed form over the weeks before the taper reaches zero, saturating at
/// `u64::MAX`.
pub fn total_allowed(config: &AllowanceConfig, weeks: u32) -> u64 {
    let base = u128::from(config.daily_allowance_base);
    let reduction = u128::from(config.weekly_reduction);
    let positive_weeks = base.div_ceil(reduction).min(u128::from(weeks));
    let sum = positive_weeks * base - reduction * positive_weeks * positive_weeks.saturating_sub(1) / 2;
    u64::try_from(sum).unwrap_or(u64::MAX)
}

/// Minimum wait between two cigarettes for the given daily allowance.
///
/// `floor(1440 / allowance)` minutes, never shorter than one minute. A zero
/// allowance falls back to [`DEFAULT_DAILY_ALLOWANCE`].
pub fn cooldown_interval(allowance_per_day: u32) -> Duration {
    let allowance = if allowance_per_day == 0 {
        tracing::warn!(
            fallback = DEFAULT_DAILY_ALLOWANCE,
            "zero daily allowance, using default for cooldown"
        );
        DEFAULT_DAILY_ALLOWANCE
    } else {
        allowance_per_day
    };
    let minutes = (MINUTES_PER_DAY / i64::from(allowance)).max(1);
    Duration::minutes(minutes)
}

/// Whole weeks elapsed since `program_start`. Zero when `now` is not after it.
pub fn week_index(program_start: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let days = (now - program_start).num_days();
    if days <= 0 {
        return 0;
    }
    u32::try_from(days / DAYS_PER_WEEK).unwrap_or(u32::MAX)
}

/// Allowance in effect at `now` for a program that started at
/// `program_start` (week 0 when the program has not started).
pub fn current_allowance(
    config: &AllowanceConfig,
    program_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> u32 {
    let week = program_start.map(|start| week_index(start, now)).unwrap_or(0);
    allowed_for_week(config, week)
}

/// Cooldown after a cigarette logged at `now`.
///
/// Once the taper reaches zero the allowance is held at one a day, so the
/// wait only ever grows as the weeks pass.
pub fn taper_cooldown(
    config: &AllowanceConfig,
    program_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Duration {
    cooldown_interval(current_allowance(config, program_start, now).max(1))
}
