mod config;
pub mod database;
pub mod migrations;

pub use config::{AllowanceSettings, Config, NotificationsConfig};
pub use database::Database;

use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::cooldown::CooldownState;
use crate::error::Result;

/// One logged cigarette as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only log of smoking events.
pub trait EventStore {
    /// Store a new entry. Never drops the write silently.
    fn append(&self, occurred_at: DateTime<Utc>) -> Result<LogEntry>;

    /// Entries with `start <= occurred_at <= end`, oldest first.
    fn query_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<LogEntry>>;

    /// The oldest stored entry, which marks the start of the program.
    fn earliest(&self) -> Result<Option<LogEntry>>;

    /// Remove every entry (and any persisted cooldown) in one step.
    fn clear_all(&self) -> Result<()>;

    /// Number of entries on the given local calendar day.
    fn count_on(&self, day: NaiveDate) -> Result<usize> {
        let (start, end) = local_day_bounds(day);
        Ok(self.query_between(start, end)?.len())
    }
}

/// Persistence for the cooldown so it survives restarts.
pub trait CooldownStore {
    fn load_cooldown(&self) -> Result<Option<CooldownState>>;
    fn save_cooldown(&self, state: &CooldownState) -> Result<()>;
}

/// `[00:00:00.000, 23:59:59.999]` of `day` in the local time zone, as UTC.
pub fn local_day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start_of_local_day(day);
    let end = day
        .succ_opt()
        .map(|next| start_of_local_day(next) - chrono::Duration::milliseconds(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start, end)
}

fn start_of_local_day(day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        // Midnight skipped by a DST jump; fall back to the UTC reading.
        .unwrap_or_else(|| Local.from_utc_datetime(&midnight))
        .with_timezone(&Utc)
}

/// Drop sub-millisecond precision, matching what the store keeps.
pub fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Returns the data directory, creating it if needed.
///
/// `STOPSMOKE_DATA_DIR` wins when set. Otherwise `~/.config/stopsmoke`, or
/// `~/.config/stopsmoke-dev` with `STOPSMOKE_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("STOPSMOKE_DATA_DIR") {
        Some(custom) => PathBuf::from(custom),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("STOPSMOKE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("stopsmoke-dev")
            } else {
                base_dir.join("stopsmoke")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
