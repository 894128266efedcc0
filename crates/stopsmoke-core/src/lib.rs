//! # StopSmoke Core Library
//!
//! Core logic for tapering off cigarettes: every cigarette is logged, a
//! cooldown derived from the daily allowance gates the next one, and the
//! allowance shrinks week by week. The CLI binary is a thin layer over this
//! crate.
//!
//! ## Architecture
//!
//! - **Allowance**: pure taper arithmetic (weekly allowance, cooldown interval)
//! - **Cooldown**: wall-clock state machine plus a single-shot expiry task
//! - **Storage**: SQLite log store and TOML-based configuration
//! - **Progress**: read-only smoked-versus-allowed aggregation
//! - **Tracker**: the service that ties them together and publishes [`Event`]s
//!
//! ## Key Components
//!
//! - [`Tracker`]: log, query and reset entry point
//! - [`Database`]: log persistence
//! - [`Config`]: application configuration management

pub mod allowance;
pub mod cooldown;
pub mod error;
pub mod events;
pub mod progress;
pub mod storage;
pub mod tracker;

pub use allowance::{allowed_for_week, cooldown_interval, taper_cooldown, AllowanceConfig};
pub use cooldown::{CooldownMachine, CooldownPhase, CooldownState};
pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use events::Event;
pub use progress::{DaySummary, ProgressSnapshot};
pub use storage::{Config, CooldownStore, Database, EventStore, LogEntry};
pub use tracker::{LogOutcome, TodayStatus, Tracker};
