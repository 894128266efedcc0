//! Cooldown state machine.
//!
//! Like the rest of the core this is wall-clock based and takes `now` from
//! the caller; it never reads the clock or sleeps itself.
//!
//! ## State Transitions
//!
//! ```text
//! Idle --begin--> Cooling --expire--> Idle
//!   ^                |
//!   +-----reset------+
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooldownPhase {
    Idle,
    Cooling,
}

/// The persisted part of the machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownState {
    #[serde(default)]
    pub next_eligible_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_logged_at: Option<DateTime<Utc>>,
}

/// Result of asking the machine to start a new cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDecision {
    Accepted { next_eligible_at: DateTime<Utc> },
    Blocked { remaining: Duration },
}

#[derive(Debug, Clone, Default)]
pub struct CooldownMachine {
    state: CooldownState,
}

impl CooldownMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the machine after a restart.
    ///
    /// A deadline still in the future resumes `Cooling`; one that passed while
    /// the process was down restores `Idle` silently. Calling this again with
    /// the same input gives the same machine.
    pub fn restore(persisted: Option<CooldownState>, now: DateTime<Utc>) -> Self {
        let mut state = persisted.unwrap_or_default();
        if state.next_eligible_at.is_some_and(|at| at <= now) {
            state.next_eligible_at = None;
        }
        Self { state }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> CooldownState {
        self.state
    }

    /// `Cooling` until `expire` observes the deadline, even if it has passed.
    pub fn phase(&self) -> CooldownPhase {
        if self.state.next_eligible_at.is_some() {
            CooldownPhase::Cooling
        } else {
            CooldownPhase::Idle
        }
    }

    pub fn next_eligible_at(&self) -> Option<DateTime<Utc>> {
        self.state.next_eligible_at
    }

    /// Time left before logging is allowed, `None` when allowed now.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.state
            .next_eligible_at
            .filter(|at| *at > now)
            .map(|at| at - now)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a cooldown of `interval` at `now`, unless one is still running.
    pub fn begin(&mut self, now: DateTime<Utc>, interval: Duration) -> LogDecision {
        if let Some(remaining) = self.remaining(now) {
            return LogDecision::Blocked { remaining };
        }
        let next_eligible_at = now + interval;
        self.state = CooldownState {
            next_eligible_at: Some(next_eligible_at),
            last_logged_at: Some(now),
        };
        LogDecision::Accepted { next_eligible_at }
    }

    /// Leave `Cooling` once the deadline has been reached.
    ///
    /// Returns the expiry signal exactly once per cooldown.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Option<Event> {
        match self.state.next_eligible_at {
            Some(at) if at <= now => {
                self.state.next_eligible_at = None;
                Some(Event::CooldownExpired { at: now })
            }
            _ => None,
        }
    }

    /// Back to a blank `Idle`.
    pub fn reset(&mut self) {
        self.state = CooldownState::default();
    }

    /// Put back a previously captured state (used to undo a failed log).
    pub fn rollback(&mut self, state: CooldownState) {
        self.state = state;
    }
}
