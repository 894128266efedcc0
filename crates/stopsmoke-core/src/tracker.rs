//! The smoking tracker service.
//!
//! Owns the store, the cooldown machine, the pending expiry task and the
//! taper settings behind one lock, so a log, an expiry and a history clear
//! can never interleave. Signals go out on a broadcast channel.
//!
//! The stored cooldown is the source of truth. Before every decision the
//! in-memory machine is checked against it, so a long-lived tracker (the
//! `watch` command) never overwrites a cooldown another process started.
//!
//! ## Usage
//!
//! ```ignore
//! let tracker = Tracker::new(Database::open()?, config.allowance())?;
//! let mut signals = tracker.subscribe();
//! match tracker.log_cigarette()? {
//!     LogOutcome::Logged { .. } => {}
//!     LogOutcome::CooldownActive { remaining_ms } => {}
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Days, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::allowance::{current_allowance, taper_cooldown, AllowanceConfig};
use crate::cooldown::{CooldownMachine, CooldownPhase, CooldownState, ExpiryTimer, LogDecision};
use crate::error::{Result, ValidationError};
use crate::events::Event;
use crate::progress::{self, DaySummary, ProgressSnapshot};
use crate::storage::{truncate_to_millis, CooldownStore, EventStore, LogEntry};

const SIGNAL_CAPACITY: usize = 64;

/// Any backend the tracker can run on.
pub trait Store: EventStore + CooldownStore + Send + 'static {}

impl<T: EventStore + CooldownStore + Send + 'static> Store for T {}

/// Answer to a log attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LogOutcome {
    Logged {
        entry: LogEntry,
        next_eligible_at: DateTime<Utc>,
    },
    /// Rejected: the previous cooldown is still running. Nothing was stored.
    CooldownActive { remaining_ms: u64 },
}

impl LogOutcome {
    /// Remaining cooldown for a rejected attempt.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            LogOutcome::CooldownActive { remaining_ms } => {
                Some(Duration::milliseconds(i64::try_from(*remaining_ms).unwrap_or(i64::MAX)))
            }
            LogOutcome::Logged { .. } => None,
        }
    }
}

/// What the home view shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodayStatus {
    pub date: NaiveDate,
    pub allowed_today: u32,
    pub smoked_today: u64,
    pub phase: CooldownPhase,
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub cooldown_remaining_ms: Option<u64>,
}

/// How [`Inner::settle`] brought the machine in line with the store.
enum Settled {
    Unchanged,
    Expired(Event),
    /// Another process logged or reset; its stored cooldown was taken over.
    Adopted,
}

struct Inner<S> {
    store: S,
    machine: CooldownMachine,
    timer: ExpiryTimer,
    allowance: AllowanceConfig,
}

impl<S: Store> Inner<S> {
    /// Take over a stored cooldown that differs from ours, otherwise expire
    /// a passed deadline.
    ///
    /// The expiry is written before the machine leaves `Cooling`; if the
    /// write fails the cooldown stays active and the error is returned.
    fn settle(&mut self, now: DateTime<Utc>) -> Result<Settled> {
        let stored = self.store.load_cooldown()?;
        if stored.and_then(|s| s.next_eligible_at) != self.machine.next_eligible_at() {
            self.machine = CooldownMachine::restore(stored, now);
            return Ok(Settled::Adopted);
        }

        let mut next = self.machine.clone();
        let Some(event) = next.expire(now) else {
            return Ok(Settled::Unchanged);
        };
        self.store.save_cooldown(&next.state())?;
        self.machine = next;
        Ok(Settled::Expired(event))
    }
}

type Shared<S> = Arc<Mutex<Inner<S>>>;

pub struct Tracker<S: Store> {
    inner: Shared<S>,
    signals: broadcast::Sender<Event>,
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.num_milliseconds()).unwrap_or(0)
}

fn lock<S>(inner: &Mutex<Inner<S>>) -> MutexGuard<'_, Inner<S>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: Store> Tracker<S> {
    /// Open the tracker, restoring any cooldown persisted in `store`.
    ///
    /// # Errors
    /// Fails when the persisted cooldown cannot be read.
    pub fn new(store: S, allowance: AllowanceConfig) -> Result<Self> {
        Self::restore_at(store, allowance, Utc::now())
    }

    /// Restore as of `now`.
    ///
    /// A cooldown that ended while the process was down is dropped without
    /// an expiry signal; one still running is resumed and, inside a tokio
    /// runtime, re-armed.
    ///
    /// # Errors
    /// Fails when the persisted cooldown cannot be read or rewritten.
    pub fn restore_at(store: S, allowance: AllowanceConfig, now: DateTime<Utc>) -> Result<Self> {
        let persisted = store.load_cooldown()?;
        let machine = CooldownMachine::restore(persisted, now);
        if persisted.is_some_and(|p| p != machine.state()) {
            debug!("persisted cooldown already elapsed, restoring idle");
            store.save_cooldown(&machine.state())?;
        }

        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        let tracker = Self {
            inner: Arc::new(Mutex::new(Inner {
                store,
                machine,
                timer: ExpiryTimer::new(),
                allowance,
            })),
            signals,
        };

        {
            let mut inner = lock(&tracker.inner);
            if let Some(deadline) = inner.machine.next_eligible_at() {
                info!(%deadline, "resuming cooldown");
                tracker.arm_expiry(&mut inner, deadline);
            }
        }
        Ok(tracker)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.signals.subscribe()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn allowance(&self) -> AllowanceConfig {
        lock(&self.inner).allowance
    }

    /// The in-memory cooldown, as last settled.
    pub fn state(&self) -> CooldownState {
        lock(&self.inner).machine.state()
    }

    /// # Errors
    /// Fails when the stored cooldown cannot be read or its expiry written.
    pub fn phase(&self) -> Result<CooldownPhase> {
        let now = Utc::now();
        let mut inner = lock(&self.inner);
        self.settle(&mut inner, now)?;
        Ok(inner.machine.phase())
    }

    /// Time left before the next cigarette may be logged.
    ///
    /// # Errors
    /// Fails when the stored cooldown cannot be read or its expiry written.
    pub fn cooldown_remaining(&self) -> Result<Option<Duration>> {
        self.cooldown_remaining_at(Utc::now())
    }

    pub fn cooldown_remaining_at(&self, now: DateTime<Utc>) -> Result<Option<Duration>> {
        let mut inner = lock(&self.inner);
        self.settle(&mut inner, now)?;
        Ok(inner.machine.remaining(now))
    }

    /// Progress over the last `window_weeks` weeks.
    ///
    /// # Errors
    /// Fails on a window outside `1..=MAX_WINDOW_WEEKS` or a storage error.
    pub fn progress_snapshot(&self, window_weeks: u32) -> Result<ProgressSnapshot> {
        self.progress_snapshot_at(window_weeks, Utc::now())
    }

    pub fn progress_snapshot_at(
        &self,
        window_weeks: u32,
        now: DateTime<Utc>,
    ) -> Result<ProgressSnapshot> {
        let inner = lock(&self.inner);
        progress::snapshot(&inner.store, &inner.allowance, window_weeks, now)
    }

    /// Per-day figures for the last `days` local days, today included.
    ///
    /// # Errors
    /// Fails on a range longer than the widest report or a storage error.
    pub fn daily_breakdown(&self, days: u32) -> Result<Vec<DaySummary>> {
        let to = Local::now().date_naive();
        let from = to
            .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "days".into(),
                message: format!("{days} days reaches before the earliest representable date"),
            })?;
        let inner = lock(&self.inner);
        progress::daily_breakdown(&inner.store, &inner.allowance, from, to)
    }

    /// Logged entries in `[start, end]`.
    ///
    /// # Errors
    /// Fails on an inverted range or a storage error.
    pub fn history(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<LogEntry>> {
        let inner = lock(&self.inner);
        progress::history(&inner.store, start, end)
    }

    /// # Errors
    /// Fails on a storage error.
    pub fn today_status(&self) -> Result<TodayStatus> {
        self.today_status_at(Utc::now())
    }

    pub fn today_status_at(&self, now: DateTime<Utc>) -> Result<TodayStatus> {
        let mut inner = lock(&self.inner);
        self.settle(&mut inner, now)?;
        let today = progress::today(&inner.store, &inner.allowance, now)?;
        Ok(TodayStatus {
            date: today.date,
            allowed_today: today.allowed,
            smoked_today: today.smoked,
            phase: inner.machine.phase(),
            next_eligible_at: inner.machine.next_eligible_at(),
            cooldown_remaining_ms: inner.machine.remaining(now).map(duration_ms),
        })
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Replace the taper settings; applies from the next logged cigarette.
    pub fn set_allowance(&self, allowance: AllowanceConfig) {
        lock(&self.inner).allowance = allowance;
        info!(
            base = allowance.daily_allowance_base(),
            reduction = allowance.weekly_reduction(),
            "allowance updated"
        );
    }

    /// Log a cigarette now.
    ///
    /// # Errors
    /// Storage failures are returned as-is; the cooldown is left as it was.
    pub fn log_cigarette(&self) -> Result<LogOutcome> {
        self.log_cigarette_at(Utc::now())
    }

    pub fn log_cigarette_at(&self, now: DateTime<Utc>) -> Result<LogOutcome> {
        let now = truncate_to_millis(now);
        let mut inner = lock(&self.inner);
        self.settle(&mut inner, now)?;

        if let Some(remaining) = inner.machine.remaining(now) {
            debug!(remaining_ms = remaining.num_milliseconds(), "log rejected, cooldown active");
            return Ok(LogOutcome::CooldownActive {
                remaining_ms: duration_ms(remaining),
            });
        }

        let program_start = inner.store.earliest()?.map(|entry| entry.occurred_at);
        let allowance = current_allowance(&inner.allowance, program_start, now);
        let interval = taper_cooldown(&inner.allowance, program_start, now);

        let previous = inner.machine.state();
        let next_eligible_at = match inner.machine.begin(now, interval) {
            LogDecision::Accepted { next_eligible_at } => next_eligible_at,
            LogDecision::Blocked { remaining } => {
                return Ok(LogOutcome::CooldownActive {
                    remaining_ms: duration_ms(remaining),
                })
            }
        };

        // Cooldown first: a crash before the append leaves the user blocked,
        // never able to log twice.
        if let Err(err) = inner.store.save_cooldown(&inner.machine.state()) {
            inner.machine.rollback(previous);
            return Err(err);
        }
        let entry = match inner.store.append(now) {
            Ok(entry) => entry,
            Err(err) => {
                inner.machine.rollback(previous);
                if let Err(restore_err) = inner.store.save_cooldown(&previous) {
                    // The stored cooldown still blocks; the next settle adopts it.
                    warn!(error = %restore_err, "failed to roll back persisted cooldown");
                }
                return Err(err);
            }
        };

        self.arm_expiry(&mut inner, next_eligible_at);
        drop(inner);

        info!(
            id = entry.id,
            allowance,
            interval_min = interval.num_minutes(),
            %next_eligible_at,
            "cigarette logged"
        );
        self.publish(Event::CigaretteLogged {
            entry_id: entry.id,
            occurred_at: entry.occurred_at,
            next_eligible_at,
        });
        Ok(LogOutcome::Logged {
            entry,
            next_eligible_at,
        })
    }

    /// Clear all history and the cooldown.
    ///
    /// # Errors
    /// If the store cannot be cleared, nothing changes and the failure is
    /// returned.
    pub fn reset_all(&self) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.store.clear_all()?;
        inner.timer.cancel();
        inner.machine.reset();
        drop(inner);

        info!("history cleared");
        self.publish(Event::HistoryCleared { at: Utc::now() });
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────

    fn publish(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.signals.send(event);
    }

    /// Settle on access: covers a missing runtime, a late timer and changes
    /// made by other processes.
    fn settle(&self, inner: &mut Inner<S>, now: DateTime<Utc>) -> Result<()> {
        match inner.settle(now)? {
            Settled::Unchanged => {}
            Settled::Expired(event) => {
                inner.timer.cancel();
                debug!("cooldown expired on access");
                self.publish(event);
            }
            Settled::Adopted => {
                debug!("stored cooldown changed elsewhere, adopting it");
                match inner.machine.next_eligible_at() {
                    Some(deadline) => self.arm_expiry(inner, deadline),
                    None => inner.timer.cancel(),
                }
            }
        }
        Ok(())
    }

    fn arm_expiry(&self, inner: &mut Inner<S>, deadline: DateTime<Utc>) {
        schedule_expiry(&self.inner, &self.signals, inner, deadline);
    }
}

fn schedule_expiry<S: Store>(
    shared: &Shared<S>,
    signals: &broadcast::Sender<Event>,
    inner: &mut Inner<S>,
    deadline: DateTime<Utc>,
) {
    let weak = Arc::downgrade(shared);
    let signals = signals.clone();
    let armed = inner.timer.arm(deadline, move |generation| {
        if let Some(shared) = weak.upgrade() {
            fire_expiry(&shared, &signals, generation);
        }
    });
    if !armed {
        debug!("no async runtime, cooldown expiry will be observed on access");
    }
}

fn fire_expiry<S: Store>(shared: &Shared<S>, signals: &broadcast::Sender<Event>, generation: u64) {
    let mut inner = lock(shared);
    if inner.timer.generation() != generation {
        debug!(generation, "stale expiry ignored");
        return;
    }
    inner.timer.disarm_fired();

    match inner.settle(Utc::now()) {
        Ok(Settled::Expired(event)) => {
            drop(inner);
            info!(at = %event.at(), "cooldown expired");
            let _ = signals.send(event);
        }
        Ok(Settled::Adopted) => {
            if let Some(deadline) = inner.machine.next_eligible_at() {
                debug!(%deadline, "stored cooldown changed elsewhere, waiting for it");
                schedule_expiry(shared, signals, &mut inner, deadline);
            }
        }
        Ok(Settled::Unchanged) => {}
        // Still cooling in memory; the next access retries and reports it.
        Err(err) => warn!(error = %err, "cooldown expiry not persisted"),
    }
}
