use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signals published by the tracker.
/// The CLI prints them; notification layers subscribe to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A cigarette was stored and a new cooldown started.
    CigaretteLogged {
        entry_id: i64,
        occurred_at: DateTime<Utc>,
        next_eligible_at: DateTime<Utc>,
    },
    /// The cooldown elapsed; logging is permitted again.
    CooldownExpired { at: DateTime<Utc> },
    /// All history and cooldown state were cleared.
    HistoryCleared { at: DateTime<Utc> },
}

impl Event {
    /// Timestamp the signal refers to.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::CigaretteLogged { occurred_at, .. } => *occurred_at,
            Event::CooldownExpired { at } | Event::HistoryCleared { at } => *at,
        }
    }
}
