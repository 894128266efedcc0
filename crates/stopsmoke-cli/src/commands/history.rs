use chrono::{DateTime, Duration, Utc};

use super::{open_tracker, print_json};

pub fn run(days: u32) -> Result<(), Box<dyn std::error::Error>> {
    let (tracker, _) = open_tracker()?;
    let end = Utc::now();
    // A span reaching past the calendar's start lists everything.
    let start = Duration::try_days(i64::from(days))
        .and_then(|span| end.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let entries = tracker.history(start, end)?;
    print_json(&entries)
}
