use serde_json::json;

use super::{open_tracker, print_json};

pub fn run(weeks: u32, daily: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (tracker, _) = open_tracker()?;
    let snapshot = tracker.progress_snapshot(weeks)?;

    if daily {
        let days = tracker.daily_breakdown(weeks.saturating_mul(7))?;
        print_json(&json!({ "snapshot": snapshot, "days": days }))
    } else {
        print_json(&snapshot)
    }
}
