use super::{open_tracker, print_json};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (tracker, _) = open_tracker()?;
    let status = tracker.today_status()?;
    print_json(&status)
}
