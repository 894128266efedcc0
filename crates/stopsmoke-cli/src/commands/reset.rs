use super::open_tracker;

pub fn run(yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !yes {
        return Err("refusing to clear history without --yes".into());
    }
    let (tracker, _) = open_tracker()?;
    tracker.reset_all()?;
    println!("{{\"type\": \"HistoryCleared\"}}");
    Ok(())
}
