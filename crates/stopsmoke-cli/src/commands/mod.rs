pub mod config;
pub mod history;
pub mod log;
pub mod progress;
pub mod reset;
pub mod status;
pub mod watch;

use stopsmoke_core::{Config, Database, Tracker};

/// Open the tracker over the default database with the saved allowance.
pub fn open_tracker() -> Result<(Tracker<Database>, Config), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open()?;
    tracing::debug!(path = ?db.path(), "database opened");
    let tracker = Tracker::new(db, config.allowance())?;
    Ok((tracker, config))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `MM:SS` countdown text; minutes are not wrapped into hours.
pub fn format_countdown(remaining: chrono::Duration) -> String {
    let total_secs = remaining.num_seconds().max(0);
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}
