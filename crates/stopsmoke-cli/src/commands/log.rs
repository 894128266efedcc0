use stopsmoke_core::LogOutcome;

use super::{format_countdown, open_tracker, print_json};

/// Exit status when the cooldown refuses the log, so scripts can branch on it.
pub const EXIT_COOLDOWN_ACTIVE: i32 = 2;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (tracker, _) = open_tracker()?;
    let outcome = tracker.log_cigarette()?;
    print_json(&outcome)?;

    match &outcome {
        LogOutcome::Logged { next_eligible_at, .. } => {
            eprintln!(
                "Cigarette logged. Next one available at {}.",
                next_eligible_at.with_timezone(&chrono::Local).format("%H:%M")
            );
            Ok(())
        }
        LogOutcome::CooldownActive { .. } => {
            if let Some(remaining) = outcome.remaining() {
                eprintln!("Next cigarette available in: {}", format_countdown(remaining));
            }
            std::process::exit(EXIT_COOLDOWN_ACTIVE);
        }
    }
}
