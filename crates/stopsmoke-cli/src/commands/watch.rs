//! Long-running mode: keeps the tracker alive so the cooldown expiry fires
//! on time, and prints every signal as one JSON line.

use stopsmoke_core::Event;
use tokio::sync::broadcast::error::RecvError;

use super::{open_tracker, print_json};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(watch())
}

async fn watch() -> Result<(), Box<dyn std::error::Error>> {
    // The expiry timer needs a runtime, so the tracker is opened inside it.
    let (tracker, config) = open_tracker()?;
    let mut rx = tracker.subscribe();
    print_json(&tracker.today_status()?)?;

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    if matches!(event, Event::CooldownExpired { .. }) && config.notifications.enabled {
                        eprintln!("You can smoke your next cigarette now.");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watcher fell behind, signals dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping watch");
                break;
            }
        }
    }
    Ok(())
}
