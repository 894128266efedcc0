//! Single-shot expiry task.
//!
//! At most one task is pending. Re-arming or cancelling aborts the previous
//! task and bumps the generation; the callback receives the generation it was
//! armed with so the owner can drop a stale wake-up that raced the abort.

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct ExpiryTimer {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl ExpiryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Schedule `on_fire` for `deadline`.
    ///
    /// The wall clock is checked again after every sleep, so a suspended
    /// machine or a drifting clock only delays the callback, never advances it.
    /// Returns `false` when there is no tokio runtime to run the task on.
    pub fn arm<F>(&mut self, deadline: DateTime<Utc>, on_fire: F) -> bool
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return false;
        };

        let generation = self.generation;
        self.handle = Some(runtime.spawn(async move {
            loop {
                let left = deadline - Utc::now();
                match left.to_std() {
                    Ok(wait) if !wait.is_zero() => tokio::time::sleep(wait).await,
                    _ => break,
                }
            }
            on_fire(generation);
        }));
        true
    }

    /// Abort the pending task, if any.
    pub fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Forget the handle of a task that has already fired.
    pub fn disarm_fired(&mut self) {
        self.handle = None;
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn arm_without_runtime_reports_false() {
        let mut timer = ExpiryTimer::new();
        assert!(!timer.arm(Utc::now(), |_| {}));
        assert!(!timer.is_armed());
    }

    #[tokio::test]
    async fn fires_with_current_generation() {
        let mut timer = ExpiryTimer::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let deadline = Utc::now() + chrono::Duration::milliseconds(20);
        assert!(timer.arm(deadline, move |generation| {
            let _ = tx.send((generation, Utc::now()));
        }));

        let (generation, fired_at) = rx.await.unwrap();
        assert_eq!(generation, timer.generation());
        assert!(fired_at >= deadline);
    }

    #[tokio::test]
    async fn rearm_cancels_previous_task() {
        let mut timer = ExpiryTimer::new();
        let fired = Arc::new(AtomicU64::new(0));

        let first = Arc::clone(&fired);
        timer.arm(Utc::now() + chrono::Duration::milliseconds(30), move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = Arc::clone(&fired);
        timer.arm(Utc::now() + chrono::Duration::milliseconds(60), move |_| {
            second.fetch_add(10, Ordering::SeqCst);
        });

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let mut timer = ExpiryTimer::new();
        let fired = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&fired);
        timer.arm(Utc::now() + chrono::Duration::milliseconds(30), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();

        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timer.is_armed());
    }
}
