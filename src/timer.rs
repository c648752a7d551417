//! The session's single one-shot timer.
//!
//! Both session variants coordinate all their waiting conditions against one
//! timer: it is armed exactly while a confirmation or reply is outstanding,
//! and what an expiry *means* is determined by the wait state, not by the
//! timer itself.

use std::future::pending;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

#[derive(Default)]
pub struct OneShotTimer {
    deadline: Option<Instant>,
}

impl OneShotTimer {
    pub fn new() -> OneShotTimer {
        OneShotTimer { deadline: None }
    }

    pub fn arm(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Snapshot for the event loop; taking a copy keeps the select arms free
    /// of borrows into the session.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Resolves when the deadline passes; stays pending forever when there is
/// none, so a disarmed timer never wins a select.
pub async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_armed_timer_expires() {
        let mut timer = OneShotTimer::new();
        timer.arm(Duration::from_millis(250));
        assert!(timer.is_armed());

        timeout(Duration::from_secs(1), expiry(timer.deadline()))
            .await
            .expect("armed timer should have expired");
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_disarmed_timer_stays_pending() {
        let mut timer = OneShotTimer::new();
        timer.arm(Duration::from_millis(250));
        timer.disarm();
        assert!(!timer.is_armed());

        let result = timeout(Duration::from_secs(3600), expiry(timer.deadline())).await;
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_rearming_moves_the_deadline() {
        let mut timer = OneShotTimer::new();
        timer.arm(Duration::from_millis(100));
        let first = timer.deadline().unwrap();
        timer.arm(Duration::from_millis(500));
        let second = timer.deadline().unwrap();
        assert!(second > first);
    }
}
