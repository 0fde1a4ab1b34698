//! The reconnect timer: at most one pending reconnect deadline.
//!
//! The timer is designed to sit inside the driver's `tokio::select!` loop,
//! the same way a tick scheduler sits inside a game loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = commands.recv() => { /* may call timer.cancel() */ }
//!         () = timer.wait() => { /* reconnect now */ }
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

/// A single cancellable, replaceable deadline.
#[derive(Debug)]
pub struct ReconnectTimer {
    delay: Duration,
    /// When the pending reconnect should fire. `None` = nothing pending.
    deadline: Option<Instant>,
}

impl ReconnectTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// The fixed backoff between an unexpected close and the retry.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms the timer `delay` from now, replacing any pending deadline.
    ///
    /// Returns the new deadline.
    pub fn schedule(&mut self) -> Instant {
        let deadline = Instant::now() + self.delay;
        if self.deadline.replace(deadline).is_some() {
            trace!("replacing pending reconnect deadline");
        }
        deadline
    }

    /// Disarms the timer. Returns `true` if a reconnect was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Whether a reconnect is pending.
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// The pending deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves when the pending deadline passes, disarming the timer.
    ///
    /// When nothing is pending this future never completes; `select!`
    /// keeps serving its other branches. Dropping the future before it
    /// resolves leaves the deadline armed.
    pub async fn wait(&mut self) {
        let Some(deadline) = self.deadline else {
            std::future::pending::<()>().await;
            return;
        };
        time::sleep_until(deadline).await;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(3000);

    #[test]
    fn test_new_timer_is_idle() {
        let timer = ReconnectTimer::new(DELAY);
        assert!(!timer.is_pending());
        assert_eq!(timer.deadline(), None);
        assert_eq!(timer.delay(), DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_fires_after_delay_and_disarms() {
        let mut timer = ReconnectTimer::new(DELAY);
        let start = Instant::now();
        timer.schedule();

        timer.wait().await;

        assert!(start.elapsed() >= DELAY);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_does_not_fire_early() {
        let mut timer = ReconnectTimer::new(DELAY);
        timer.schedule();

        let early = time::timeout(DELAY - Duration::from_millis(1), timer.wait()).await;
        assert!(early.is_err());
        // The dropped wait left the deadline armed.
        assert!(timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let mut timer = ReconnectTimer::new(DELAY);
        timer.schedule();
        assert!(timer.cancel());
        assert!(!timer.cancel());

        let result = time::timeout(DELAY * 10, timer.wait()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_replaces_instead_of_stacking() {
        let mut timer = ReconnectTimer::new(DELAY);
        let first = timer.schedule();
        time::advance(Duration::from_millis(1000)).await;
        let second = timer.schedule();

        assert!(second > first);
        assert_eq!(timer.deadline(), Some(second));

        timer.wait().await;
        assert!(!timer.is_pending());
    }
}
