//! Fixed-delay reconnect scheduling.
//!
//! Every unexpected close or failure produces one [`RetryTicket`]. A ticket
//! only fires if the manager's generation has not moved since it was issued;
//! a disconnect or a newer connect bumps the generation and so cancels every
//! outstanding ticket without touching the timer itself.

use std::time::Duration;

use tokio::time::Instant;

/// Delay between a failure and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules a retry for a failure observed at `generation`.
    ///
    /// There is no attempt limit and no backoff.
    pub fn on_failure(&self, generation: u64) -> RetryTicket {
        RetryTicket {
            generation,
            due: Instant::now() + self.delay,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

/// A pending reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTicket {
    pub generation: u64,
    pub due: Instant,
}

impl RetryTicket {
    /// Whether the ticket still applies to the manager at `current_generation`.
    pub fn is_current(&self, current_generation: u64) -> bool {
        self.generation == current_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delay_is_five_seconds() {
        assert_eq!(ReconnectPolicy::default().delay(), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn ticket_is_due_after_delay() {
        let before = Instant::now();
        let ticket = ReconnectPolicy::default().on_failure(4);
        assert_eq!(ticket.generation, 4);
        assert_eq!(ticket.due - before, DEFAULT_RECONNECT_DELAY);
    }

    #[test]
    fn ticket_from_older_generation_is_stale() {
        let ticket = ReconnectPolicy::new(Duration::from_millis(10)).on_failure(2);
        assert!(ticket.is_current(2));
        assert!(!ticket.is_current(3));
    }
}
