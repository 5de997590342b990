//! Exponential-backoff retry timer. A single timer is always running
//! between RRQ emission and transfer completion; there is no "disarmed"
//! state to represent, so callers can always poll [`RetryTimer::deadline`].

use tokio::time::{Duration, Instant};

#[derive(Debug)]
pub struct RetryTimer {
    initial: Duration,
    cap: Duration,
    max_attempts: u32,
    current: Duration,
    attempts: u32,
    deadline: Instant,
}

impl RetryTimer {
    pub fn new(initial: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            cap,
            max_attempts,
            current: initial,
            attempts: 0,
            deadline: Instant::now(),
        }
    }

    /// Resets the backoff schedule to its initial interval without
    /// touching the deadline. Used when a fresh exchange (a DATA answered
    /// with an ACK, say) makes prior timeouts irrelevant.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.initial;
    }

    /// Arms the timer to fire at the next scheduling quantum. Used for the
    /// very first RRQ send, where no wait is wanted before transmitting.
    pub fn start_nodelay(&mut self) {
        self.deadline = Instant::now();
    }

    /// Arms the timer to fire after the current backoff interval.
    pub fn start(&mut self) {
        self.deadline = Instant::now() + self.current;
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Called when the timer fires. Advances the backoff schedule and
    /// reports whether the retry budget has been exhausted.
    pub fn expire(&mut self) -> bool {
        self.attempts += 1;
        let failed = self.attempts > self.max_attempts;
        self.current = (self.current * 2).min(self.cap);
        self.deadline = Instant::now() + self.current;
        failed
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn start_nodelay_fires_immediately() {
        let mut t = RetryTimer::new(Duration::from_secs(1), Duration::from_secs(8), 5);
        t.start_nodelay();
        tokio::time::timeout_at(t.deadline() + Duration::from_millis(1), async {})
            .await
            .unwrap();
    }

    #[test]
    fn expire_doubles_backoff_up_to_cap() {
        let mut t = RetryTimer::new(Duration::from_secs(1), Duration::from_secs(4), 10);
        assert!(!t.expire()); // 1 -> 2
        assert!(!t.expire()); // 2 -> 4
        assert!(!t.expire()); // 4 -> 4 (capped)
        assert_eq!(t.current, Duration::from_secs(4));
    }

    #[test]
    fn expire_reports_failure_past_max_attempts() {
        let mut t = RetryTimer::new(Duration::from_millis(10), Duration::from_millis(10), 2);
        assert!(!t.expire());
        assert!(!t.expire());
        assert!(t.expire());
    }

    #[test]
    fn reset_restores_initial_interval() {
        let mut t = RetryTimer::new(Duration::from_secs(1), Duration::from_secs(8), 5);
        t.expire();
        t.expire();
        assert!(t.current > Duration::from_secs(1));
        t.reset();
        assert_eq!(t.current, Duration::from_secs(1));
        assert_eq!(t.attempts, 0);
    }
}
