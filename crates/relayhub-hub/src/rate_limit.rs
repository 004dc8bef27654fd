use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

/// Byte counter over a rolling one-second window.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u64,
    samples: VecDeque<(Instant, u64)>,
    total: u64,
}

impl RateLimiter {
    pub fn per_second(limit: u64) -> Self {
        Self {
            limit,
            samples: VecDeque::new(),
            total: 0,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Record `bytes` received now.
    ///
    /// Returns the window total as the error when it exceeds the limit.
    pub fn record(&mut self, bytes: u64) -> Result<(), u64> {
        self.record_at(Instant::now(), bytes)
    }

    fn record_at(&mut self, now: Instant, bytes: u64) -> Result<(), u64> {
        while let Some(&(at, size)) = self.samples.front() {
            if now.duration_since(at) < WINDOW {
                break;
            }
            self.samples.pop_front();
            self.total = self.total.saturating_sub(size);
        }

        self.samples.push_back((now, bytes));
        self.total = self.total.saturating_add(bytes);
        if self.total > self.limit {
            Err(self.total)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit() {
        let mut limiter = RateLimiter::per_second(100);
        let start = Instant::now();
        assert!(limiter.record_at(start, 60).is_ok());
        assert!(limiter.record_at(start, 40).is_ok());
        assert_eq!(limiter.record_at(start, 1), Err(101));
    }

    #[test]
    fn old_samples_leave_the_window() {
        let mut limiter = RateLimiter::per_second(100);
        let start = Instant::now();
        limiter.record_at(start, 90).unwrap();
        limiter
            .record_at(start + Duration::from_millis(500), 10)
            .unwrap();

        // The first sample expires exactly one second later.
        assert!(limiter.record_at(start + WINDOW, 80).is_ok());
        assert_eq!(
            limiter.record_at(start + Duration::from_millis(1400), 11),
            Err(101)
        );
    }

    #[test]
    fn single_oversized_message_is_rejected() {
        let mut limiter = RateLimiter::per_second(10);
        assert_eq!(limiter.record(11), Err(11));
        assert_eq!(limiter.limit(), 10);
    }
}
