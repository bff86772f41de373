//! Fixed-period timer for the disconnect watchdog

use std::time::Duration;

/// Accumulates host time and fires once per elapsed period
#[derive(Debug, Clone)]
pub struct Watchdog {
    period: Duration,
    elapsed: Duration,
}

impl Watchdog {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            elapsed: Duration::ZERO,
        }
    }

    /// Advance by `delta`; true when at least one period completed.
    /// Several periods elapsing in one call still fire once.
    pub fn advance(&mut self, delta: Duration) -> bool {
        if self.period.is_zero() {
            return true;
        }
        self.elapsed += delta;
        if self.elapsed < self.period {
            return false;
        }
        let periods = self.elapsed.as_nanos() / self.period.as_nanos();
        self.elapsed -= self.period * periods as u32;
        true
    }

    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_each_period() {
        let mut dog = Watchdog::new(Duration::from_secs(1));
        let frame = Duration::from_millis(250);
        let fired: Vec<bool> = (0..8).map(|_| dog.advance(frame)).collect();
        assert_eq!(fired, vec![false, false, false, true, false, false, false, true]);
    }

    #[test]
    fn test_long_stall_fires_once() {
        let mut dog = Watchdog::new(Duration::from_secs(1));
        assert!(dog.advance(Duration::from_millis(3500)));
        assert!(!dog.advance(Duration::from_millis(400)));
        assert!(dog.advance(Duration::from_millis(100)));
    }

    #[test]
    fn test_reset_restarts_period() {
        let mut dog = Watchdog::new(Duration::from_secs(1));
        assert!(!dog.advance(Duration::from_millis(900)));
        dog.reset();
        assert!(!dog.advance(Duration::from_millis(900)));
        assert!(dog.advance(Duration::from_millis(100)));
    }
}
