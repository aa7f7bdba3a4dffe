//! Periodic-task plumbing.
//!
//! Every service loop in the firmware (watchdog tick, scheduler poll,
//! feeder poll, sensor sampling) runs as a plain thread blocked on a
//! [`Ticker`] instead of an ad-hoc sleep loop, so loops share one
//! cancellation mechanism and tests can drive the loop bodies directly
//! without any real sleeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Cooperative cancellation flag shared by all service loops.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Fixed-period tick source with cancellation.
pub struct Ticker {
    period: Duration,
    cancel: CancelToken,
}

impl Ticker {
    pub fn new(period: Duration, cancel: CancelToken) -> Self {
        Self { period, cancel }
    }

    pub fn every_secs(secs: u64, cancel: CancelToken) -> Self {
        Self::new(Duration::from_secs(secs), cancel)
    }

    /// Sleep one period. Returns `false` once cancelled; loops use it
    /// as their `while` condition. Cancellation is observed within
    /// 100 ms regardless of period length.
    pub fn wait(&self) -> bool {
        let slice = Duration::from_millis(100);
        let mut remaining = self.period;
        while remaining > Duration::ZERO {
            if self.cancel.is_cancelled() {
                return false;
            }
            let step = remaining.min(slice);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        !self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_runs_until_cancelled() {
        let cancel = CancelToken::new();
        let ticker = Ticker::new(Duration::from_millis(10), cancel.clone());

        assert!(ticker.wait());
        cancel.cancel();
        assert!(!ticker.wait());
    }

    #[test]
    fn cancellation_cuts_long_waits_short() {
        let cancel = CancelToken::new();
        let ticker = Ticker::every_secs(3600, cancel.clone());

        let handle = std::thread::spawn(move || ticker.wait());
        std::thread::sleep(Duration::from_millis(50));
        cancel.cancel();
        assert!(!handle.join().expect("ticker thread"));
    }
}
