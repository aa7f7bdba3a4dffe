//! Device-health watchdog.
//!
//! Runs on every 1 s service tick with two independent, non-blocking
//! checks:
//!
//! - **heap floor** — when a nonzero minimum-free-heap threshold is
//!   configured and free heap falls below it, restart immediately.
//!   There is no graceful-degradation path below the floor.
//! - **deferred reboot** — an operator-requested reboot restarts the
//!   device only after [`REBOOT_GRACE_TICKS`] further ticks, leaving
//!   time for the acknowledging response to flush.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info};

use crate::app::ports::SystemPort;

/// Ticks between a reboot request and the actual restart.
pub const REBOOT_GRACE_TICKS: u8 = 3;

/// Cross-task reboot request flag. Set by the command dispatcher,
/// consumed by the watchdog.
#[derive(Debug, Default)]
pub struct RebootFlag {
    pending: AtomicBool,
}

impl RebootFlag {
    pub fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    pub fn request(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// The health watchdog loop body.
pub struct HealthWatchdog {
    min_free_heap: u32,
    reboot_ticks: u8,
}

impl HealthWatchdog {
    /// `min_free_heap == 0` disables the heap check.
    pub fn new(min_free_heap: u32) -> Self {
        if min_free_heap > 0 {
            info!("watchdog: heap floor {min_free_heap} bytes");
        }
        Self {
            min_free_heap,
            reboot_ticks: 0,
        }
    }

    /// One service tick. Returns `true` when a restart was issued
    /// (meaningful only for the simulation backend — the device never
    /// returns from `restart`).
    pub fn tick(&mut self, reboot: &RebootFlag, sys: &(impl SystemPort + ?Sized)) -> bool {
        if self.min_free_heap > 0 {
            let free = sys.free_heap();
            if free < self.min_free_heap {
                error!(
                    "watchdog: free heap {free} below floor {}, restarting",
                    self.min_free_heap
                );
                sys.restart();
                return true;
            }
        }

        if reboot.is_pending() {
            self.reboot_ticks += 1;
            if self.reboot_ticks >= REBOOT_GRACE_TICKS {
                info!("watchdog: deferred reboot, restarting now");
                sys.restart();
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::system::SimSystem;

    #[test]
    fn heap_below_floor_restarts_within_one_tick() {
        let sys = SimSystem::with_free_heap(10_000);
        let mut wdt = HealthWatchdog::new(16_384);
        let reboot = RebootFlag::new();

        assert!(wdt.tick(&reboot, &sys));
        assert!(sys.restarted());
    }

    #[test]
    fn heap_above_floor_keeps_running() {
        let sys = SimSystem::with_free_heap(64_000);
        let mut wdt = HealthWatchdog::new(16_384);
        let reboot = RebootFlag::new();

        for _ in 0..100 {
            assert!(!wdt.tick(&reboot, &sys));
        }
        assert!(!sys.restarted());
    }

    #[test]
    fn zero_floor_never_restarts() {
        let sys = SimSystem::with_free_heap(1);
        let mut wdt = HealthWatchdog::new(0);
        let reboot = RebootFlag::new();

        for _ in 0..100 {
            assert!(!wdt.tick(&reboot, &sys));
        }
        assert!(!sys.restarted());
    }

    #[test]
    fn reboot_request_restarts_after_exactly_three_ticks() {
        let sys = SimSystem::with_free_heap(64_000);
        let mut wdt = HealthWatchdog::new(0);
        let reboot = RebootFlag::new();

        // Nothing pending: no restart.
        assert!(!wdt.tick(&reboot, &sys));

        reboot.request();
        assert!(!wdt.tick(&reboot, &sys)); // tick 1
        assert!(!wdt.tick(&reboot, &sys)); // tick 2
        assert!(wdt.tick(&reboot, &sys)); // tick 3
        assert!(sys.restarted());
    }

    #[test]
    fn heap_check_beats_reboot_grace() {
        let sys = SimSystem::with_free_heap(100);
        let mut wdt = HealthWatchdog::new(16_384);
        let reboot = RebootFlag::new();
        reboot.request();

        assert!(wdt.tick(&reboot, &sys));
        assert!(sys.restarted());
    }
}
