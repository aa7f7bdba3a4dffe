//! Clock adapters.
//!
//! - **`target_os = "espidf"`** — wall clock via `gettimeofday` /
//!   `localtime_r`, uptime via the high-resolution timer. Times before
//!   2020 are treated as "not yet synced"; schedule evaluation stays
//!   off until SNTP has run.
//! - **all other targets** — [`SystemClock`] reads the host clock via
//!   `chrono`, and [`FakeClock`] gives tests full control.

use crate::app::ports::{Clock, WallTime};

const DATETIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl SystemClock {
    fn local_tm(&self) -> Option<esp_idf_svc::sys::tm> {
        use core::ptr;

        let mut tv = esp_idf_svc::sys::timeval { tv_sec: 0, tv_usec: 0 };
        // SAFETY: plain libc-style out-parameter calls.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, ptr::null_mut()) } != 0 {
            return None;
        }
        // Reject obviously unsynced time (before 2020-01-01).
        const EPOCH_2020: i64 = 1_577_836_800;
        if i64::from(tv.tv_sec) < EPOCH_2020 {
            return None;
        }
        let secs = tv.tv_sec as esp_idf_svc::sys::time_t;
        let mut tm: esp_idf_svc::sys::tm = unsafe { core::mem::zeroed() };
        if unsafe { esp_idf_svc::sys::localtime_r(&secs, &mut tm) }.is_null() {
            return None;
        }
        Some(tm)
    }
}

#[cfg(target_os = "espidf")]
impl Clock for SystemClock {
    fn wall_time(&self) -> Option<WallTime> {
        let tm = self.local_tm()?;
        if !(0..24).contains(&tm.tm_hour) || !(0..60).contains(&tm.tm_min) {
            return None;
        }
        Some(WallTime {
            minutes: (tm.tm_hour * 60 + tm.tm_min) as u16,
            weekday: tm.tm_wday as u8,
        })
    }

    fn datetime(&self) -> Option<String> {
        let tm = self.local_tm()?;
        Some(format!(
            "{:02}.{:02}.{} {:02}:{:02}:{:02}",
            tm.tm_mday,
            tm.tm_mon + 1,
            tm.tm_year + 1900,
            tm.tm_hour,
            tm.tm_min,
            tm.tm_sec,
        ))
    }

    fn uptime_secs(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000_000
    }
}

#[cfg(not(target_os = "espidf"))]
impl Clock for SystemClock {
    fn wall_time(&self) -> Option<WallTime> {
        use chrono::{Datelike, Timelike};

        let now = chrono::Local::now();
        Some(WallTime {
            minutes: (now.hour() * 60 + now.minute()) as u16,
            weekday: now.weekday().num_days_from_sunday() as u8,
        })
    }

    fn datetime(&self) -> Option<String> {
        Some(chrono::Local::now().format(DATETIME_FORMAT).to_string())
    }

    fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}

// ───────────────────────────────────────────────────────────────
// Fake clock (host tests)
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod fake {
    use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU64, Ordering};

    use super::{Clock, WallTime};

    /// Fully scriptable clock for scheduler and dispatcher tests.
    #[derive(Debug, Default)]
    pub struct FakeClock {
        synced: AtomicBool,
        minutes: AtomicU16,
        weekday: AtomicU8,
        uptime: AtomicU64,
    }

    impl FakeClock {
        /// A clock that has not seen time sync yet.
        pub fn unsynced() -> Self {
            Self::default()
        }

        pub fn synced_at(minutes: u16, weekday: u8) -> Self {
            let clock = Self::default();
            clock.set_wall_time(minutes, weekday);
            clock
        }

        pub fn set_wall_time(&self, minutes: u16, weekday: u8) {
            self.minutes.store(minutes, Ordering::Relaxed);
            self.weekday.store(weekday, Ordering::Relaxed);
            self.synced.store(true, Ordering::Relaxed);
        }

        pub fn set_uptime(&self, secs: u64) {
            self.uptime.store(secs, Ordering::Relaxed);
        }
    }

    impl Clock for FakeClock {
        fn wall_time(&self) -> Option<WallTime> {
            if !self.synced.load(Ordering::Relaxed) {
                return None;
            }
            Some(WallTime {
                minutes: self.minutes.load(Ordering::Relaxed),
                weekday: self.weekday.load(Ordering::Relaxed),
            })
        }

        fn datetime(&self) -> Option<String> {
            let t = self.wall_time()?;
            Some(format!("01.01.2026 {:02}:{:02}:00", t.minutes / 60, t.minutes % 60))
        }

        fn uptime_secs(&self) -> u64 {
            self.uptime.load(Ordering::Relaxed)
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use fake::FakeClock;
