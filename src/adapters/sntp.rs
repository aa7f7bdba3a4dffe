//! Time synchronisation adapter.
//!
//! Applies the configured POSIX timezone and starts the SNTP client
//! against the configured server. Guarded internally so a second
//! readiness event cannot spin up a second SNTP session, on top of the
//! session-level one-shot in the connectivity manager.

use log::info;

pub struct TimeSync {
    started: bool,
    #[cfg(target_os = "espidf")]
    sntp: Option<esp_idf_svc::sntp::EspSntp<'static>>,
}

impl TimeSync {
    pub fn new() -> Self {
        Self {
            started: false,
            #[cfg(target_os = "espidf")]
            sntp: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Start SNTP once; repeated calls are no-ops.
    pub fn start(&mut self, server: &str, tz: &str) {
        if self.started {
            return;
        }
        info!("sntp: starting against {server} (TZ {tz})");
        self.apply_timezone(tz);
        self.start_client(server);
        self.started = true;
    }

    #[cfg(target_os = "espidf")]
    fn apply_timezone(&self, tz: &str) {
        // SAFETY: single-threaded bring-up path; nothing else touches
        // the environment concurrently.
        unsafe {
            std::env::set_var("TZ", tz);
            esp_idf_svc::sys::tzset();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn apply_timezone(&self, _tz: &str) {
        // The host keeps its own timezone; tests inject a fake clock.
    }

    #[cfg(target_os = "espidf")]
    fn start_client(&mut self, server: &str) {
        use esp_idf_svc::sntp::{EspSntp, SntpConf};

        let conf = SntpConf {
            servers: [server],
            ..Default::default()
        };
        match EspSntp::new(&conf) {
            Ok(sntp) => self.sntp = Some(sntp),
            Err(e) => log::warn!("sntp: start failed: {e}"),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn start_client(&mut self, _server: &str) {
        info!("sntp(sim): client started");
    }
}

impl Default for TimeSync {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_idempotent() {
        let mut sync = TimeSync::new();
        assert!(!sync.is_started());
        sync.start("pool.ntp.org", "UTC-6:00");
        assert!(sync.is_started());
        // Second start (reconnect path) must be a no-op.
        sync.start("other.ntp.org", "UTC");
        assert!(sync.is_started());
    }
}
