//! System control adapter.
//!
//! [`SystemPort`] backed by the ESP-IDF runtime on the device
//! (`esp_get_free_heap_size` / `esp_restart` / `esp-ota`), and by
//! [`SimSystem`] elsewhere — a scriptable fake that latches restarts
//! instead of performing them.

use crate::app::ports::SystemPort;

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct EspSystem;

#[cfg(target_os = "espidf")]
impl EspSystem {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "espidf")]
impl SystemPort for EspSystem {
    fn free_heap(&self) -> u32 {
        unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
    }

    fn restart(&self) {
        log::warn!("system: restarting now");
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    fn start_upgrade(&self, url: &str) -> Result<(), &'static str> {
        // The image is streamed into the inactive OTA slot; the slot
        // only becomes boot-selected on completion, so a failed
        // download leaves the running firmware untouched.
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
        use esp_idf_svc::io::Read;

        log::info!("system: firmware upgrade from {url}");
        let mut conn = EspHttpConnection::new(&Configuration {
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        })
        .map_err(|_| "OTA connection failed")?;
        conn.initiate_request(esp_idf_svc::http::Method::Get, url, &[])
            .map_err(|_| "OTA request failed")?;
        conn.initiate_response().map_err(|_| "OTA response failed")?;

        let mut ota = esp_ota::OtaUpdate::begin().map_err(|_| "OTA begin failed")?;
        let mut buf = [0u8; 4096];
        loop {
            let n = conn.read(&mut buf).map_err(|_| "OTA read failed")?;
            if n == 0 {
                break;
            }
            ota.write(&buf[..n]).map_err(|_| "OTA write failed")?;
        }
        let mut completed = ota.finalize().map_err(|_| "OTA finalize failed")?;
        completed
            .set_as_boot_partition()
            .map_err(|_| "OTA boot-select failed")?;
        log::warn!("system: upgrade staged, restarting into new image");
        completed.restart();
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation backend
// ───────────────────────────────────────────────────────────────

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Scriptable system fake for host tests.
#[derive(Debug, Default)]
pub struct SimSystem {
    free_heap: AtomicU32,
    restarted: AtomicBool,
    upgrades: AtomicU32,
}

impl SimSystem {
    pub fn with_free_heap(bytes: u32) -> Self {
        Self {
            free_heap: AtomicU32::new(bytes),
            restarted: AtomicBool::new(false),
            upgrades: AtomicU32::new(0),
        }
    }

    pub fn set_free_heap(&self, bytes: u32) {
        self.free_heap.store(bytes, Ordering::Relaxed);
    }

    pub fn restarted(&self) -> bool {
        self.restarted.load(Ordering::Acquire)
    }

    pub fn upgrades_started(&self) -> u32 {
        self.upgrades.load(Ordering::Relaxed)
    }
}

impl SystemPort for SimSystem {
    fn free_heap(&self) -> u32 {
        self.free_heap.load(Ordering::Relaxed)
    }

    fn restart(&self) {
        self.restarted.store(true, Ordering::Release);
    }

    fn start_upgrade(&self, url: &str) -> Result<(), &'static str> {
        log::info!("system(sim): upgrade from {url}");
        self.upgrades.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
