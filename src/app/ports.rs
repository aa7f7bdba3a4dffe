//! Port traits — the boundary between the orchestration core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ orchestration core
//! ```
//!
//! Driven adapters (document storage, wall clock, message bus, system
//! control) implement these traits. The core consumes them via
//! generics or trait objects, so it never touches ESP-IDF directly and
//! every behaviour is exercisable on the host with mocks.

use core::fmt;

use crate::config::RemoteLogConfig;

// ───────────────────────────────────────────────────────────────
// Document storage (driven adapter: core ↔ flash filesystem)
// ───────────────────────────────────────────────────────────────

/// Named text-blob storage. One blob per persisted document; on the
/// device each blob is a JSON file on the SPIFFS partition.
pub trait StoragePort {
    /// Read the full text of a named blob.
    fn read(&self, name: &str) -> Result<String, StorageError>;

    /// Atomically replace a named blob.
    fn write(&mut self, name: &str, text: &str) -> Result<(), StorageError>;

    /// Delete a named blob. `Ok(())` even if it did not exist.
    fn remove(&mut self, name: &str) -> Result<(), StorageError>;

    fn exists(&self, name: &str) -> bool;
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested blob does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "blob not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// System control (driven adapter: core → SoC runtime)
// ───────────────────────────────────────────────────────────────

/// Process-level runtime queries and control.
///
/// `restart` takes `&self` so the port can be shared behind an `Arc`;
/// on the device it never returns, in simulation it latches a flag.
pub trait SystemPort {
    /// Current free heap, bytes.
    fn free_heap(&self) -> u32;

    /// Restart the whole process.
    fn restart(&self);

    /// Kick off a firmware upgrade from the given image URL.
    fn start_upgrade(&self, url: &str) -> Result<(), &'static str>;
}

// ───────────────────────────────────────────────────────────────
// Wall clock (driven adapter: core ← time source)
// ───────────────────────────────────────────────────────────────

/// Wall-clock time of day. Only meaningful after time sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    /// Minutes since local midnight, 0-1439.
    pub minutes: u16,
    /// Weekday, 0 = Sunday.
    pub weekday: u8,
}

/// Clock access for the scheduler and device-info reporting.
pub trait Clock {
    /// Local time of day, or `None` while the wall clock is unsynced.
    fn wall_time(&self) -> Option<WallTime>;

    /// Formatted local date/time for status reporting, when synced.
    fn datetime(&self) -> Option<String>;

    /// Monotonic seconds since boot.
    fn uptime_secs(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Message bus (driven adapter: core → MQTT)
// ───────────────────────────────────────────────────────────────

/// Outbound half of the message bus. Inbound commands are delivered by
/// the transport adapter straight into the command dispatcher.
pub trait BusPort {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BusError>;

    fn is_connected(&self) -> bool;
}

/// Errors from [`BusPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// No broker session established.
    NotConnected,
    /// Transport-level publish failure.
    PublishFailed,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "bus not connected"),
            Self::PublishFailed => write!(f, "publish failed"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Scheduler task delegate
// ───────────────────────────────────────────────────────────────

/// Callback the scheduler invokes when a task comes due.
///
/// Decouples the scheduler from action execution: the scheduler
/// guarantees exactly-once dispatch per occurrence, the delegate
/// decides what a task actually does (the firmware maps a task to a
/// feed request).
pub trait TaskDelegate {
    fn on_task_due(&mut self, name: &str);
}

// ───────────────────────────────────────────────────────────────
// Network-ready delegate
// ───────────────────────────────────────────────────────────────

/// Downstream actions driven by connectivity readiness.
///
/// The connectivity manager calls `sync_time`, `start_bus` and
/// `start_scheduler` in that order, exactly once per process lifetime,
/// from whichever interface first obtains an address.
/// `refresh_remote_log` runs on every readiness event.
pub trait ReadyDelegate {
    fn sync_time(&mut self);

    fn start_bus(&mut self);

    fn start_scheduler(&mut self);

    fn refresh_remote_log(&mut self, rlog: &RemoteLogConfig);
}

// ───────────────────────────────────────────────────────────────
// Stepper (driven adapter: feeder driver → pulse generator)
// ───────────────────────────────────────────────────────────────

/// Pulse-train generation for the feed drum stepper. The real backend
/// is the RMT peripheral; simulation records calls.
pub trait StepperPort {
    /// Drive the enable line (active low on the DRV8825 board).
    fn set_enabled(&mut self, on: bool);

    fn set_direction(&mut self, forward: bool);

    /// Emit `count` step pulses with the given half-period in RMT
    /// ticks. Blocks until the train has been transmitted.
    fn pulse(&mut self, count: u16, half_period: u16) -> Result<(), crate::Error>;
}
