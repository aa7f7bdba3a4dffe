//! Outbound status summaries.
//!
//! The structures serialized onto the message bus and returned by the
//! device-info endpoint. Assembled by the dispatcher from the config
//! snapshots, the connectivity manager and the system/clock ports.

use serde::Serialize;

use crate::config::SensorReadings;

/// Device summary: uptime, memory, identity and addressing.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub free_memory: u32,
    pub uptime: String,
    /// Local date/time, absent until time sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curdate: Option<String>,
    pub devicename: String,
    pub version: String,
    /// Station signal strength, dBm, when associated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i8>,
    pub addresses: String,
}

/// Feature-state summary published periodically on the bus.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub device: DeviceInfo,
    pub readings: SensorReadings,
    pub tasks_total: usize,
    pub tasks_done: usize,
}

/// `1d 02:34:56`-style uptime rendering.
pub fn format_uptime(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    if days > 0 {
        format!("{days}d {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}
