//! Typed configuration documents.
//!
//! The two persisted documents of the controller, deserialized from
//! human-readable JSON at the storage boundary and validated once at
//! load time. Remote updates replace a document wholesale; there is no
//! incremental patching.
//!
//! Defaults mirror the shipped factory configuration: WiFi station
//! enabled with DHCP and no credentials (which routes first boot into
//! the provisioning access point), Ethernet/MQTT/remote-log disabled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::Document;

/// Feed pulse half-period floor, RMT ticks. The drum stalls below this.
pub const MIN_FEED_SPEED: u16 = 500;

/// Default grace window for schedule tasks, minutes.
pub const DEFAULT_GRACE_MINUTES: u16 = 1;

fn default_grace() -> u16 {
    DEFAULT_GRACE_MINUTES
}

// ───────────────────────────────────────────────────────────────
// Network configuration document
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub eth: EthConfig,
    pub wifi: WifiConfig,
    /// DNS server applied with static addressing.
    pub dns: String,
    pub hostname: String,
    pub ntp_server: String,
    /// POSIX TZ string handed to the libc timezone machinery.
    pub ntp_tz: String,
    pub upgrade_url: String,
    pub mqtt: MqttConfig,
    pub rlog: RemoteLogConfig,
    pub watchdog: WatchdogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthConfig {
    pub enabled: bool,
    pub dhcp: bool,
    pub ip: String,
    pub netmask: String,
    pub gateway: String,
    /// PHY reset line. 0 matches boards wired to the default pin.
    pub reset_gpio: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub enabled: bool,
    pub ssid: String,
    pub pass: String,
    pub dhcp: bool,
    pub ip: String,
    pub netmask: String,
    pub gateway: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLogConfig {
    pub enabled: bool,
    pub server: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Restart when free heap drops below this many bytes. 0 disables
    /// the check.
    pub min_free_heap: u32,
}

impl Default for EthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dhcp: true,
            ip: "192.168.99.9".into(),
            netmask: "255.255.255.0".into(),
            gateway: "192.168.99.98".into(),
            reset_gpio: 0,
        }
    }
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ssid: String::new(),
            pass: String::new(),
            dhcp: true,
            ip: "192.168.99.10".into(),
            netmask: "255.255.255.0".into(),
            gateway: "192.168.99.98".into(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
        }
    }
}

impl Default for RemoteLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: "192.168.4.2".into(),
            port: 514,
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self { min_free_heap: 0 }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            eth: EthConfig::default(),
            wifi: WifiConfig::default(),
            dns: "192.168.99.98".into(),
            hostname: "aquafeed-0".into(),
            ntp_server: "pool.ntp.org".into(),
            ntp_tz: "UTC-6:00".into(),
            upgrade_url: String::new(),
            mqtt: MqttConfig::default(),
            rlog: RemoteLogConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

impl Document for NetworkConfig {
    const NAME: &'static str = "networkconfig";

    fn validate(&self) -> Result<(), &'static str> {
        if self.hostname.is_empty() || self.hostname.len() > 32 {
            return Err("hostname must be 1-32 bytes");
        }
        if !is_printable_ascii(&self.hostname) {
            return Err("hostname must be printable ASCII");
        }
        if self.wifi.ssid.len() > 32 {
            return Err("wifi.ssid must be at most 32 bytes");
        }
        if self.wifi.pass.len() > 64 {
            return Err("wifi.pass must be at most 64 bytes");
        }
        if self.mqtt.enabled && self.mqtt.url.is_empty() {
            return Err("mqtt.url required when mqtt.enabled");
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Feeder state document
// ───────────────────────────────────────────────────────────────

/// Feeder state: drum parameters, the schedule task list and the last
/// sensor readings. Sensor readings are refreshed in memory by the
/// sampling loops and ride along with the next persisted save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeederState {
    pub feeder: FeederParams,
    pub tasks: Vec<ScheduleTask>,
    pub readings: SensorReadings,
}

/// Stepper drum motion parameters. One feed cycle runs `step_count`
/// batches of `step_fwd` forward plus `step_rev` reverse pulses — the
/// back-and-forth shakes pellets loose instead of compacting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeederParams {
    /// Pulse half-period in RMT ticks; lower is faster.
    pub speed: u16,
    pub step_fwd: u16,
    pub step_rev: u16,
    pub step_count: u16,
}

impl Default for FeederParams {
    fn default() -> Self {
        Self {
            speed: 1000,
            step_fwd: 19,
            step_rev: 12,
            step_count: 100,
        }
    }
}

impl FeederParams {
    /// Copy with the speed floor applied.
    pub fn clamped(mut self) -> Self {
        self.speed = self.speed.max(MIN_FEED_SPEED);
        self
    }
}

/// One time-triggered task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTask {
    pub name: String,
    pub enabled: bool,
    /// Minutes since midnight, 0-1439.
    pub time: u16,
    /// Weekday filter, 0 = Sunday. Absent means every day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<Vec<u8>>,
    /// Minutes after `time` during which the task may still fire.
    #[serde(default = "default_grace")]
    pub grace: u16,
    /// Fired already today. Reset on midnight rollover.
    #[serde(default)]
    pub done: bool,
}

impl ScheduleTask {
    pub fn at(name: &str, time: u16) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            time,
            day_of_week: None,
            grace: DEFAULT_GRACE_MINUTES,
            done: false,
        }
    }
}

/// Last observed sensor values, keyed by probe ROM code for the
/// one-wire temperature bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorReadings {
    pub temperatures: BTreeMap<String, f32>,
    pub water_ok: bool,
    pub pressure_kpa: f32,
}

impl Default for SensorReadings {
    fn default() -> Self {
        Self {
            temperatures: BTreeMap::new(),
            water_ok: true,
            pressure_kpa: 0.0,
        }
    }
}

impl Default for FeederState {
    fn default() -> Self {
        Self {
            feeder: FeederParams::default(),
            tasks: Vec::new(),
            readings: SensorReadings::default(),
        }
    }
}

impl Document for FeederState {
    const NAME: &'static str = "feedconfig";

    fn validate(&self) -> Result<(), &'static str> {
        if self.feeder.step_count == 0 {
            return Err("feeder.step_count must be nonzero");
        }
        for task in &self.tasks {
            if task.time > 1439 {
                return Err("task.time must be 0-1439");
            }
            if let Some(days) = &task.day_of_week {
                if days.iter().any(|d| *d > 6) {
                    return Err("task.day_of_week entries must be 0-6");
                }
            }
        }
        Ok(())
    }
}
