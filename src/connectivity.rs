//! Connectivity manager.
//!
//! Brings up Ethernet and/or WiFi-station per configuration, falls
//! back to a local access point when no upstream interface can start,
//! tracks per-interface readiness and runs the one-shot
//! post-connectivity initialisation.
//!
//! ```text
//!  Disabled ─▶ Starting ─▶ Connected ─▶ Disconnected ─▶ Starting…
//!                  │
//!                  └──(no upstream at all)──▶ AP fallback (terminal)
//! ```
//!
//! The manager owns interface state; the actual drivers sit behind
//! [`NetifPort`] so the whole state machine runs on the host. Address
//! assignment events arrive via [`ConnectivityManager::on_got_ip`],
//! called by the driver adapter's event handlers on the device and by
//! tests directly.
//!
//! Exactly-once guarantee: the first address assignment for which the
//! one-shot flag is still clear runs, strictly ordered, time sync →
//! message-bus start → scheduler start. Any later readiness event
//! (second interface, reconnect) only refreshes the remote-log target.
//! The flag is claimed with an atomic compare-exchange, so two
//! interfaces racing their first address cannot both run the sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use core::fmt;

use log::{error, info, warn};

use crate::app::ports::ReadyDelegate;
use crate::config::{EthConfig, NetworkConfig, WifiConfig};

/// Fallback access point credentials.
pub const AP_SSID: &str = "aquafeed-setup";
pub const AP_PASS: &str = "12345678";

// ───────────────────────────────────────────────────────────────
// Driver port
// ───────────────────────────────────────────────────────────────

/// Errors from interface drivers. All of them are non-fatal to the
/// process; the manager logs and falls through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// WiFi-station cannot start without an SSID.
    NoSsid,
    /// Driver install/start failed.
    DriverFailed(&'static str),
    /// Static address text could not be parsed.
    BadAddress(&'static str),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSsid => write!(f, "no SSID configured"),
            Self::DriverFailed(what) => write!(f, "driver failed: {what}"),
            Self::BadAddress(field) => write!(f, "bad address in {field}"),
        }
    }
}

/// Interface driver operations. The ESP-IDF adapter wires these to
/// the netif/WiFi/Ethernet stacks; the simulation adapter scripts
/// outcomes for tests.
pub trait NetifPort {
    fn start_eth(&mut self, cfg: &EthConfig, hostname: &str, dns: &str) -> Result<(), NetError>;

    fn start_sta(&mut self, cfg: &WifiConfig, hostname: &str, dns: &str) -> Result<(), NetError>;

    /// Start the fallback access point. Returns the AP's own address.
    fn start_ap(&mut self, ssid: &str, pass: &str) -> Result<String, NetError>;

    /// Kick an immediate station reconnect after a disconnect event.
    fn reconnect_sta(&mut self);

    /// Station signal strength, dBm, when associated.
    fn sta_rssi(&self) -> Option<i8>;
}

// ───────────────────────────────────────────────────────────────
// Interface state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iface {
    Eth,
    Sta,
    Ap,
}

impl Iface {
    pub fn label(self) -> &'static str {
        match self {
            Self::Eth => "ETH",
            Self::Sta => "WIFI",
            Self::Ap => "AP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disabled,
    Starting,
    Connected,
    Disconnected,
}

/// Per-interface bookkeeping, readable for telemetry.
#[derive(Debug, Clone)]
pub struct InterfaceState {
    pub enabled: bool,
    pub static_config: bool,
    pub address: String,
    pub ready: bool,
    pub link: LinkState,
}

impl InterfaceState {
    fn disabled() -> Self {
        Self {
            enabled: false,
            static_config: false,
            address: String::new(),
            ready: false,
            link: LinkState::Disabled,
        }
    }
}

/// How bring-up concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpOutcome {
    /// At least one upstream interface is starting.
    Upstream,
    /// No upstream interface could start; fallback AP is up.
    ApFallback,
}

// ───────────────────────────────────────────────────────────────
// Session (process-wide one-shot)
// ───────────────────────────────────────────────────────────────

/// Process-wide connectivity session flags.
#[derive(Debug, Default)]
pub struct ConnectivitySession {
    network_ready: AtomicBool,
    init_done: AtomicBool,
}

impl ConnectivitySession {
    fn mark_ready_once(&self) -> bool {
        self.network_ready.store(true, Ordering::Release);
        self.init_done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn network_ready(&self) -> bool {
        self.network_ready.load(Ordering::Acquire)
    }

    pub fn init_done(&self) -> bool {
        self.init_done.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────────
// Manager
// ───────────────────────────────────────────────────────────────

struct Interfaces {
    eth: InterfaceState,
    sta: InterfaceState,
    ap: InterfaceState,
    sta_rssi: Option<i8>,
}

pub struct ConnectivityManager {
    cfg: Arc<NetworkConfig>,
    session: ConnectivitySession,
    inner: Mutex<Interfaces>,
}

impl ConnectivityManager {
    pub fn new(cfg: Arc<NetworkConfig>) -> Self {
        let eth = InterfaceState {
            enabled: cfg.eth.enabled,
            static_config: !cfg.eth.dhcp,
            ..InterfaceState::disabled()
        };
        let sta = InterfaceState {
            enabled: cfg.wifi.enabled,
            static_config: !cfg.wifi.dhcp,
            ..InterfaceState::disabled()
        };
        Self {
            cfg,
            session: ConnectivitySession::default(),
            inner: Mutex::new(Interfaces {
                eth,
                sta,
                ap: InterfaceState::disabled(),
                sta_rssi: None,
            }),
        }
    }

    /// Start every enabled interface; fall back to the local access
    /// point when none of them starts. Driver failures are absorbed —
    /// connectivity problems never take the process down.
    pub fn bring_up(&self, drv: &mut impl NetifPort) -> BringUpOutcome {
        let mut eth_started = false;
        let mut sta_started = false;

        if self.cfg.eth.enabled {
            info!("net: starting ethernet");
            match drv.start_eth(&self.cfg.eth, &self.cfg.hostname, &self.cfg.dns) {
                Ok(()) => {
                    self.lock().eth.link = LinkState::Starting;
                    eth_started = true;
                }
                Err(e) => {
                    warn!("net: ethernet start failed: {e}");
                    self.lock().eth.link = LinkState::Disconnected;
                }
            }
        }

        if self.cfg.wifi.enabled {
            info!("net: starting wifi station");
            match drv.start_sta(&self.cfg.wifi, &self.cfg.hostname, &self.cfg.dns) {
                Ok(()) => {
                    self.lock().sta.link = LinkState::Starting;
                    sta_started = true;
                }
                Err(e) => {
                    warn!("net: wifi station start failed: {e}");
                    self.lock().sta.link = LinkState::Disconnected;
                }
            }
        }

        if eth_started || sta_started {
            return BringUpOutcome::Upstream;
        }

        // Terminal fallback: an unconfigured (or unstartable) device
        // still has to be reachable for provisioning.
        info!("net: no upstream interface, starting access point '{AP_SSID}'");
        match drv.start_ap(AP_SSID, AP_PASS) {
            Ok(addr) => {
                let mut g = self.lock();
                g.ap = InterfaceState {
                    enabled: true,
                    static_config: true,
                    address: addr,
                    ready: true,
                    link: LinkState::Connected,
                };
            }
            Err(e) => error!("net: access point start failed: {e}"),
        }
        BringUpOutcome::ApFallback
    }

    /// Link established (no address yet).
    pub fn on_link_up(&self, iface: Iface) {
        info!("net: {} link up", iface.label());
        self.with_iface(iface, |s| s.link = LinkState::Connected);
    }

    /// Link lost. Station links get an immediate reconnect kick; the
    /// Ethernet driver handles its own link recovery.
    pub fn on_link_down(&self, iface: Iface, drv: &mut impl NetifPort) {
        warn!("net: {} link down", iface.label());
        self.with_iface(iface, |s| {
            s.link = LinkState::Disconnected;
            s.ready = false;
            s.address.clear();
        });
        if iface == Iface::Sta {
            self.set_sta_rssi(None);
            self.with_iface(iface, |s| s.link = LinkState::Starting);
            drv.reconnect_sta();
        }
    }

    /// Address assigned (static applied, or DHCP lease arrived): the
    /// readiness event. Runs the one-shot init sequence on the first
    /// occurrence, refreshes remote logging on every occurrence.
    pub fn on_got_ip(&self, iface: Iface, address: &str, delegate: &mut impl ReadyDelegate) {
        info!("net: {} got address {address}", iface.label());
        self.with_iface(iface, |s| {
            s.link = LinkState::Connected;
            s.ready = true;
            s.address = address.to_string();
        });

        if self.session.mark_ready_once() {
            info!("net: network ready, running one-time init");
            delegate.sync_time();
            delegate.start_bus();
            delegate.start_scheduler();
        }
        if self.cfg.rlog.enabled {
            delegate.refresh_remote_log(&self.cfg.rlog);
        }
    }

    pub fn session(&self) -> &ConnectivitySession {
        &self.session
    }

    /// Cached station signal strength, refreshed by the driver
    /// adapter on connection events.
    pub fn sta_rssi(&self) -> Option<i8> {
        self.lock().sta_rssi
    }

    pub fn set_sta_rssi(&self, rssi: Option<i8>) {
        self.lock().sta_rssi = rssi;
    }

    /// Snapshot of one interface for telemetry.
    pub fn interface(&self, iface: Iface) -> InterfaceState {
        let g = self.lock();
        match iface {
            Iface::Eth => g.eth.clone(),
            Iface::Sta => g.sta.clone(),
            Iface::Ap => g.ap.clone(),
        }
    }

    /// Human-readable summary of every address currently held.
    pub fn address_summary(&self) -> String {
        let g = self.lock();
        let mut parts = Vec::new();
        for (label, s) in [("ETH", &g.eth), ("WIFI", &g.sta), ("AP", &g.ap)] {
            if s.ready && !s.address.is_empty() {
                parts.push(format!("{label} {}", s.address));
            }
        }
        if parts.is_empty() {
            "No network".to_string()
        } else {
            parts.join(" ")
        }
    }

    fn with_iface(&self, iface: Iface, f: impl FnOnce(&mut InterfaceState)) {
        let mut g = self.lock();
        let s = match iface {
            Iface::Eth => &mut g.eth,
            Iface::Sta => &mut g.sta,
            Iface::Ap => &mut g.ap,
        };
        f(s);
    }

    fn lock(&self) -> MutexGuard<'_, Interfaces> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
