//! Aquafeed firmware — ESP-IDF entry point.
//!
//! Bring-up order mirrors the orchestration contract: storage first,
//! then documents, then the service loops, then connectivity. The
//! one-shot post-connectivity initialisation (time sync → message bus
//! → scheduler) is driven by the connectivity manager through
//! [`ServiceDelegate`] when the first interface obtains an address.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────┐
//!  │ FsStorage ──▶ DocumentStore(network, feeder)             │
//!  │                        │                                 │
//!  │   HTTP ──▶ Dispatcher ◀── MQTT        ConnectivityMgr    │
//!  │                │                            │            │
//!  │           FeedMailbox ──▶ feeder loop   ServiceDelegate  │
//!  │                                        (sntp·bus·sched)  │
//!  │   watchdog tick (main thread) · sensor loop              │
//!  └──────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use log::{info, warn};

use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::WifiEvent;

use aquafeed::adapters::bus::esp::EspBus;
use aquafeed::adapters::http::esp::start_server;
use aquafeed::adapters::netif::esp::EspNetifDriver;
use aquafeed::adapters::rlog::RemoteLog;
use aquafeed::adapters::sntp::TimeSync;
use aquafeed::adapters::storage::{FsStorage, mount_spiffs};
use aquafeed::adapters::system::EspSystem;
use aquafeed::adapters::time::SystemClock;
use aquafeed::app::commands::FeedRequest;
use aquafeed::app::dispatch::Dispatcher;
use aquafeed::app::ports::{Clock, ReadyDelegate, TaskDelegate};
use aquafeed::config::{FeederState, NetworkConfig, RemoteLogConfig};
use aquafeed::connectivity::{ConnectivityManager, Iface, LinkState};
use aquafeed::drivers::feeder::{FeedMailbox, FeederDriver, rmt::RmtStepper};
use aquafeed::pins;
use aquafeed::runtime::{CancelToken, Ticker};
use aquafeed::scheduler::{POLL_PERIOD_SECS, Scheduler};
use aquafeed::sensors::pressure::PressureSensor;
use aquafeed::sensors::temperature::{TemperatureSampler, onewire::GpioOneWire};
use aquafeed::sensors::water_level::WaterLevelSensor;
use aquafeed::store::DocumentStore;
use aquafeed::watchdog::{HealthWatchdog, RebootFlag};

const STORAGE_ROOT: &str = "/config";
const SENSOR_PERIOD_SECS: u64 = 30;

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("aquafeed v{} starting", env!("CARGO_PKG_VERSION"));

    let peripherals = Peripherals::take().context("peripherals")?;
    let sysloop = EspSystemEventLoop::take().context("event loop")?;
    let nvs = EspDefaultNvsPartition::take().context("nvs")?;

    // ── Documents ─────────────────────────────────────────────
    mount_spiffs(STORAGE_ROOT)?;
    let mut fs = FsStorage::new(STORAGE_ROOT);
    let net_store = Arc::new(DocumentStore::<NetworkConfig>::load(&mut fs));
    let feed_store = Arc::new(DocumentStore::<FeederState>::load(&mut fs));
    let net_cfg = net_store.snapshot();

    // ── Shared services ───────────────────────────────────────
    let cancel = CancelToken::new();
    let sys = Arc::new(EspSystem::new());
    let clock = Arc::new(SystemClock::new());
    let reboot = Arc::new(RebootFlag::new());
    let mailbox = Arc::new(FeedMailbox::new());
    let rlog = Arc::new(RemoteLog::new());
    let conn = Arc::new(ConnectivityManager::new(net_cfg.clone()));
    let bus = Arc::new(Mutex::new(None::<EspBus>));

    let dispatcher = Arc::new(Dispatcher::new(
        fs,
        net_store.clone(),
        feed_store.clone(),
        mailbox.clone(),
        reboot.clone(),
        conn.clone(),
        sys.clone(),
        clock.clone(),
    ));

    // ── Feeder ────────────────────────────────────────────────
    let stepper = RmtStepper::new(
        peripherals.rmt.channel0,
        peripherals.pins.gpio15,
        peripherals.pins.gpio14.downgrade_output(),
        peripherals.pins.gpio13.downgrade_output(),
    )?;
    spawn_feeder(
        stepper,
        mailbox.clone(),
        dispatcher.clone(),
        bus.clone(),
        cancel.clone(),
    )?;

    // ── Sensors ───────────────────────────────────────────────
    spawn_sensors(feed_store.clone(), cancel.clone())?;

    // ── Connectivity ──────────────────────────────────────────
    let driver = Arc::new(Mutex::new(EspNetifDriver::new(
        peripherals.modem,
        sysloop.clone(),
        nvs,
    )));
    let delegate = Arc::new(Mutex::new(ServiceDelegate {
        cfg: net_cfg.clone(),
        time_sync: TimeSync::new(),
        rlog: rlog.clone(),
        bus: bus.clone(),
        dispatcher: dispatcher.clone(),
        feed_store: feed_store.clone(),
        mailbox: mailbox.clone(),
        clock: clock.clone(),
        cancel: cancel.clone(),
    }));

    let _wifi_sub = {
        let conn = conn.clone();
        let driver = driver.clone();
        sysloop.subscribe::<WifiEvent, _>(move |event| match event {
            WifiEvent::StaConnected(_) => conn.on_link_up(Iface::Sta),
            WifiEvent::StaDisconnected(_) => {
                conn.on_link_down(Iface::Sta, &mut *lock(&driver));
            }
            _ => {}
        })?
    };
    let _ip_sub = {
        let conn = conn.clone();
        let driver = driver.clone();
        let delegate = delegate.clone();
        sysloop.subscribe::<IpEvent, _>(move |event| {
            // Only the station runs DHCP on this build (the Ethernet
            // PHY is not populated), so every lease belongs to it.
            if let IpEvent::DhcpIpAssigned(assignment) = event {
                let addr = assignment.ip().to_string();
                conn.set_sta_rssi(lock(&driver).sta_rssi());
                conn.on_got_ip(Iface::Sta, &addr, &mut *lock(&delegate));
            }
        })?
    };

    let outcome = conn.bring_up(&mut *lock(&driver));
    info!("network bring-up: {outcome:?}");

    // Static addressing is applied synchronously at start, so those
    // interfaces are ready now without waiting for a DHCP event.
    if conn.interface(Iface::Sta).link == LinkState::Starting && !net_cfg.wifi.dhcp {
        conn.on_got_ip(Iface::Sta, &net_cfg.wifi.ip, &mut *lock(&delegate));
    }
    if conn.interface(Iface::Eth).link == LinkState::Starting && !net_cfg.eth.dhcp {
        conn.on_got_ip(Iface::Eth, &net_cfg.eth.ip, &mut *lock(&delegate));
    }

    // ── HTTP ──────────────────────────────────────────────────
    let _http = start_server(dispatcher.clone())?;

    // ── Watchdog (main thread is the 1 s service tick) ────────
    let mut watchdog = HealthWatchdog::new(net_cfg.watchdog.min_free_heap);
    let ticker = Ticker::every_secs(1, cancel.clone());
    while ticker.wait() {
        watchdog.tick(&reboot, &*sys);
    }
    Ok(())
}

fn lock<T>(mutex: &Arc<Mutex<T>>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Ready delegate ────────────────────────────────────────────

/// Downstream services started by the first readiness event.
struct ServiceDelegate {
    cfg: Arc<NetworkConfig>,
    time_sync: TimeSync,
    rlog: Arc<RemoteLog>,
    bus: Arc<Mutex<Option<EspBus>>>,
    dispatcher: Arc<Dispatcher<FsStorage>>,
    feed_store: Arc<DocumentStore<FeederState>>,
    mailbox: Arc<FeedMailbox>,
    clock: Arc<SystemClock>,
    cancel: CancelToken,
}

impl ReadyDelegate for ServiceDelegate {
    fn sync_time(&mut self) {
        self.time_sync.start(&self.cfg.ntp_server, &self.cfg.ntp_tz);
    }

    fn start_bus(&mut self) {
        if !self.cfg.mqtt.enabled {
            info!("bus: disabled in config");
            return;
        }
        let dispatcher = self.dispatcher.clone();
        match EspBus::start(&self.cfg.mqtt.url, &self.cfg.hostname, move |topic, payload| {
            dispatcher.handle_bus_message(topic, payload);
        }) {
            Ok(client) => *lock(&self.bus) = Some(client),
            Err(e) => warn!("bus: start failed: {e}"),
        }
    }

    fn start_scheduler(&mut self) {
        let clock = self.clock.clone();
        let feed_store = self.feed_store.clone();
        let mailbox = self.mailbox.clone();
        let dispatcher = self.dispatcher.clone();
        let bus = self.bus.clone();
        let rlog = self.rlog.clone();
        let cancel = self.cancel.clone();

        let spawned = std::thread::Builder::new()
            .name("scheduler".into())
            .stack_size(8 * 1024)
            .spawn(move || {
                let mut sched = Scheduler::new();
                let mut delegate = FeedTaskDelegate {
                    feed_store: feed_store.clone(),
                    mailbox,
                };
                let ticker = Ticker::every_secs(POLL_PERIOD_SECS, cancel);
                while ticker.wait() {
                    // Schedule times are meaningless until time sync.
                    let Some(now) = clock.wall_time() else {
                        continue;
                    };
                    let mut tasks = feed_store.snapshot().tasks.clone();
                    sched.poll(now, &mut tasks, &mut delegate);
                    feed_store.update_volatile(|s| s.tasks = tasks);

                    if let Some(bus) = lock(&bus).as_mut() {
                        dispatcher.publish_status(bus);
                    }
                    if rlog.is_active() {
                        if let Ok(line) = serde_json::to_string(&dispatcher.status_report()) {
                            rlog.send(&line);
                        }
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("scheduler: thread spawn failed: {e}");
        }
    }

    fn refresh_remote_log(&mut self, rlog: &RemoteLogConfig) {
        self.rlog.refresh(rlog);
    }
}

/// Maps a due schedule task to a feed request.
struct FeedTaskDelegate {
    feed_store: Arc<DocumentStore<FeederState>>,
    mailbox: Arc<FeedMailbox>,
}

impl TaskDelegate for FeedTaskDelegate {
    fn on_task_due(&mut self, name: &str) {
        info!("task '{name}' due, requesting feed");
        let params = self.feed_store.snapshot().feeder.clamped();
        self.mailbox.request(FeedRequest { params });
    }
}

// ── Service loops ─────────────────────────────────────────────

fn spawn_feeder(
    stepper: RmtStepper<'static>,
    mailbox: Arc<FeedMailbox>,
    dispatcher: Arc<Dispatcher<FsStorage>>,
    bus: Arc<Mutex<Option<EspBus>>>,
    cancel: CancelToken,
) -> Result<()> {
    let _ = std::thread::Builder::new()
        .name("feeder".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            let mut feeder = FeederDriver::new(stepper);
            let ticker = Ticker::every_secs(1, cancel);
            while ticker.wait() {
                let Some(request) = mailbox.try_take() else {
                    continue;
                };
                if let Err(e) = feeder.run_cycle(&request) {
                    warn!("feeder: cycle failed: {e}");
                }
                // Status changes on feed completion are pushed, not
                // only polled.
                if let Some(bus) = lock(&bus).as_mut() {
                    dispatcher.publish_status(bus);
                }
            }
        })
        .context("feeder thread")?;
    Ok(())
}

fn spawn_sensors(feed_store: Arc<DocumentStore<FeederState>>, cancel: CancelToken) -> Result<()> {
    let _ = std::thread::Builder::new()
        .name("sensors".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            let mut temperature = TemperatureSampler::new(GpioOneWire::new(pins::ONEWIRE_GPIO));
            temperature.init();
            let mut water = WaterLevelSensor::new(pins::WATER_LEVEL_GPIO);
            let pressure = PressureSensor::new(pins::PRESSURE_ADC_CHANNEL);

            let ticker = Ticker::every_secs(SENSOR_PERIOD_SECS, cancel);
            while ticker.wait() {
                let temps = temperature.sample();
                let water_ok = water.read();
                let kpa = pressure.read().kpa;
                feed_store.update_volatile(|s| {
                    for (rom, celsius) in &temps {
                        s.readings.temperatures.insert(rom.clone(), *celsius);
                    }
                    s.readings.water_ok = water_ok;
                    s.readings.pressure_kpa = kpa;
                });
            }
        })
        .context("sensor thread")?;
    Ok(())
}
