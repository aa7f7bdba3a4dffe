//! First-boot and recovery scenarios.

use std::sync::Arc;

use aquafeed::adapters::netif::SimNetif;
use aquafeed::adapters::storage::MemStorage;
use aquafeed::app::ports::{ReadyDelegate, StoragePort};
use aquafeed::config::{FeederState, NetworkConfig, RemoteLogConfig};
use aquafeed::connectivity::{BringUpOutcome, ConnectivityManager, Iface};
use aquafeed::store::{Document, DocumentStore};

#[derive(Default)]
struct CountingDelegate {
    inits: usize,
}

impl ReadyDelegate for CountingDelegate {
    fn sync_time(&mut self) {
        self.inits += 1;
    }

    fn start_bus(&mut self) {}

    fn start_scheduler(&mut self) {}

    fn refresh_remote_log(&mut self, _rlog: &RemoteLogConfig) {}
}

/// Cold boot with nothing persisted: defaults are created, persisted,
/// the station is attempted (no SSID in the default document) and the
/// device lands in the provisioning access point.
#[test]
fn first_boot_creates_defaults_and_falls_back_to_ap() {
    let mut storage = MemStorage::new();
    assert!(!storage.exists(NetworkConfig::NAME));

    let net_store = DocumentStore::<NetworkConfig>::load(&mut storage);
    let feed_store = DocumentStore::<FeederState>::load(&mut storage);

    // Both documents now exist in storage with default contents.
    assert!(storage.exists(NetworkConfig::NAME));
    assert!(storage.exists(FeederState::NAME));
    let cfg = net_store.snapshot();
    assert!(cfg.wifi.enabled && cfg.wifi.dhcp);
    assert!(!cfg.eth.enabled);
    assert!(feed_store.snapshot().tasks.is_empty());

    // Default config has no SSID: station start fails, eth disabled,
    // so the manager starts the terminal AP fallback.
    let conn = ConnectivityManager::new(cfg);
    let mut drv = SimNetif::new();
    assert_eq!(conn.bring_up(&mut drv), BringUpOutcome::ApFallback);
    assert_eq!(drv.started, vec!["ap"]);

    let ap = conn.interface(Iface::Ap);
    assert!(ap.ready);
    assert_eq!(ap.address, "192.168.4.1");
    assert!(!conn.session().init_done());
}

/// A corrupted network document is regenerated from defaults at load;
/// the replacement is persisted immediately.
#[test]
fn corrupt_network_document_recovers_to_defaults() {
    let mut storage = MemStorage::new();
    storage
        .write(NetworkConfig::NAME, "{\"wifi\": \"definitely not an object\"")
        .unwrap();

    let net_store = DocumentStore::<NetworkConfig>::load(&mut storage);
    assert_eq!(*net_store.snapshot(), NetworkConfig::default());

    let persisted = storage.read(NetworkConfig::NAME).unwrap();
    let reparsed: NetworkConfig = serde_json::from_str(&persisted).unwrap();
    assert_eq!(reparsed, NetworkConfig::default());
}

/// A provisioned config brings the station up and the first DHCP lease
/// runs the one-shot init.
#[test]
fn provisioned_boot_reaches_ready() {
    let mut storage = MemStorage::new();
    let mut cfg = NetworkConfig::default();
    cfg.wifi.ssid = "reefhouse".into();
    cfg.wifi.pass = "corals4life".into();
    storage
        .write(NetworkConfig::NAME, &serde_json::to_string(&cfg).unwrap())
        .unwrap();

    let net_store = DocumentStore::<NetworkConfig>::load(&mut storage);
    let conn = ConnectivityManager::new(net_store.snapshot());
    let mut drv = SimNetif::new();
    let mut delegate = CountingDelegate::default();

    assert_eq!(conn.bring_up(&mut drv), BringUpOutcome::Upstream);
    assert_eq!(drv.started, vec!["sta"]);

    conn.on_link_up(Iface::Sta);
    conn.on_got_ip(Iface::Sta, "192.168.1.50", &mut delegate);

    assert!(conn.session().network_ready());
    assert!(conn.session().init_done());
    assert_eq!(delegate.inits, 1);
    assert_eq!(conn.address_summary(), "WIFI 192.168.1.50");
}

/// Station start succeeding is enough to skip the AP even when the
/// ethernet driver fails outright.
#[test]
fn eth_failure_with_working_station_stays_upstream() {
    let mut cfg = NetworkConfig::default();
    cfg.eth.enabled = true;
    cfg.wifi.ssid = "reefhouse".into();

    let conn = ConnectivityManager::new(Arc::new(cfg));
    let mut drv = SimNetif {
        eth_start_fails: true,
        ..Default::default()
    };
    assert_eq!(conn.bring_up(&mut drv), BringUpOutcome::Upstream);
    assert_eq!(drv.started, vec!["sta"]);
}
