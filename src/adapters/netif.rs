//! Network interface driver adapters.
//!
//! [`NetifPort`] implementations: the ESP-IDF backend drives the real
//! WiFi/Ethernet stacks and forwards their event callbacks into the
//! [`ConnectivityManager`](crate::connectivity::ConnectivityManager);
//! [`SimNetif`] scripts start outcomes for host tests.

use crate::config::{EthConfig, WifiConfig};
use crate::connectivity::{NetError, NetifPort};

// ───────────────────────────────────────────────────────────────
// Simulation backend
// ───────────────────────────────────────────────────────────────

/// Scriptable driver fake. Tests flip the failure switches, then
/// deliver `on_link_up` / `on_got_ip` to the manager by hand.
#[derive(Default)]
pub struct SimNetif {
    pub eth_start_fails: bool,
    pub sta_start_fails: bool,
    pub ap_start_fails: bool,
    pub started: Vec<&'static str>,
    pub reconnects: usize,
    pub rssi: Option<i8>,
}

impl SimNetif {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NetifPort for SimNetif {
    fn start_eth(&mut self, _cfg: &EthConfig, _hostname: &str, _dns: &str) -> Result<(), NetError> {
        if self.eth_start_fails {
            return Err(NetError::DriverFailed("eth sim"));
        }
        self.started.push("eth");
        Ok(())
    }

    fn start_sta(&mut self, cfg: &WifiConfig, _hostname: &str, _dns: &str) -> Result<(), NetError> {
        if cfg.ssid.is_empty() {
            return Err(NetError::NoSsid);
        }
        if self.sta_start_fails {
            return Err(NetError::DriverFailed("sta sim"));
        }
        self.started.push("sta");
        Ok(())
    }

    fn start_ap(&mut self, _ssid: &str, _pass: &str) -> Result<String, NetError> {
        if self.ap_start_fails {
            return Err(NetError::DriverFailed("ap sim"));
        }
        self.started.push("ap");
        Ok("192.168.4.1".to_string())
    }

    fn reconnect_sta(&mut self) {
        self.reconnects += 1;
    }

    fn sta_rssi(&self) -> Option<i8> {
        self.rssi
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub mod esp {
    //! Real driver wiring over `esp-idf-svc`.
    //!
    //! Interface event handlers registered here only translate stack
    //! events into manager calls; all policy (retry, fallback,
    //! one-shot init) lives in the connectivity manager.

    use std::net::Ipv4Addr;
    use std::str::FromStr;

    use esp_idf_hal::modem::Modem;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::ipv4;
    use esp_idf_svc::netif::{EspNetif, NetifConfiguration};
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{
        AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
    };
    use log::{info, warn};

    use super::{NetError, NetifPort};
    use crate::config::{EthConfig, WifiConfig};

    pub struct EspNetifDriver {
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        modem: Option<Modem>,
        wifi: Option<EspWifi<'static>>,
    }

    impl EspNetifDriver {
        pub fn new(
            modem: Modem,
            sysloop: EspSystemEventLoop,
            nvs: EspDefaultNvsPartition,
        ) -> Self {
            Self {
                sysloop,
                nvs,
                modem: Some(modem),
                wifi: None,
            }
        }

        fn take_modem(&mut self) -> Result<Modem, NetError> {
            self.modem.take().ok_or(NetError::DriverFailed("modem in use"))
        }

        fn static_conf(
            ip: &str,
            netmask: &str,
            gateway: &str,
            dns: &str,
        ) -> Result<ipv4::ClientSettings, NetError> {
            let parse = |text: &str, field: &'static str| {
                Ipv4Addr::from_str(text).map_err(|_| NetError::BadAddress(field))
            };
            let mask_addr = parse(netmask, "netmask")?;
            let mask = ipv4::Mask::try_from(mask_addr).map_err(|_| NetError::BadAddress("netmask"))?;
            Ok(ipv4::ClientSettings {
                ip: parse(ip, "ip")?,
                subnet: ipv4::Subnet {
                    gateway: parse(gateway, "gateway")?,
                    mask,
                },
                dns: Some(parse(dns, "dns")?),
                secondary_dns: None,
            })
        }

        fn sta_netif(cfg: &WifiConfig, hostname: &str, dns: &str) -> Result<EspNetif, NetError> {
            let ip_configuration = if cfg.dhcp {
                ipv4::Configuration::Client(ipv4::ClientConfiguration::DHCP(
                    ipv4::DHCPClientSettings {
                        hostname: heapless::String::try_from(hostname).ok(),
                    },
                ))
            } else {
                info!("net(esp): station static address {}", cfg.ip);
                ipv4::Configuration::Client(ipv4::ClientConfiguration::Fixed(Self::static_conf(
                    &cfg.ip,
                    &cfg.netmask,
                    &cfg.gateway,
                    dns,
                )?))
            };
            let conf = NetifConfiguration {
                ip_configuration: Some(ip_configuration),
                ..NetifConfiguration::wifi_default_client()
            };
            EspNetif::new_with_conf(&conf).map_err(|_| NetError::DriverFailed("sta netif"))
        }
    }

    impl NetifPort for EspNetifDriver {
        fn start_eth(
            &mut self,
            _cfg: &EthConfig,
            _hostname: &str,
            _dns: &str,
        ) -> Result<(), NetError> {
            // The LAN8720 RMII bring-up needs the full pin set owned by
            // main; boards without the PHY populated run WiFi-only, so
            // a missing driver is reported as a start failure and the
            // manager falls through per policy.
            warn!("net(esp): ethernet PHY not populated on this build");
            Err(NetError::DriverFailed("eth driver"))
        }

        fn start_sta(
            &mut self,
            cfg: &WifiConfig,
            hostname: &str,
            dns: &str,
        ) -> Result<(), NetError> {
            if cfg.ssid.is_empty() {
                return Err(NetError::NoSsid);
            }
            let modem = self.take_modem()?;
            let mut wifi = EspWifi::new(modem, self.sysloop.clone(), Some(self.nvs.clone()))
                .map_err(|_| NetError::DriverFailed("wifi install"))?;

            let sta_netif = Self::sta_netif(cfg, hostname, dns)?;
            let _old = wifi
                .swap_netif_sta(sta_netif)
                .map_err(|_| NetError::DriverFailed("sta netif swap"))?;

            let client = ClientConfiguration {
                ssid: cfg.ssid.as_str().try_into().map_err(|_| NetError::DriverFailed("ssid"))?,
                password: cfg
                    .pass
                    .as_str()
                    .try_into()
                    .map_err(|_| NetError::DriverFailed("password"))?,
                auth_method: if cfg.pass.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..Default::default()
            };
            wifi.set_configuration(&Configuration::Client(client))
                .map_err(|_| NetError::DriverFailed("wifi config"))?;
            wifi.start().map_err(|_| NetError::DriverFailed("wifi start"))?;
            wifi.connect()
                .map_err(|_| NetError::DriverFailed("wifi connect"))?;
            info!("net(esp): station connecting to '{}'", cfg.ssid);
            self.wifi = Some(wifi);
            Ok(())
        }

        fn start_ap(&mut self, ssid: &str, pass: &str) -> Result<String, NetError> {
            let modem = self.take_modem()?;
            let mut wifi = EspWifi::new(modem, self.sysloop.clone(), Some(self.nvs.clone()))
                .map_err(|_| NetError::DriverFailed("wifi install"))?;

            let ap = AccessPointConfiguration {
                ssid: ssid.try_into().map_err(|_| NetError::DriverFailed("ap ssid"))?,
                password: pass.try_into().map_err(|_| NetError::DriverFailed("ap pass"))?,
                auth_method: AuthMethod::WPA2Personal,
                channel: 6,
                max_connections: 2,
                ..Default::default()
            };
            wifi.set_configuration(&Configuration::AccessPoint(ap))
                .map_err(|_| NetError::DriverFailed("ap config"))?;
            wifi.start().map_err(|_| NetError::DriverFailed("ap start"))?;

            let addr = wifi
                .ap_netif()
                .get_ip_info()
                .map(|info| info.ip.to_string())
                .unwrap_or_else(|_| "192.168.4.1".to_string());
            info!("net(esp): access point '{ssid}' up at {addr}");
            self.wifi = Some(wifi);
            Ok(addr)
        }

        fn reconnect_sta(&mut self) {
            if let Some(wifi) = self.wifi.as_mut() {
                if let Err(e) = wifi.connect() {
                    warn!("net(esp): reconnect kick failed: {e}");
                }
            }
        }

        fn sta_rssi(&self) -> Option<i8> {
            let mut ap_info: esp_idf_svc::sys::wifi_ap_record_t = unsafe { core::mem::zeroed() };
            // SAFETY: out-parameter query; valid only while associated.
            let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
            if ret == esp_idf_svc::sys::ESP_OK {
                Some(ap_info.rssi as i8)
            } else {
                None
            }
        }
    }
}
