//! Command dispatcher.
//!
//! One dispatcher serves both remote surfaces: the HTTP router hands
//! it `(method, path, query, body)` tuples, the message-bus adapter
//! hands it `(topic, payload)` pairs. Every config mutation funnels
//! through the document stores (whole-document replace, serialized by
//! the storage lock) and every actuator trigger goes through the
//! single-slot feed mailbox, so the feeder task never observes a
//! half-written request.
//!
//! Response contract: `{"response": "<text>"}` on success,
//! `{"error": "<text>"}` on failure; HTTP status 200 on success, 404
//! for an unrecognized path/method, 400 for any other failure.

use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use serde_json::json;

use crate::app::commands::{FeedOverrides, FeedRequest};
use crate::app::events::{DeviceInfo, StatusReport, format_uptime};
use crate::app::ports::{BusPort, Clock, StoragePort, SystemPort};
use crate::config::{FeederState, NetworkConfig};
use crate::connectivity::ConnectivityManager;
use crate::drivers::feeder::FeedMailbox;
use crate::store::DocumentStore;
use crate::watchdog::RebootFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Dispatcher verdict, rendered by the HTTP adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    fn ok(text: &str) -> Self {
        info!("dispatch: {text}");
        Self {
            status: 200,
            body: json!({ "response": text }).to_string(),
        }
    }

    /// Success with a pre-rendered JSON body (document dumps).
    fn ok_json(body: String) -> Self {
        Self { status: 200, body }
    }

    fn bad_request(text: &str) -> Self {
        error!("dispatch: {text}");
        Self {
            status: 400,
            body: json!({ "error": text }).to_string(),
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            body: json!({ "error": "Method not found!" }).to_string(),
        }
    }
}

pub struct Dispatcher<S: StoragePort> {
    storage: Mutex<S>,
    net: Arc<DocumentStore<NetworkConfig>>,
    feed: Arc<DocumentStore<FeederState>>,
    mailbox: Arc<FeedMailbox>,
    reboot: Arc<RebootFlag>,
    conn: Arc<ConnectivityManager>,
    sys: Arc<dyn SystemPort + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<S: StoragePort> Dispatcher<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: S,
        net: Arc<DocumentStore<NetworkConfig>>,
        feed: Arc<DocumentStore<FeederState>>,
        mailbox: Arc<FeedMailbox>,
        reboot: Arc<RebootFlag>,
        conn: Arc<ConnectivityManager>,
        sys: Arc<dyn SystemPort + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            storage: Mutex::new(storage),
            net,
            feed,
            mailbox,
            reboot,
            conn,
            sys,
            clock,
        }
    }

    // ── HTTP surface ──────────────────────────────────────────

    pub fn route(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: Option<&str>,
    ) -> Response {
        match (path, method) {
            ("/service/config/network", Method::Get) => Response::ok_json(self.net.to_json()),
            ("/service/config/network", Method::Post) => {
                self.replace_document(&self.net.clone(), body)
            }
            ("/service/config/feed", Method::Get) => Response::ok_json(self.feed.to_json()),
            ("/service/config/feed", Method::Post) => {
                self.replace_document(&self.feed.clone(), body)
            }
            ("/service/config/factoryReset", Method::Post) => {
                if !has_param(query, "reset") {
                    return Response::bad_request("No reset");
                }
                self.factory_reset()
            }
            ("/service/reboot", Method::Post) => {
                if !has_param(query, "reboot") {
                    return Response::bad_request("No reboot");
                }
                warn!("dispatch: reboot requested, restart deferred");
                self.reboot.request();
                Response::ok("Reboot OK")
            }
            ("/service/upgrade", Method::Post) => self.start_upgrade(),
            ("/ui/deviceInfo", Method::Get) => {
                match serde_json::to_string_pretty(&self.device_info()) {
                    Ok(body) => Response::ok_json(body),
                    Err(_) => Response::bad_request("device info unavailable"),
                }
            }
            ("/ui/feed", Method::Post) => self.feed_command(body),
            _ => Response::not_found(),
        }
    }

    // ── Message-bus surface ───────────────────────────────────

    /// Inbound command from the per-device topic `<hostname>/in/#`.
    ///
    /// `<hostname>/in/json` expects a JSON object with `"feed": true`
    /// (plus optional drum-parameter overrides);
    /// `<hostname>/in/feed` expects a plain-text payload containing
    /// the keyword `ON`. Anything else is logged and dropped — there
    /// is no response channel on the bus side.
    pub fn handle_bus_message(&self, topic: &str, payload: &str) {
        info!("dispatch: bus message on '{topic}'");
        if topic.ends_with("/json") {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
                error!("dispatch: bus payload is not valid JSON");
                return;
            };
            if !value.is_object() {
                error!("dispatch: bus payload is not a JSON object");
                return;
            }
            if value.get("feed").and_then(serde_json::Value::as_bool) != Some(true) {
                return;
            }
            let overrides: FeedOverrides =
                serde_json::from_value(value).unwrap_or_default();
            self.trigger_feed(Some(overrides));
        } else if topic.ends_with("/feed") && payload.contains("ON") {
            self.trigger_feed(None);
        }
    }

    /// Serialize the current status onto the bus.
    pub fn publish_status(&self, bus: &mut impl BusPort) {
        if !bus.is_connected() {
            return;
        }
        let net = self.net.snapshot();
        let mut topic: heapless::String<96> = heapless::String::new();
        if topic.push_str(&net.hostname).is_err() || topic.push_str("/out/status").is_err() {
            error!("dispatch: status topic too long");
            return;
        }
        let report = self.status_report();
        match serde_json::to_string(&report) {
            Ok(payload) => {
                if let Err(e) = bus.publish(&topic, &payload) {
                    warn!("dispatch: status publish failed: {e}");
                }
            }
            Err(_) => error!("dispatch: status serialization failed"),
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn device_info(&self) -> DeviceInfo {
        let net = self.net.snapshot();
        DeviceInfo {
            free_memory: self.sys.free_heap(),
            uptime: format_uptime(self.clock.uptime_secs()),
            curdate: self.clock.datetime(),
            devicename: net.hostname.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            rssi: self.conn.sta_rssi(),
            addresses: self.conn.address_summary(),
        }
    }

    pub fn status_report(&self) -> StatusReport {
        let feed = self.feed.snapshot();
        StatusReport {
            device: self.device_info(),
            readings: feed.readings.clone(),
            tasks_total: feed.tasks.len(),
            tasks_done: feed.tasks.iter().filter(|t| t.done).count(),
        }
    }

    // ── Internals ─────────────────────────────────────────────

    fn replace_document<T: crate::store::Document>(
        &self,
        store: &DocumentStore<T>,
        body: Option<&str>,
    ) -> Response {
        let Some(body) = body else {
            return Response::bad_request("Missing request body");
        };
        let mut storage = self.storage_lock();
        match store.replace(&mut *storage, body) {
            Ok(()) => Response::ok("OK"),
            Err(crate::store::StoreError::Invalid(msg)) => Response::bad_request(msg),
            Err(_) => Response::bad_request("Is not a JSON object"),
        }
    }

    fn factory_reset(&self) -> Response {
        info!("dispatch: factory reset");
        let mut storage = self.storage_lock();
        match self.net.reset_to_default(&mut *storage) {
            Ok(()) => Response::ok("OK"),
            Err(e) => {
                // Defaults are active in memory even if the write failed.
                warn!("dispatch: factory reset persist failed: {e}");
                Response::ok("OK")
            }
        }
    }

    fn start_upgrade(&self) -> Response {
        let url = self.net.snapshot().upgrade_url.clone();
        if url.is_empty() {
            return Response::bad_request("No upgrade URL configured");
        }
        match self.sys.start_upgrade(&url) {
            Ok(()) => Response::ok("OTA OK"),
            Err(msg) => Response::bad_request(msg),
        }
    }

    fn feed_command(&self, body: Option<&str>) -> Response {
        let overrides = match body {
            None | Some("") => None,
            Some(text) => match serde_json::from_str::<FeedOverrides>(text) {
                Ok(o) => Some(o),
                Err(_) => return Response::bad_request("Is not a JSON object"),
            },
        };
        self.trigger_feed(overrides);
        Response::ok("Feed OK")
    }

    /// Resolve and enqueue a feed request. Overrides are folded into
    /// the in-memory feeder document first, so a follow-up status
    /// query reflects what the feeder is about to run.
    fn trigger_feed(&self, overrides: Option<FeedOverrides>) {
        if let Some(o) = overrides {
            if !o.is_empty() {
                self.feed.update_volatile(|s| s.feeder = o.apply(s.feeder));
            }
        }
        let params = self.feed.snapshot().feeder.clamped();
        info!(
            "dispatch: feed trigger ({} batches of {}+{})",
            params.step_count, params.step_fwd, params.step_rev
        );
        self.mailbox.request(FeedRequest { params });
    }

    fn storage_lock(&self) -> std::sync::MutexGuard<'_, S> {
        self.storage.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `query` is the raw query string (`a=1&b=2`); presence of the named
/// key is enough, the value is ignored.
fn has_param(query: Option<&str>, name: &str) -> bool {
    let Some(query) = query else {
        return false;
    };
    query
        .split('&')
        .any(|pair| pair.split('=').next() == Some(name))
}
