//! Remote log mirror.
//!
//! Sends status lines to a UDP collector (syslog-style plain text)
//! when the remote-log target is configured. The target is refreshed
//! by the connectivity ready handler on every readiness event, so a
//! config change takes effect on the next reconnect without a reboot.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Mutex;

use log::{info, warn};

use crate::config::RemoteLogConfig;

#[derive(Default)]
pub struct RemoteLog {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    socket: Option<UdpSocket>,
    target: Option<SocketAddr>,
}

impl RemoteLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-resolve and apply the configured target.
    pub fn refresh(&self, cfg: &RemoteLogConfig) {
        let mut inner = self.lock();
        if !cfg.enabled {
            inner.target = None;
            return;
        }
        match (cfg.server.as_str(), cfg.port).to_socket_addrs() {
            Ok(mut addrs) => {
                inner.target = addrs.next();
                if let Some(addr) = inner.target {
                    info!("rlog: forwarding to {addr}");
                }
            }
            Err(e) => {
                warn!("rlog: cannot resolve {}:{}: {e}", cfg.server, cfg.port);
                inner.target = None;
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().target.is_some()
    }

    /// Fire-and-forget one line to the collector.
    pub fn send(&self, line: &str) {
        let mut inner = self.lock();
        let Some(target) = inner.target else {
            return;
        };
        if inner.socket.is_none() {
            inner.socket = UdpSocket::bind("0.0.0.0:0").ok();
        }
        if let Some(socket) = &inner.socket {
            if socket.send_to(line.as_bytes(), target).is_err() {
                // Log forwarding is lossy; drop the socket and rebind
                // on the next send.
                inner.socket = None;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
