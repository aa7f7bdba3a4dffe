//! Message-bus adapters.
//!
//! The device backend wraps the ESP-IDF MQTT client: it subscribes to
//! the per-device command topic `<hostname>/in/#` and hands every
//! inbound payload to the command dispatcher; outbound publishes go
//! through [`BusPort`]. [`SimBus`] records publishes for host tests.

use crate::app::ports::{BusError, BusPort};

// ───────────────────────────────────────────────────────────────
// Simulation backend
// ───────────────────────────────────────────────────────────────

/// Recording bus fake.
#[derive(Default)]
pub struct SimBus {
    pub connected: bool,
    pub published: Vec<(String, String)>,
}

impl SimBus {
    pub fn connected() -> Self {
        Self {
            connected: true,
            published: Vec::new(),
        }
    }

    pub fn last_publish(&self) -> Option<&(String, String)> {
        self.published.last()
    }
}

impl BusPort for SimBus {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BusError> {
        if !self.connected {
            return Err(BusError::NotConnected);
        }
        self.published.push((topic.to_string(), payload.to_string()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub mod esp {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use esp_idf_svc::mqtt::client::{
        EspMqttClient, EventPayload, MqttClientConfiguration, QoS,
    };
    use log::{info, warn};

    use super::{BusError, BusPort};

    pub struct EspBus {
        client: EspMqttClient<'static>,
        connected: Arc<AtomicBool>,
    }

    impl EspBus {
        /// Connect to the broker and subscribe to the command topic.
        /// `on_message` receives `(topic, payload)` for every inbound
        /// command; the caller passes a closure that forwards into the
        /// dispatcher.
        pub fn start(
            url: &str,
            hostname: &str,
            on_message: impl Fn(&str, &str) + Send + 'static,
        ) -> Result<Self, crate::Error> {
            let connected = Arc::new(AtomicBool::new(false));
            let connected_cb = connected.clone();
            let mut command_topic: heapless::String<96> = heapless::String::new();
            command_topic
                .push_str(hostname)
                .map_err(|()| crate::Error::Init("command topic too long"))?;
            command_topic
                .push_str("/in/#")
                .map_err(|()| crate::Error::Init("command topic too long"))?;

            let conf = MqttClientConfiguration {
                client_id: Some(hostname),
                ..Default::default()
            };
            let subscribe_topic = command_topic.clone();
            let client = EspMqttClient::new_cb(url, &conf, move |event| {
                match event.payload() {
                    EventPayload::Connected(_) => {
                        info!("bus: connected");
                        connected_cb.store(true, Ordering::Release);
                    }
                    EventPayload::Disconnected => {
                        warn!("bus: disconnected");
                        connected_cb.store(false, Ordering::Release);
                    }
                    EventPayload::Received { topic, data, .. } => {
                        if let (Some(topic), Ok(payload)) =
                            (topic, core::str::from_utf8(data))
                        {
                            on_message(topic, payload);
                        }
                    }
                    _ => {}
                }
            })
            .map_err(|_| crate::Error::Init("mqtt client"))?;

            let mut bus = Self { client, connected };
            // The broker session may not be up yet; the subscription
            // is retried from the service loop once connected.
            if let Err(e) = bus.client.subscribe(&subscribe_topic, QoS::AtMostOnce) {
                warn!("bus: initial subscribe deferred: {e}");
            }
            Ok(bus)
        }
    }

    impl BusPort for EspBus {
        fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BusError> {
            if !self.is_connected() {
                return Err(BusError::NotConnected);
            }
            self.client
                .publish(topic, QoS::AtMostOnce, false, payload.as_bytes())
                .map(|_| ())
                .map_err(|_| BusError::PublishFailed)
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Acquire)
        }
    }
}
