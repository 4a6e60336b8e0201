//! Signal Bridge
//!
//! Subscribes to the event broker and forwards what the tracker cares about:
//! - `frigate/<camera>/audio/<type>`: `ON` / `OFF` audio events
//! - `frigate/<camera>/person`: current person count
//!
//! Retained messages are stale by definition and ignored. Signals are
//! stamped on arrival and go out over a bounded channel; the bridge never
//! blocks on a slow consumer.

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use tracker::{ExternalSignal, SignalEvent};

/// Signal bridge error types
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed payload on {topic}: {reason}")]
    Payload { topic: String, reason: String },

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Signal receiver dropped")]
    ChannelClosed,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Spawn the bridge at all
    pub enabled: bool,
    pub broker_host: String,
    pub broker_port: u16,
    pub keep_alive_secs: u64,
    /// Camera name used in the topic paths
    pub camera_name: String,
    pub client_id: String,
    /// Wait after a broker error before polling again (milliseconds)
    pub reconnect_delay_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1883,
            keep_alive_secs: 60,
            camera_name: "livingroom".to_string(),
            client_id: "ptz-tracker".to_string(),
            reconnect_delay_ms: 5000,
        }
    }
}

impl BridgeConfig {
    pub fn audio_topic(&self) -> String {
        format!("frigate/{}/audio/+", self.camera_name)
    }

    pub fn person_topic(&self) -> String {
        format!("frigate/{}/person", self.camera_name)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.broker_host.trim().is_empty() {
            return Err(BridgeError::Config("broker_host must not be empty".into()));
        }
        if self.camera_name.is_empty()
            || self.camera_name.contains(['+', '#', '/'])
        {
            return Err(BridgeError::Config(format!(
                "invalid camera_name '{}'",
                self.camera_name
            )));
        }
        if self.client_id.is_empty() {
            return Err(BridgeError::Config("client_id must not be empty".into()));
        }
        if self.keep_alive_secs == 0 || self.reconnect_delay_ms == 0 {
            return Err(BridgeError::Config(
                "keep_alive_secs and reconnect_delay_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Map one broker message to a tracker signal.
///
/// `Ok(None)` means "not for us" (retained, other topic, audio level
/// readings). Malformed person counts and unknown audio states are errors.
pub fn translate(
    camera: &str,
    topic: &str,
    payload: &[u8],
    retain: bool,
) -> Result<Option<ExternalSignal>, BridgeError> {
    if retain {
        return Ok(None);
    }

    let Some(rest) = topic
        .strip_prefix("frigate/")
        .and_then(|t| t.strip_prefix(camera))
        .and_then(|t| t.strip_prefix('/'))
    else {
        return Ok(None);
    };

    let text = std::str::from_utf8(payload).map_err(|e| BridgeError::Payload {
        topic: topic.to_string(),
        reason: e.to_string(),
    })?;
    let text = text.trim();

    if rest == "person" {
        let count = text.parse::<u32>().map_err(|e| BridgeError::Payload {
            topic: topic.to_string(),
            reason: format!("person count '{}': {}", text, e),
        })?;
        return Ok(Some(ExternalSignal::PersonCount(count)));
    }

    if let Some(kind) = rest.strip_prefix("audio/") {
        // Level topics (dBFS, rms) carry numbers, not events
        if kind == "dBFS" || kind == "rms" {
            return Ok(None);
        }
        return match text {
            "ON" => Ok(Some(ExternalSignal::Audio { active: true })),
            "OFF" => Ok(Some(ExternalSignal::Audio { active: false })),
            _ => Err(BridgeError::Payload {
                topic: topic.to_string(),
                reason: format!("unknown audio state '{}'", text),
            }),
        };
    }

    Ok(None)
}

/// MQTT subscriber feeding [`ExternalSignal`]s to the tracker
pub struct MqttSignalBridge {
    config: BridgeConfig,
    signals: mpsc::Sender<SignalEvent>,
    forwarded: u64,
}

impl MqttSignalBridge {
    pub fn new(config: BridgeConfig, signals: mpsc::Sender<SignalEvent>) -> Self {
        Self {
            config,
            signals,
            forwarded: 0,
        }
    }

    /// Signals forwarded so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Translate and forward one message. Returns whether a signal was sent.
    pub fn dispatch(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<bool, BridgeError> {
        let signal = match translate(&self.config.camera_name, topic, payload, retain) {
            Ok(Some(signal)) => signal,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!("Dropping message: {}", e);
                return Ok(false);
            }
        };

        let received_at = tokio::time::Instant::now().into_std();
        match self.signals.try_send(SignalEvent::new(signal, received_at)) {
            Ok(()) => {
                debug!(%signal, "Signal forwarded");
                self.forwarded += 1;
                Ok(true)
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(signal = %event.signal, "Signal queue full, dropping");
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(BridgeError::ChannelClosed),
        }
    }

    fn subscribe(&self, client: &AsyncClient) -> Result<(), BridgeError> {
        client.try_subscribe(self.config.audio_topic(), QoS::AtMostOnce)?;
        client.try_subscribe(self.config.person_topic(), QoS::AtMostOnce)?;
        Ok(())
    }

    /// Poll the broker until `shutdown` flips or the receiver goes away.
    ///
    /// Broker errors are logged and retried after the reconnect delay;
    /// rumqttc reconnects on the next poll.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<u64, BridgeError> {
        self.config.validate()?;

        let mut options = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker_host,
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));
        let (client, mut eventloop) = AsyncClient::new(options, 10);

        info!(
            "Signal bridge connecting to {}:{}",
            self.config.broker_host, self.config.broker_port
        );

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }
            let event = tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(
                        audio = %self.config.audio_topic(),
                        person = %self.config.person_topic(),
                        "MQTT connected, subscribing"
                    );
                    if let Err(e) = self.subscribe(&client) {
                        warn!("MQTT subscribe failed: {}", e);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Err(e) = self.dispatch(&publish.topic, &publish.payload, publish.retain) {
                        break Err(e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "MQTT connection error: {} (retrying in {}ms)",
                        e, self.config.reconnect_delay_ms
                    );
                    tokio::select! {
                        _ = shutdown.changed() => break Ok(()),
                        _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
                    }
                }
            }
        };

        if let Err(e) = client.try_disconnect() {
            debug!("MQTT disconnect: {}", e);
        }
        info!(forwarded = self.forwarded, "Signal bridge stopped");
        result.map(|()| self.forwarded)
    }
}
