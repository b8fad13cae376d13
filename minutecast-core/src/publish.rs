//! Publication of derived states and sensor discovery payloads.
//!
//! [`StatePublisher`] is the outbound port; adapters decide where messages go.
//! [`JsonLinesPublisher`] writes them as JSON lines to any writer, and a broker
//! client would implement the same trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use tokio::sync::Mutex;

pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

const DEVICE_ID: &str = "a63ca366-9eda-4301-9428-93b173d15b9a";

#[async_trait]
pub trait StatePublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<()>;
}

/// Topic names derived from a common prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn available(&self) -> String {
        format!("{}/available", self.prefix)
    }

    pub fn state(&self) -> String {
        format!("{}/state", self.prefix)
    }

    pub fn attributes(&self) -> String {
        format!("{}/attributes", self.prefix)
    }

    pub fn discovery(&self, sensor: Sensor) -> String {
        format!("homeassistant/sensor/{}/{}/config", self.prefix, sensor.object_id())
    }
}

/// Sensors announced for each derived field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Rain,
    RainStart,
    RainEnd,
}

impl Sensor {
    pub const ALL: [Sensor; 3] = [Sensor::Rain, Sensor::RainStart, Sensor::RainEnd];

    fn object_id(self) -> &'static str {
        match self {
            Sensor::Rain => "rain",
            Sensor::RainStart => "rainstart",
            Sensor::RainEnd => "rainend",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Sensor::Rain => "Rain Indicator",
            Sensor::RainStart => "Rain Start",
            Sensor::RainEnd => "Rain End",
        }
    }

    fn unique_suffix(self) -> &'static str {
        match self {
            Sensor::Rain => "accu",
            Sensor::RainStart => "rainstart",
            Sensor::RainEnd => "rainend",
        }
    }

    fn field(self) -> &'static str {
        match self {
            Sensor::Rain => "weather",
            Sensor::RainStart => "rain_start",
            Sensor::RainEnd => "rain_end",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// Home Assistant sensor discovery payload.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    pub value_template: String,
    pub json_attributes_topic: String,
    pub icon: String,
    pub availability_topic: String,
    pub payload_available: String,
    pub payload_not_available: String,
    pub device: Device,
    pub platform: String,
}

impl Registration {
    pub fn for_sensor(sensor: Sensor, topics: &Topics) -> Self {
        Self {
            name: sensor.name().to_string(),
            unique_id: format!("{DEVICE_ID}_{}", sensor.unique_suffix()),
            state_topic: topics.state(),
            value_template: format!("{{{{ value_json.{} }}}}", sensor.field()),
            json_attributes_topic: topics.state(),
            icon: "mdi:information-outline".to_string(),
            availability_topic: topics.available(),
            payload_available: PAYLOAD_ONLINE.to_string(),
            payload_not_available: PAYLOAD_OFFLINE.to_string(),
            device: Device {
                identifiers: vec![DEVICE_ID.to_string()],
                name: "Accu Weather MinuteCast".to_string(),
                manufacturer: "minutecast".to_string(),
                model: "minute-cast".to_string(),
            },
            platform: "mqtt".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Line<'a> {
    topic: &'a str,
    retain: bool,
    payload: serde_json::Value,
}

/// Writes each message as one JSON object per line.
///
/// JSON payloads are embedded as values, anything else as a string.
#[derive(Debug)]
pub struct JsonLinesPublisher<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> StatePublisher for JsonLinesPublisher<W> {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
        let payload = serde_json::from_slice(payload).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(payload).into_owned())
        });
        let line = serde_json::to_string(&Line { topic, retain, payload })
            .context("Failed to serialize published message")?;

        let mut out = self.out.lock().await;
        writeln!(out, "{line}").with_context(|| format!("Failed to publish on {topic}"))?;
        out.flush().context("Failed to flush publisher output")?;
        Ok(())
    }
}
