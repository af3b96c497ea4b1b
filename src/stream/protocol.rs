//! # Stream Protocol
//!
//! JSON frames exchanged with the station backend over the WebSocket.
//!
//! Inbound frames carry a `type` discriminator:
//!
//! | `type`          | Payload                                        |
//! |-----------------|------------------------------------------------|
//! | `connection`    | optional `current_data` snapshot               |
//! | `sensor_data`   | `solar` and/or `turbine` readings              |
//! | `solar_data`    | `data` reading                                 |
//! | `turbine_data`  | `data` reading                                 |
//! | `gps_data`      | fix in `data` or `gps`                         |
//! | `status_data`   | free-form `data`                               |
//! | `system_status` | `mqtt_connected` broker flag                   |
//! | `keepalive`     | none; must be answered with `{"type":"ping"}`  |
//!
//! Unrecognized types decode to [`InboundMessage::Unknown`] so that newer
//! backends do not break older clients.
//!
//! Readings are kept as raw JSON here; validation happens when the
//! coordinator accepts them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{LinkError, Result};
use crate::telemetry::types::Channel;

/// Latest known station values, as sent in `connection` frames and returned
/// by the `/api/current` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StationSnapshot {
    #[serde(default)]
    pub solar: Option<Value>,
    #[serde(default)]
    pub turbine: Option<Value>,
    #[serde(default)]
    pub gps: Option<Value>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Sent once after the socket opens
    Connection {
        snapshot: Option<StationSnapshot>,
        broker_connected: Option<bool>,
    },
    /// Solar and turbine readings together
    SensorData {
        solar: Option<Value>,
        turbine: Option<Value>,
    },
    /// A reading for one channel
    ChannelData { channel: Channel, reading: Value },
    /// A GPS fix
    GpsData(Value),
    /// Informational station status
    StatusData(Option<Value>),
    /// Backend health, including its upstream broker link
    SystemStatus { broker_connected: Option<bool> },
    /// Backend liveness check
    Keepalive,
    /// Any other `type`
    Unknown(String),
}

/// Control frames sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    /// Keepalive acknowledgement
    Ping,
}

impl OutboundMessage {
    /// Serialize to the JSON text sent on the wire.
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| LinkError::Encode(format!("{:?}: {}", self, e)))
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    solar: Option<Value>,
    #[serde(default)]
    turbine: Option<Value>,
    #[serde(default)]
    gps: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    current_data: Option<Value>,
    #[serde(default)]
    mqtt_connected: Option<Value>,
}

/// Decode one inbound text frame.
///
/// # Arguments
///
/// * `text` - Frame payload as received
///
/// # Returns
///
/// * `Result<InboundMessage>` - Decoded message
///
/// # Errors
///
/// Returns [`LinkError::Decode`] if:
/// - The payload is not JSON or not a JSON object
/// - The `type` field is missing or not a string
/// - A channel or GPS frame carries no reading
///
/// # Examples
///
/// ```
/// use wattscope_link::stream::protocol::{decode_message, InboundMessage};
///
/// let message = decode_message(r#"{"type":"keepalive"}"#)?;
/// assert_eq!(message, InboundMessage::Keepalive);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn decode_message(text: &str) -> Result<InboundMessage> {
    let frame: RawFrame =
        serde_json::from_str(text).map_err(|e| LinkError::Decode(e.to_string()))?;

    if let Some(timestamp) = &frame.timestamp {
        debug!("Frame '{}' stamped {}", frame.kind, timestamp);
    }

    let broker_connected = frame.mqtt_connected.as_ref().and_then(Value::as_bool);

    let message = match frame.kind.as_str() {
        "connection" => InboundMessage::Connection {
            snapshot: frame.current_data.and_then(snapshot_from),
            broker_connected,
        },
        "sensor_data" => InboundMessage::SensorData {
            solar: frame.solar,
            turbine: frame.turbine,
        },
        "solar_data" => InboundMessage::ChannelData {
            channel: Channel::Solar,
            reading: frame.data.ok_or_else(|| missing("solar_data", "data"))?,
        },
        "turbine_data" => InboundMessage::ChannelData {
            channel: Channel::Turbine,
            reading: frame.data.ok_or_else(|| missing("turbine_data", "data"))?,
        },
        "gps_data" => InboundMessage::GpsData(
            frame
                .data
                .or(frame.gps)
                .ok_or_else(|| missing("gps_data", "data or gps"))?,
        ),
        "status_data" => InboundMessage::StatusData(frame.data),
        "system_status" => InboundMessage::SystemStatus { broker_connected },
        "keepalive" => InboundMessage::Keepalive,
        other => InboundMessage::Unknown(other.to_string()),
    };

    Ok(message)
}

/// A snapshot that is not an object is ignored; the frame itself still counts.
fn snapshot_from(value: Value) -> Option<StationSnapshot> {
    if !value.is_object() {
        debug!("Ignoring non-object current_data: {}", value);
        return None;
    }
    match serde_json::from_value(value) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            debug!("Ignoring unreadable current_data: {}", e);
            None
        }
    }
}

fn missing(kind: &str, field: &str) -> LinkError {
    LinkError::Decode(format!("'{}' frame has no {}", kind, field))
}
