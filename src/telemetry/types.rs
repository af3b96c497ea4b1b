//! # Telemetry Types
//!
//! Sensor samples and GPS fixes, plus the lenient parsing rules applied to raw
//! readings coming from the backend or from the host API.
//!
//! Readings are parsed the way the station's dashboard always has: a field that
//! is present but not numeric counts as `0`, strings contribute their leading
//! numeric prefix (`"12.5V"` is 12.5), and a missing or zero power is derived
//! from voltage and current. NaN never leaves this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{LinkError, Result};

/// Longest string we are willing to scan for a numeric prefix.
const MAX_NUMERIC_TEXT_LEN: usize = 64;

/// One of the two physical sensor sources of the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Solar panel
    Solar,
    /// Wind turbine
    Turbine,
}

impl Channel {
    /// Both channels, in display order.
    pub const ALL: [Channel; 2] = [Channel::Solar, Channel::Turbine];

    /// Human readable label used in log entries.
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Solar => "Solar",
            Channel::Turbine => "Turbine",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single validated reading for one channel.
///
/// All three electrical values are finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorSample {
    /// Channel the reading belongs to
    pub channel: Channel,
    /// Voltage in volts
    pub voltage: f64,
    /// Current in amperes
    pub ampere: f64,
    /// Power in watts
    pub power: f64,
    /// Time the reading was accepted
    pub captured_at: DateTime<Utc>,
}

impl SensorSample {
    /// Build a sample from already-numeric values.
    ///
    /// Applies the same normalization as [`SensorSample::from_json`]: non-finite
    /// and negative values become `0`, and a missing or zero `power` is derived
    /// as `voltage × ampere`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use wattscope_link::telemetry::types::{Channel, SensorSample};
    ///
    /// let sample = SensorSample::new(Channel::Solar, 10.0, 2.0, None, Utc::now());
    /// assert_eq!(sample.power, 20.0);
    /// ```
    pub fn new(
        channel: Channel,
        voltage: f64,
        ampere: f64,
        power: Option<f64>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        let voltage = non_negative(voltage);
        let ampere = non_negative(ampere);
        let power = match power {
            Some(p) if p.is_finite() && p != 0.0 => non_negative(p),
            _ => non_negative(voltage * ampere),
        };

        Self {
            channel,
            voltage,
            ampere,
            power,
            captured_at,
        }
    }

    /// Parse a raw reading object such as `{"voltage": 220.5, "ampere": "5.1"}`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidSample`] if the value is not an object or if
    /// the `voltage` or `ampere` key is missing. Non-numeric values do not fail
    /// the reading; they count as `0`.
    pub fn from_json(channel: Channel, raw: &Value, captured_at: DateTime<Utc>) -> Result<Self> {
        let object = raw.as_object().ok_or_else(|| {
            LinkError::InvalidSample(format!("{} reading is not an object: {}", channel, raw))
        })?;

        let (Some(voltage), Some(ampere)) = (object.get("voltage"), object.get("ampere")) else {
            return Err(LinkError::InvalidSample(format!(
                "{} reading is missing voltage or ampere: {}",
                channel, raw
            )));
        };

        let power = object.get("power").map(coerce_number);

        Ok(Self::new(
            channel,
            coerce_number(voltage),
            coerce_number(ampere),
            power,
            captured_at,
        ))
    }
}

/// A validated GPS coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsFix {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl GpsFix {
    /// Create a fix, rejecting non-finite coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidSample`] if either coordinate is NaN or infinite.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(LinkError::InvalidSample(format!(
                "GPS coordinates are not finite: ({}, {})",
                latitude, longitude
            )));
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Parse a raw fix object such as `{"latitude": -7.25, "longitude": "112.75"}`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidSample`] if the value is not an object, a
    /// coordinate key is missing, or a coordinate does not parse to a finite number.
    pub fn from_json(raw: &Value) -> Result<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| LinkError::InvalidSample(format!("GPS fix is not an object: {}", raw)))?;

        let (Some(latitude), Some(longitude)) = (object.get("latitude"), object.get("longitude"))
        else {
            return Err(LinkError::InvalidSample(format!(
                "GPS fix is missing latitude or longitude: {}",
                raw
            )));
        };

        Self::new(coerce_number(latitude), coerce_number(longitude))
    }
}

/// Convert a JSON value to a number the way the dashboard always has.
///
/// Numbers pass through, strings yield their leading numeric prefix, and
/// everything else (including unparseable strings) yields NaN. Callers decide
/// what NaN means for them.
pub fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_numeric_prefix(s).unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Parse the longest leading numeric prefix of `text`, ignoring leading whitespace.
fn parse_numeric_prefix(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let scan = &trimmed[..floor_char_boundary(trimmed, MAX_NUMERIC_TEXT_LEN)];

    scan.char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .rev()
        .find_map(|end| scan[..end].parse::<f64>().ok())
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    (0..=max).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0)
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
