//! # Sample Buffer
//!
//! Fixed-capacity rolling time series for one channel, as consumed by chart
//! rendering. The four series (voltage, ampere, power, timestamp) are stored
//! side by side and always have the same length.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use super::types::{Channel, SensorSample};

/// Default number of points kept per channel.
pub const DEFAULT_CAPACITY: usize = 20;

/// Read-only copy of a channel's series, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSnapshot {
    pub channel: Channel,
    pub voltage: Vec<f64>,
    pub ampere: Vec<f64>,
    pub power: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl SeriesSnapshot {
    /// Number of points in each series.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when no point has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Chart axis labels (`HH:MM`, local time), one per point.
    pub fn labels(&self) -> Vec<String> {
        self.timestamps
            .iter()
            .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
            .collect()
    }
}

/// Rolling per-channel sample store with FIFO eviction.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use wattscope_link::telemetry::buffer::SampleBuffer;
/// use wattscope_link::telemetry::types::{Channel, SensorSample};
///
/// let mut buffer = SampleBuffer::new(Channel::Solar, 2);
/// for v in [1.0, 2.0, 3.0] {
///     buffer.push(SensorSample::new(Channel::Solar, v, 1.0, None, Utc::now()));
/// }
/// assert_eq!(buffer.snapshot().voltage, vec![2.0, 3.0]);
/// ```
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    channel: Channel,
    capacity: usize,
    voltage: VecDeque<f64>,
    ampere: VecDeque<f64>,
    power: VecDeque<f64>,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl SampleBuffer {
    /// Create an empty buffer holding at most `capacity` points.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(channel: Channel, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            channel,
            capacity,
            voltage: VecDeque::with_capacity(capacity + 1),
            ampere: VecDeque::with_capacity(capacity + 1),
            power: VecDeque::with_capacity(capacity + 1),
            timestamps: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Append a sample, evicting the oldest point from every series at once
    /// when the buffer is over capacity.
    ///
    /// Samples for another channel are ignored.
    pub fn push(&mut self, sample: SensorSample) {
        if sample.channel != self.channel {
            return;
        }

        self.voltage.push_back(sample.voltage);
        self.ampere.push_back(sample.ampere);
        self.power.push_back(sample.power);
        self.timestamps.push_back(sample.captured_at);

        if self.timestamps.len() > self.capacity {
            self.voltage.pop_front();
            self.ampere.pop_front();
            self.power.pop_front();
            self.timestamps.pop_front();
        }

        debug_assert!(self.is_consistent());
    }

    /// Copy of the current series, oldest first.
    pub fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            channel: self.channel,
            voltage: self.voltage.iter().copied().collect(),
            ampere: self.ampere.iter().copied().collect(),
            power: self.power.iter().copied().collect(),
            timestamps: self.timestamps.iter().copied().collect(),
        }
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<SensorSample> {
        Some(SensorSample {
            channel: self.channel,
            voltage: *self.voltage.back()?,
            ampere: *self.ampere.back()?,
            power: *self.power.back()?,
            captured_at: *self.timestamps.back()?,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    fn is_consistent(&self) -> bool {
        let n = self.timestamps.len();
        n <= self.capacity && self.voltage.len() == n && self.ampere.len() == n && self.power.len() == n
    }
}
