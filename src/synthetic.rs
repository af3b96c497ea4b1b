//! # Synthetic Source
//!
//! Generates plausible solar and turbine readings while no live stream is
//! authoritative, so the charts keep moving during outages.
//!
//! The source only knows whether it is running and how to draw a reading. The
//! periodic timer is owned by the coordinator's scheduler.
//!
//! ## Ranges
//!
//! | Channel | Voltage (V) | Current (A) |
//! |---------|-------------|-------------|
//! | Solar   | 200 – 240   | 4 – 7       |
//! | Turbine | 210 – 250   | 5 – 8       |
//!
//! Power is `voltage × ampere`; all three values are rounded to 2 decimals.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use std::time::Duration;
use tracing::info;

use crate::telemetry::types::{Channel, SensorSample};

/// Default period between synthetic samples.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(2000);

/// Value ranges drawn for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelProfile {
    pub voltage: Range<f64>,
    pub ampere: Range<f64>,
}

/// Solar panel profile
pub static SOLAR_PROFILE: ChannelProfile = ChannelProfile {
    voltage: 200.0..240.0,
    ampere: 4.0..7.0,
};

/// Wind turbine profile
pub static TURBINE_PROFILE: ChannelProfile = ChannelProfile {
    voltage: 210.0..250.0,
    ampere: 5.0..8.0,
};

impl ChannelProfile {
    /// Profile for a channel.
    pub fn for_channel(channel: Channel) -> &'static ChannelProfile {
        match channel {
            Channel::Solar => &SOLAR_PROFILE,
            Channel::Turbine => &TURBINE_PROFILE,
        }
    }
}

/// Fallback data generator.
#[derive(Debug)]
pub struct SyntheticSource {
    running: bool,
    tick_interval: Duration,
    rng: StdRng,
}

impl SyntheticSource {
    /// Create a stopped source seeded from OS entropy.
    pub fn new(tick_interval: Duration) -> Self {
        Self::with_rng(tick_interval, StdRng::from_entropy())
    }

    /// Create a stopped source with a fixed seed.
    pub fn with_seed(tick_interval: Duration, seed: u64) -> Self {
        Self::with_rng(tick_interval, StdRng::seed_from_u64(seed))
    }

    fn with_rng(tick_interval: Duration, rng: StdRng) -> Self {
        Self {
            running: false,
            tick_interval,
            rng,
        }
    }

    /// Mark the source as running.
    ///
    /// # Returns
    ///
    /// * `bool` - true if the source was stopped and is now running; false if
    ///   it was already running (no-op)
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        info!("Synthetic source started ({}ms period)", self.tick_interval.as_millis());
        true
    }

    /// Mark the source as stopped.
    ///
    /// # Returns
    ///
    /// * `bool` - true if the source was running
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        info!("Synthetic source stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Draw one reading per channel, solar first.
    pub fn generate(&mut self, captured_at: DateTime<Utc>) -> [SensorSample; 2] {
        Channel::ALL.map(|channel| self.generate_channel(channel, captured_at))
    }

    /// Draw one reading for `channel`.
    pub fn generate_channel(&mut self, channel: Channel, captured_at: DateTime<Utc>) -> SensorSample {
        let profile = ChannelProfile::for_channel(channel);
        let voltage = round2(self.rng.gen_range(profile.voltage.clone()));
        let ampere = round2(self.rng.gen_range(profile.ampere.clone()));
        let power = round2(voltage * ampere);

        SensorSample {
            channel,
            voltage,
            ampere,
            power,
            captured_at,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_idempotent() {
        let mut source = SyntheticSource::with_seed(DEFAULT_TICK_INTERVAL, 7);
        assert!(source.start());
        assert!(!source.start());
        assert!(source.is_running());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut source = SyntheticSource::with_seed(DEFAULT_TICK_INTERVAL, 7);
        assert!(!source.stop());
        source.start();
        assert!(source.stop());
        assert!(!source.stop());
        assert!(!source.is_running());
    }

    #[test]
    fn test_generated_values_within_ranges() {
        let mut source = SyntheticSource::with_seed(DEFAULT_TICK_INTERVAL, 42);
        for _ in 0..1000 {
            let [solar, turbine] = source.generate(Utc::now());

            assert_eq!(solar.channel, Channel::Solar);
            assert!((200.0..=240.0).contains(&solar.voltage));
            assert!((4.0..=7.0).contains(&solar.ampere));

            assert_eq!(turbine.channel, Channel::Turbine);
            assert!((210.0..=250.0).contains(&turbine.voltage));
            assert!((5.0..=8.0).contains(&turbine.ampere));
        }
    }

    #[test]
    fn test_power_is_rounded_product() {
        let mut source = SyntheticSource::with_seed(DEFAULT_TICK_INTERVAL, 3);
        for _ in 0..100 {
            let sample = source.generate_channel(Channel::Turbine, Utc::now());
            assert_eq!(sample.power, round2(sample.voltage * sample.ampere));
            assert_eq!(sample.power, round2(sample.power));
            assert_eq!(sample.voltage, round2(sample.voltage));
        }
    }

    #[test]
    fn test_same_seed_same_readings() {
        let at = Utc::now();
        let mut a = SyntheticSource::with_seed(DEFAULT_TICK_INTERVAL, 99);
        let mut b = SyntheticSource::with_seed(DEFAULT_TICK_INTERVAL, 99);
        assert_eq!(a.generate(at), b.generate(at));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(1.235_1), 1.24);
        assert_eq!(round2(220.0), 220.0);
    }
}
