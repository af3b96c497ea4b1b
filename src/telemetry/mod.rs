//! # Telemetry Module
//!
//! Data model of the station link.
//!
//! This module handles:
//! - Parsing and validating solar/turbine readings and GPS fixes
//! - Rolling per-channel sample buffers for charting
//! - The capped, user-visible event log

pub mod buffer;
pub mod log;
pub mod types;

pub use buffer::{SampleBuffer, SeriesSnapshot};
pub use log::{LogEntry, LogRing, Severity};
pub use types::{Channel, GpsFix, SensorSample};
