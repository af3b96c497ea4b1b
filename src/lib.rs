//! # WATTSCOPE Link Library
//!
//! Live telemetry link for a renewable-energy monitoring station (solar panel,
//! wind turbine and GPS).
//!
//! This library receives streaming sensor readings from the station backend
//! over a WebSocket, substitutes synthetic data while the backend is
//! unreachable, keeps rolling per-channel buffers for charting and maintains a
//! capped event log. Presentation is left to a [`coordinator::presenter::Presenter`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod pull;
pub mod runtime;
pub mod scheduler;
pub mod stream;
pub mod synthetic;
pub mod telemetry;
