//! # Presenter
//!
//! The contract between the link and whatever displays it.
//!
//! The coordinator never calls a presenter directly; the session hands every
//! [`Notification`] to [`dispatch`]. Two headless presenters ship with the
//! crate: [`TracingPresenter`] for operators and [`JsonLinesPresenter`] for
//! piping into other tools.

use std::io::Write;
use tracing::{info, warn};

use super::Notification;
use crate::stream::ConnectionState;
use crate::telemetry::{GpsFix, LogEntry, SensorSample, Severity};

/// Consumer of dashboard updates.
#[cfg_attr(test, mockall::automock)]
pub trait Presenter: Send {
    /// A solar sample was buffered
    fn on_solar_update(&mut self, sample: &SensorSample);

    /// A turbine sample was buffered
    fn on_turbine_update(&mut self, sample: &SensorSample);

    /// The station moved (or its position was confirmed)
    fn on_gps_update(&mut self, fix: &GpsFix);

    /// An entry was appended to the event log
    fn on_log_entry(&mut self, entry: &LogEntry);

    /// The backend connection changed state
    fn on_connection_state_change(&mut self, state: ConnectionState);

    /// The backend reported its broker link up or down
    fn on_backend_status(&mut self, _broker_connected: bool) {}
}

/// Route a notification to the matching presenter callback.
pub fn dispatch(presenter: &mut dyn Presenter, notification: &Notification) {
    match notification {
        Notification::Solar(sample) => presenter.on_solar_update(sample),
        Notification::Turbine(sample) => presenter.on_turbine_update(sample),
        Notification::Gps(fix) => presenter.on_gps_update(fix),
        Notification::Log(entry) => presenter.on_log_entry(entry),
        Notification::ConnectionState(state) => presenter.on_connection_state_change(*state),
        Notification::BackendStatus(up) => presenter.on_backend_status(*up),
    }
}

/// Presenter that reports through `tracing`.
#[derive(Debug, Default)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn on_solar_update(&mut self, sample: &SensorSample) {
        info!(
            "Solar {:.2} V  {:.2} A  {:.2} W",
            sample.voltage, sample.ampere, sample.power
        );
    }

    fn on_turbine_update(&mut self, sample: &SensorSample) {
        info!(
            "Turbine {:.2} V  {:.2} A  {:.2} W",
            sample.voltage, sample.ampere, sample.power
        );
    }

    fn on_gps_update(&mut self, fix: &GpsFix) {
        info!("Station at {:.4}, {:.4}", fix.latitude, fix.longitude);
    }

    fn on_log_entry(&mut self, entry: &LogEntry) {
        let time = entry.time.format("%d/%m/%Y %H:%M:%S");
        match entry.severity {
            Severity::Info => info!("[{}] {}", time, entry.message),
            Severity::Warning | Severity::Error => warn!("[{}] {}", time, entry.message),
        }
    }

    fn on_connection_state_change(&mut self, state: ConnectionState) {
        info!("Connection {}", state);
    }

    fn on_backend_status(&mut self, broker_connected: bool) {
        info!("Backend broker {}", if broker_connected { "online" } else { "offline" });
    }
}

/// Presenter writing one JSON object per update.
///
/// Each line is the serialized [`Notification`].
///
/// # Examples
///
/// ```
/// use wattscope_link::coordinator::presenter::{JsonLinesPresenter, Presenter};
/// use wattscope_link::stream::ConnectionState;
///
/// let mut presenter = JsonLinesPresenter::new(Vec::new());
/// presenter.on_connection_state_change(ConnectionState::Connected);
/// let out = String::from_utf8(presenter.into_inner()).unwrap();
/// assert_eq!(out, "{\"event\":\"connection_state\",\"data\":\"connected\"}\n");
/// ```
#[derive(Debug)]
pub struct JsonLinesPresenter<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesPresenter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, notification: Notification) {
        let result = serde_json::to_writer(&mut self.writer, &notification)
            .map_err(std::io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush());

        if let Err(e) = result {
            warn!("Failed to write update: {}", e);
        }
    }
}

impl<W: Write + Send> Presenter for JsonLinesPresenter<W> {
    fn on_solar_update(&mut self, sample: &SensorSample) {
        self.write(Notification::Solar(*sample));
    }

    fn on_turbine_update(&mut self, sample: &SensorSample) {
        self.write(Notification::Turbine(*sample));
    }

    fn on_gps_update(&mut self, fix: &GpsFix) {
        self.write(Notification::Gps(*fix));
    }

    fn on_log_entry(&mut self, entry: &LogEntry) {
        self.write(Notification::Log(entry.clone()));
    }

    fn on_connection_state_change(&mut self, state: ConnectionState) {
        self.write(Notification::ConnectionState(state));
    }

    fn on_backend_status(&mut self, broker_connected: bool) {
        self.write(Notification::BackendStatus(broker_connected));
    }
}
