//! # Telemetry Coordinator
//!
//! Single authority over which data source feeds the charts.
//!
//! The coordinator owns every piece of mutable session state: both sample
//! buffers, the event log, the synthetic source, the timer table and the
//! connection state machine. It is a pure transition function: the runtime
//! feeds it one [`Event`] at a time and executes the returned [`Effect`]s.
//!
//! ## Source authority
//!
//! ```text
//!                   Connected
//! AwaitingConnection ───────────► LiveActive
//!         │                        │    ▲
//!         │ Closed                 │    │ Connected
//!         ▼                Closed  ▼    │
//!   FallbackActive ◄───────────────┘────┘
//! ```
//!
//! Live samples are accepted only in `LiveActive`, synthetic ticks only in
//! `FallbackActive`. Anything else is a logged no-op.

pub mod presenter;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, StartupMode};
use crate::error::Result;
use crate::scheduler::{Scheduler, TimerKind};
use crate::stream::protocol::{InboundMessage, OutboundMessage, StationSnapshot};
use crate::stream::transport::TransportEvent;
use crate::stream::{ClientEffect, ClientSignal, ConnectionState, StreamClient};
use crate::synthetic::SyntheticSource;
use crate::telemetry::{
    Channel, GpsFix, LogEntry, LogRing, SampleBuffer, SensorSample, Severity,
};

const MSG_INITIALIZED: &str = "System: Dashboard initialized, connecting to backend...";
const MSG_CONNECTED: &str = "WebSocket: Connected to backend server";
const MSG_DISCONNECTED: &str = "WebSocket: Disconnected, attempting reconnect...";
const MSG_CONNECTION_ERROR: &str = "WebSocket: Connection error";
const MSG_DISCONNECT_REQUESTED: &str = "WebSocket: Disconnected by user";
const MSG_SIMULATION: &str = "System: Running in simulation mode (demo data)";
const MSG_REFRESH: &str = "System: Manual refresh triggered";
const MSG_REFRESH_OK: &str = "System: Data refreshed from server";
const MSG_REFRESH_FAILED: &str = "System: Failed to refresh data from server";
const MSG_BROKER_UP: &str = "System: MQTT broker connected";
const MSG_BROKER_DOWN: &str = "System: MQTT broker disconnected";

/// Which source is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    /// Waiting for the first connection, or disconnected by the user
    AwaitingConnection,
    /// The live stream feeds the buffers
    LiveActive,
    /// The synthetic source feeds the buffers
    FallbackActive,
}

/// Calls from the host application.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCommand {
    /// Inject a reading for a channel
    InjectSample {
        channel: Channel,
        voltage: f64,
        ampere: f64,
        power: Option<f64>,
    },
    /// Inject a GPS fix
    InjectGps { latitude: f64, longitude: f64 },
    /// Append a log entry
    AddLog { message: String, severity: Severity },
    /// Reconnect now if not connected
    Reconnect,
    /// Close the connection and stay disconnected
    Disconnect,
    /// Pull the current snapshot over HTTP
    Refresh,
}

/// Inputs to the coordinator.
#[derive(Debug)]
pub enum Event {
    /// Session start
    Start,
    /// A requested transport open succeeded
    Opened,
    /// A requested transport open failed
    OpenFailed(String),
    /// Activity on the open transport
    Transport(TransportEvent),
    /// A scheduler timer fired
    TimerFired(TimerKind),
    /// A host API call
    Api(ApiCommand),
    /// A snapshot pull finished
    PullCompleted(Result<StationSnapshot>),
}

/// Updates handed to the presenter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Notification {
    Solar(SensorSample),
    Turbine(SensorSample),
    Gps(GpsFix),
    Log(LogEntry),
    ConnectionState(ConnectionState),
    BackendStatus(bool),
}

/// Work the runtime performs for the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open the transport; report `Opened` or `OpenFailed`
    OpenTransport,
    /// Close the transport; no event is expected back
    CloseTransport,
    /// Send a frame on the open transport
    Send(OutboundMessage),
    /// Start a snapshot pull; report `PullCompleted`
    PullSnapshot,
    /// Hand an update to the presenter
    Notify(Notification),
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub connected: bool,
    pub connection: ConnectionState,
    pub source: CoordinatorState,
    pub solar_points: usize,
    pub turbine_points: usize,
    pub log_entries: usize,
    pub last_fix: Option<GpsFix>,
}

/// Session orchestrator.
#[derive(Debug)]
pub struct TelemetryCoordinator {
    state: CoordinatorState,
    mode: StartupMode,
    fallback_enabled: bool,
    client: StreamClient,
    synthetic: SyntheticSource,
    scheduler: Scheduler,
    solar: SampleBuffer,
    turbine: SampleBuffer,
    log: LogRing,
    home: Option<GpsFix>,
    last_fix: Option<GpsFix>,
}

impl TelemetryCoordinator {
    /// Create a coordinator with an entropy-seeded synthetic source.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config, SyntheticSource::new(config.fallback.tick_interval()))
    }

    /// Create a coordinator using `synthetic` as the fallback source.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `synthetic` - Fallback generator; its tick interval drives the
    ///   periodic timer
    pub fn new(config: &Config, synthetic: SyntheticSource) -> Self {
        let home = GpsFix::new(config.station.latitude, config.station.longitude).ok();

        Self {
            state: CoordinatorState::AwaitingConnection,
            mode: config.station.mode,
            fallback_enabled: config.fallback.enabled,
            client: StreamClient::new(config.stream.reconnect_interval()),
            synthetic,
            scheduler: Scheduler::new(),
            solar: SampleBuffer::new(Channel::Solar, config.buffer.capacity),
            turbine: SampleBuffer::new(Channel::Turbine, config.buffer.capacity),
            log: LogRing::new(config.log.capacity),
            home,
            last_fix: None,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn buffer(&self, channel: Channel) -> &SampleBuffer {
        match channel {
            Channel::Solar => &self.solar,
            Channel::Turbine => &self.turbine,
        }
    }

    pub fn log(&self) -> &LogRing {
        &self.log
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn synthetic_running(&self) -> bool {
        self.synthetic.is_running()
    }

    pub fn last_fix(&self) -> Option<GpsFix> {
        self.last_fix
    }

    /// Earliest pending timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Remove and return the timers due at `now`, earliest first.
    pub fn due_timers(&mut self, now: Instant) -> Vec<TimerKind> {
        self.scheduler.pop_due(now)
    }

    /// Snapshot of the session for status queries.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            connected: self.client.is_connected(),
            connection: self.client.state(),
            source: self.state,
            solar_points: self.solar.len(),
            turbine_points: self.turbine.len(),
            log_entries: self.log.len(),
            last_fix: self.last_fix,
        }
    }

    /// Apply one event.
    ///
    /// # Arguments
    ///
    /// * `event` - What happened
    /// * `now` - Current time, used to arm timers
    ///
    /// # Returns
    ///
    /// * `Vec<Effect>` - Effects to execute, in order
    pub fn handle(&mut self, event: Event, now: Instant) -> Vec<Effect> {
        let mut out = Vec::new();

        match event {
            Event::Start => self.on_start(now, &mut out),
            Event::Opened => {
                let effects = self.client.on_open();
                self.apply_client(effects, now, &mut out);
            }
            Event::OpenFailed(reason) => {
                let effects = self.client.on_open_failed(&reason);
                self.apply_client(effects, now, &mut out);
            }
            Event::Transport(transport_event) => {
                let effects = match transport_event {
                    TransportEvent::Text(text) => self.client.on_message(&text),
                    TransportEvent::Error(reason) => self.client.on_error(&reason),
                    TransportEvent::Closed => self.client.on_closed(),
                };
                self.apply_client(effects, now, &mut out);
            }
            Event::TimerFired(TimerKind::Reconnect) => {
                let effects = self.client.on_reconnect_timer();
                self.apply_client(effects, now, &mut out);
            }
            Event::TimerFired(TimerKind::SyntheticTick) => self.on_synthetic_tick(&mut out),
            Event::Api(command) => self.on_api(command, now, &mut out),
            Event::PullCompleted(Ok(snapshot)) => {
                self.apply_snapshot(&snapshot, &mut out);
                self.push_log(Severity::Info, MSG_REFRESH_OK, &mut out);
            }
            Event::PullCompleted(Err(e)) => {
                warn!("Snapshot pull failed: {}", e);
                self.push_log(Severity::Warning, MSG_REFRESH_FAILED, &mut out);
            }
        }

        out
    }

    fn on_start(&mut self, now: Instant, out: &mut Vec<Effect>) {
        self.push_log(Severity::Info, MSG_INITIALIZED, out);

        if let Some(home) = self.home {
            self.last_fix = Some(home);
            out.push(Effect::Notify(Notification::Gps(home)));
        }

        match self.mode {
            StartupMode::Live => {
                let effects = self.client.connect();
                self.apply_client(effects, now, out);
            }
            StartupMode::Simulation => {
                info!("Simulation mode, not connecting to backend");
                self.start_synthetic(now, out);
            }
        }
    }

    fn on_api(&mut self, command: ApiCommand, now: Instant, out: &mut Vec<Effect>) {
        match command {
            ApiCommand::InjectSample {
                channel,
                voltage,
                ampere,
                power,
            } => {
                let sample = SensorSample::new(channel, voltage, ampere, power, Utc::now());
                self.record_sample(sample, out);
            }
            ApiCommand::InjectGps {
                latitude,
                longitude,
            } => match GpsFix::new(latitude, longitude) {
                Ok(fix) => self.apply_fix(fix, out),
                Err(e) => warn!("Dropping injected fix: {}", e),
            },
            ApiCommand::AddLog { message, severity } => self.push_log(severity, message, out),
            ApiCommand::Reconnect => {
                if self.mode == StartupMode::Simulation {
                    debug!("Reconnect ignored in simulation mode");
                    return;
                }
                let effects = self.client.force_reconnect();
                self.apply_client(effects, now, out);
            }
            ApiCommand::Disconnect => {
                let was_active = self.client.state() != ConnectionState::Disconnected
                    || self.client.reconnect_pending();
                let effects = self.client.disconnect();
                self.apply_client(effects, now, out);

                if was_active {
                    self.push_log(Severity::Info, MSG_DISCONNECT_REQUESTED, out);
                }
                if self.state == CoordinatorState::LiveActive {
                    self.state = CoordinatorState::AwaitingConnection;
                }
            }
            ApiCommand::Refresh => {
                self.push_log(Severity::Info, MSG_REFRESH, out);
                out.push(Effect::PullSnapshot);
            }
        }
    }

    fn apply_client(&mut self, effects: Vec<ClientEffect>, now: Instant, out: &mut Vec<Effect>) {
        for effect in effects {
            match effect {
                ClientEffect::OpenTransport => out.push(Effect::OpenTransport),
                ClientEffect::CloseTransport => out.push(Effect::CloseTransport),
                ClientEffect::Send(message) => out.push(Effect::Send(message)),
                ClientEffect::ArmReconnect(delay) => {
                    self.scheduler.schedule(TimerKind::Reconnect, delay, now)
                }
                ClientEffect::CancelReconnect => {
                    self.scheduler.cancel(TimerKind::Reconnect);
                }
                ClientEffect::Signal(signal) => self.on_signal(signal, now, out),
            }
        }
    }

    fn on_signal(&mut self, signal: ClientSignal, now: Instant, out: &mut Vec<Effect>) {
        match signal {
            ClientSignal::StateChanged(state) => {
                out.push(Effect::Notify(Notification::ConnectionState(state)))
            }
            ClientSignal::Connected => {
                self.push_log(Severity::Info, MSG_CONNECTED, out);
                self.stop_fallback();
                self.state = CoordinatorState::LiveActive;
            }
            ClientSignal::Closed => {
                self.push_log(Severity::Warning, MSG_DISCONNECTED, out);
                self.start_fallback(now, out);
            }
            ClientSignal::TransportError(_) => {
                self.push_log(Severity::Warning, MSG_CONNECTION_ERROR, out);
            }
            ClientSignal::Message(message) => self.on_message(message, out),
        }
    }

    fn on_message(&mut self, message: InboundMessage, out: &mut Vec<Effect>) {
        match message {
            InboundMessage::Connection {
                snapshot,
                broker_connected,
            } => {
                if let Some(snapshot) = snapshot {
                    self.apply_snapshot(&snapshot, out);
                }
                if let Some(up) = broker_connected {
                    out.push(Effect::Notify(Notification::BackendStatus(up)));
                }
            }
            InboundMessage::SensorData { solar, turbine } => {
                if let Some(raw) = solar {
                    self.accept_live(Channel::Solar, &raw, out);
                }
                if let Some(raw) = turbine {
                    self.accept_live(Channel::Turbine, &raw, out);
                }
            }
            InboundMessage::ChannelData { channel, reading } => {
                self.accept_live(channel, &reading, out)
            }
            InboundMessage::GpsData(raw) => self.accept_gps(&raw, out),
            InboundMessage::StatusData(data) => debug!("Station status: {:?}", data),
            InboundMessage::SystemStatus { broker_connected } => match broker_connected {
                Some(true) => {
                    out.push(Effect::Notify(Notification::BackendStatus(true)));
                    self.push_log(Severity::Info, MSG_BROKER_UP, out);
                }
                Some(false) => {
                    out.push(Effect::Notify(Notification::BackendStatus(false)));
                    self.push_log(Severity::Warning, MSG_BROKER_DOWN, out);
                }
                None => debug!("System status without broker flag"),
            },
            InboundMessage::Keepalive => debug!("Keepalive reached coordinator"),
            InboundMessage::Unknown(kind) => info!("Ignoring message of unknown type '{}'", kind),
        }
    }

    fn on_synthetic_tick(&mut self, out: &mut Vec<Effect>) {
        if self.state != CoordinatorState::FallbackActive || !self.synthetic.is_running() {
            debug!("Synthetic tick ignored while {:?}", self.state);
            return;
        }

        for sample in self.synthetic.generate(Utc::now()) {
            self.record_sample(sample, out);
        }
    }

    fn start_fallback(&mut self, now: Instant, out: &mut Vec<Effect>) {
        if !self.fallback_enabled {
            debug!("Fallback disabled, waiting for reconnect");
            self.state = CoordinatorState::AwaitingConnection;
            return;
        }
        self.start_synthetic(now, out);
    }

    /// Make synthetic data authoritative, whatever `fallback.enabled` says.
    fn start_synthetic(&mut self, now: Instant, out: &mut Vec<Effect>) {
        self.state = CoordinatorState::FallbackActive;
        if !self.synthetic.start() {
            return;
        }

        self.push_log(Severity::Info, MSG_SIMULATION, out);
        self.scheduler
            .schedule_periodic(TimerKind::SyntheticTick, self.synthetic.tick_interval(), now);
        for sample in self.synthetic.generate(Utc::now()) {
            self.record_sample(sample, out);
        }
    }

    fn stop_fallback(&mut self) {
        self.synthetic.stop();
        self.scheduler.cancel(TimerKind::SyntheticTick);
    }

    fn accept_live(&mut self, channel: Channel, raw: &Value, out: &mut Vec<Effect>) {
        if self.state != CoordinatorState::LiveActive {
            debug!("Dropping live {} reading while {:?}", channel, self.state);
            return;
        }

        match SensorSample::from_json(channel, raw, Utc::now()) {
            Ok(sample) => {
                self.record_sample(sample, out);
                let message = format!(
                    "{}: {:.2}V, {:.2}A, {:.2}W",
                    channel, sample.voltage, sample.ampere, sample.power
                );
                self.push_log(Severity::Info, message, out);
            }
            Err(e) => warn!("Dropping live reading: {}", e),
        }
    }

    fn accept_gps(&mut self, raw: &Value, out: &mut Vec<Effect>) {
        match GpsFix::from_json(raw) {
            Ok(fix) => self.apply_fix(fix, out),
            Err(e) => warn!("Dropping GPS fix: {}", e),
        }
    }

    fn apply_fix(&mut self, fix: GpsFix, out: &mut Vec<Effect>) {
        self.last_fix = Some(fix);
        out.push(Effect::Notify(Notification::Gps(fix)));
        let message = format!("GPS: Lat {:.4}, Lng {:.4}", fix.latitude, fix.longitude);
        self.push_log(Severity::Info, message, out);
    }

    fn apply_snapshot(&mut self, snapshot: &StationSnapshot, out: &mut Vec<Effect>) {
        let readings = [
            (Channel::Solar, snapshot.solar.as_ref()),
            (Channel::Turbine, snapshot.turbine.as_ref()),
        ];
        for (channel, raw) in readings {
            let Some(raw) = raw else { continue };
            match SensorSample::from_json(channel, raw, Utc::now()) {
                Ok(sample) => self.record_sample(sample, out),
                Err(e) => warn!("Dropping snapshot reading: {}", e),
            }
        }

        if let Some(raw) = &snapshot.gps {
            self.accept_gps(raw, out);
        }
    }

    fn record_sample(&mut self, sample: SensorSample, out: &mut Vec<Effect>) {
        let notification = match sample.channel {
            Channel::Solar => {
                self.solar.push(sample);
                Notification::Solar(sample)
            }
            Channel::Turbine => {
                self.turbine.push(sample);
                Notification::Turbine(sample)
            }
        };
        out.push(Effect::Notify(notification));
    }

    fn push_log(&mut self, severity: Severity, message: impl Into<String>, out: &mut Vec<Effect>) {
        let entry = LogEntry::now(severity, message);
        self.log.push(entry.clone());
        out.push(Effect::Notify(Notification::Log(entry)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use crate::synthetic::DEFAULT_TICK_INTERVAL;
    use serde_json::json;
    use std::time::Duration;

    fn coordinator_with(config: Config) -> TelemetryCoordinator {
        TelemetryCoordinator::new(&config, SyntheticSource::with_seed(DEFAULT_TICK_INTERVAL, 11))
    }

    fn coordinator() -> TelemetryCoordinator {
        coordinator_with(Config::default())
    }

    fn live(coordinator: &mut TelemetryCoordinator, now: Instant) {
        coordinator.handle(Event::Start, now);
        coordinator.handle(Event::Opened, now);
        assert_eq!(coordinator.state(), CoordinatorState::LiveActive);
    }

    fn text(frame: Value) -> Event {
        Event::Transport(TransportEvent::Text(frame.to_string()))
    }

    fn samples(effects: &[Effect], channel: Channel) -> Vec<SensorSample> {
        effects
            .iter()
            .filter_map(|effect| match (effect, channel) {
                (Effect::Notify(Notification::Solar(s)), Channel::Solar) => Some(*s),
                (Effect::Notify(Notification::Turbine(s)), Channel::Turbine) => Some(*s),
                _ => None,
            })
            .collect()
    }

    fn logs(effects: &[Effect]) -> Vec<LogEntry> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Notify(Notification::Log(entry)) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }

    fn gps_updates(effects: &[Effect]) -> Vec<GpsFix> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Notify(Notification::Gps(fix)) => Some(*fix),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_connects_and_shows_home() {
        let mut c = coordinator();
        let effects = c.handle(Event::Start, Instant::now());

        assert!(effects.contains(&Effect::OpenTransport));
        assert_eq!(logs(&effects)[0].message, MSG_INITIALIZED);
        assert_eq!(gps_updates(&effects), vec![GpsFix::new(-7.2575, 112.7521).unwrap()]);
        assert_eq!(c.state(), CoordinatorState::AwaitingConnection);
        assert_eq!(c.connection_state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_simulation_mode_never_connects() {
        let mut config = Config::default();
        config.station.mode = StartupMode::Simulation;
        let mut c = coordinator_with(config);

        let now = Instant::now();
        let effects = c.handle(Event::Start, now);
        assert!(!effects.contains(&Effect::OpenTransport));
        assert_eq!(c.state(), CoordinatorState::FallbackActive);
        assert_eq!(samples(&effects, Channel::Solar).len(), 1);
        assert_eq!(samples(&effects, Channel::Turbine).len(), 1);

        assert!(c.handle(Event::Api(ApiCommand::Reconnect), now).is_empty());
    }

    #[test]
    fn test_simulation_mode_ignores_fallback_switch() {
        let mut config = Config::default();
        config.station.mode = StartupMode::Simulation;
        config.fallback.enabled = false;
        let mut c = coordinator_with(config);

        let start = Instant::now();
        let effects = c.handle(Event::Start, start);
        assert!(!effects.contains(&Effect::OpenTransport));
        assert_eq!(c.state(), CoordinatorState::FallbackActive);
        assert_eq!(samples(&effects, Channel::Solar).len(), 1);
        assert!(c.scheduler().is_pending(TimerKind::SyntheticTick));

        let tick = start + DEFAULT_TICK_INTERVAL;
        assert_eq!(c.due_timers(tick), vec![TimerKind::SyntheticTick]);
        let effects = c.handle(Event::TimerFired(TimerKind::SyntheticTick), tick);
        assert_eq!(samples(&effects, Channel::Turbine).len(), 1);
        assert_eq!(c.status().solar_points, 2);
    }

    #[test]
    fn test_opened_goes_live() {
        let mut c = coordinator();
        let now = Instant::now();
        c.handle(Event::Start, now);
        let effects = c.handle(Event::Opened, now);

        assert_eq!(c.state(), CoordinatorState::LiveActive);
        assert!(effects.contains(&Effect::Notify(Notification::ConnectionState(
            ConnectionState::Connected
        ))));
        assert_eq!(logs(&effects)[0].message, MSG_CONNECTED);
        assert!(c.status().connected);
    }

    #[test]
    fn test_live_sensor_data_buffered_and_logged() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);

        let effects = c.handle(
            text(json!({
                "type": "sensor_data",
                "solar": {"voltage": 220, "ampere": 5, "power": 1100},
                "turbine": {"voltage": "230.5", "ampere": 6}
            })),
            now,
        );

        let solar = samples(&effects, Channel::Solar);
        let turbine = samples(&effects, Channel::Turbine);
        assert_eq!(solar.len(), 1);
        assert_eq!(turbine[0].power, 230.5 * 6.0);
        assert_eq!(c.buffer(Channel::Solar).len(), 1);
        assert_eq!(c.buffer(Channel::Turbine).len(), 1);

        let messages: Vec<String> = logs(&effects).into_iter().map(|e| e.message).collect();
        assert_eq!(
            messages,
            vec![
                "Solar: 220.00V, 5.00A, 1100.00W".to_string(),
                "Turbine: 230.50V, 6.00A, 1383.00W".to_string(),
            ]
        );
    }

    #[test]
    fn test_power_derived_when_missing() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);

        let effects = c.handle(
            text(json!({"type": "solar_data", "data": {"voltage": 10, "ampere": 2}})),
            now,
        );
        assert_eq!(samples(&effects, Channel::Solar)[0].power, 20.0);
    }

    #[test]
    fn test_non_numeric_voltage_counts_as_zero() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);

        let effects = c.handle(
            text(json!({"type": "turbine_data", "data": {"voltage": "abc", "ampere": 3}})),
            now,
        );
        let sample = samples(&effects, Channel::Turbine)[0];
        assert_eq!(sample.voltage, 0.0);
        assert_eq!(sample.ampere, 3.0);
        assert!(!sample.power.is_nan());
    }

    #[test]
    fn test_reading_missing_key_dropped() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);

        let effects = c.handle(text(json!({"type": "solar_data", "data": {"voltage": 220}})), now);
        assert!(effects.is_empty());
        assert!(c.buffer(Channel::Solar).is_empty());
    }

    #[test]
    fn test_invalid_gps_dropped() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);
        let before = c.last_fix();

        let effects = c.handle(
            text(json!({"type": "gps_data", "data": {"latitude": -7.25, "longitude": "abc"}})),
            now,
        );
        assert!(gps_updates(&effects).is_empty());
        assert!(!logs(&effects).iter().any(|e| e.message.starts_with("GPS:")));

        let effects = c.handle(
            Event::Api(ApiCommand::InjectGps {
                latitude: -7.25,
                longitude: f64::NAN,
            }),
            now,
        );
        assert!(effects.is_empty());
        assert_eq!(c.last_fix(), before);
    }

    #[test]
    fn test_valid_gps_forwarded_and_logged() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);

        let effects = c.handle(
            text(json!({"type": "gps_data", "gps": {"latitude": -7.257512, "longitude": 112.752149}})),
            now,
        );
        assert_eq!(gps_updates(&effects).len(), 1);
        assert_eq!(logs(&effects)[0].message, "GPS: Lat -7.2575, Lng 112.7521");
        assert_eq!(c.last_fix().map(|f| f.latitude), Some(-7.257512));
    }

    #[test]
    fn test_disconnect_starts_fallback_immediately() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);

        let effects = c.handle(Event::Transport(TransportEvent::Closed), now);

        assert_eq!(c.state(), CoordinatorState::FallbackActive);
        assert!(c.synthetic_running());
        assert_eq!(samples(&effects, Channel::Solar).len(), 1);
        assert_eq!(samples(&effects, Channel::Turbine).len(), 1);
        assert!(c.scheduler().is_pending(TimerKind::Reconnect));
        assert!(c.scheduler().is_pending(TimerKind::SyntheticTick));

        let messages: Vec<String> = logs(&effects).into_iter().map(|e| e.message).collect();
        assert!(messages.contains(&MSG_DISCONNECTED.to_string()));
        assert!(messages.contains(&MSG_SIMULATION.to_string()));
    }

    #[test]
    fn test_synthetic_ticks_feed_buffers() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);
        c.handle(Event::Transport(TransportEvent::Closed), now);

        let effects = c.handle(Event::TimerFired(TimerKind::SyntheticTick), now);
        assert_eq!(samples(&effects, Channel::Solar).len(), 1);
        assert!(logs(&effects).is_empty());
        assert_eq!(c.buffer(Channel::Solar).len(), 2);
    }

    #[test]
    fn test_reconnect_stops_synthetic() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);
        c.handle(Event::Transport(TransportEvent::Closed), now);

        let later = now + Duration::from_millis(5000);
        let due = c.due_timers(later);
        assert!(due.contains(&TimerKind::Reconnect));
        let effects = c.handle(Event::TimerFired(TimerKind::Reconnect), later);
        assert!(effects.contains(&Effect::OpenTransport));

        c.handle(Event::Opened, later);
        assert_eq!(c.state(), CoordinatorState::LiveActive);
        assert!(!c.synthetic_running());
        assert!(!c.scheduler().is_pending(TimerKind::SyntheticTick));
        assert!(!c.scheduler().is_pending(TimerKind::Reconnect));

        let before = c.buffer(Channel::Solar).len();
        let effects = c.handle(Event::TimerFired(TimerKind::SyntheticTick), later);
        assert!(effects.is_empty());
        assert_eq!(c.buffer(Channel::Solar).len(), before);
    }

    #[test]
    fn test_repeated_failures_keep_single_synthetic_timer() {
        let mut c = coordinator();
        let now = Instant::now();
        c.handle(Event::Start, now);
        c.handle(Event::OpenFailed("refused".to_string()), now);
        assert_eq!(c.state(), CoordinatorState::FallbackActive);
        assert_eq!(c.buffer(Channel::Solar).len(), 1);

        for _ in 0..3 {
            c.handle(Event::TimerFired(TimerKind::Reconnect), now);
            let effects = c.handle(Event::OpenFailed("refused".to_string()), now);
            assert!(samples(&effects, Channel::Solar).is_empty());
        }

        assert_eq!(c.scheduler().pending_count(), 2);
        assert_eq!(c.buffer(Channel::Solar).len(), 1);
    }

    #[test]
    fn test_open_failure_logs_error_then_disconnect() {
        let mut c = coordinator();
        let now = Instant::now();
        c.handle(Event::Start, now);
        let effects = c.handle(Event::OpenFailed("refused".to_string()), now);

        let entries = logs(&effects);
        assert_eq!(entries[0].message, MSG_CONNECTION_ERROR);
        assert_eq!(entries[0].severity, Severity::Warning);
        assert_eq!(entries[1].message, MSG_DISCONNECTED);
        assert_eq!(entries[1].severity, Severity::Warning);
    }

    #[test]
    fn test_disconnect_leaves_no_reconnect_pending() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);
        c.handle(Event::Transport(TransportEvent::Closed), now);
        assert!(c.scheduler().is_pending(TimerKind::Reconnect));

        c.handle(Event::Api(ApiCommand::Disconnect), now);
        assert!(!c.scheduler().is_pending(TimerKind::Reconnect));
    }

    #[test]
    fn test_disconnect_from_live_does_not_start_fallback() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);

        let effects = c.handle(Event::Api(ApiCommand::Disconnect), now);
        assert!(effects.contains(&Effect::CloseTransport));
        assert_eq!(c.state(), CoordinatorState::AwaitingConnection);
        assert!(!c.synthetic_running());
        assert!(!c.scheduler().is_pending(TimerKind::Reconnect));

        // The transport reports the close we asked for
        let effects = c.handle(Event::Transport(TransportEvent::Closed), now);
        assert!(effects.is_empty());
        assert!(!c.synthetic_running());
        assert_eq!(c.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_disconnect_keeps_running_fallback() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);
        c.handle(Event::Transport(TransportEvent::Closed), now);

        c.handle(Event::Api(ApiCommand::Disconnect), now);
        assert_eq!(c.state(), CoordinatorState::FallbackActive);
        assert!(c.synthetic_running());
        assert!(c.scheduler().is_pending(TimerKind::SyntheticTick));
    }

    #[test]
    fn test_force_reconnect() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);
        assert!(c.handle(Event::Api(ApiCommand::Reconnect), now).is_empty());

        c.handle(Event::Api(ApiCommand::Disconnect), now);
        let effects = c.handle(Event::Api(ApiCommand::Reconnect), now);
        assert!(effects.contains(&Effect::OpenTransport));
    }

    #[test]
    fn test_live_data_dropped_when_not_live() {
        let mut c = coordinator();
        let now = Instant::now();
        c.handle(Event::Start, now);

        let effects = c.handle(
            text(json!({"type": "solar_data", "data": {"voltage": 1, "ampere": 1}})),
            now,
        );
        assert!(effects.is_empty());
        assert!(c.buffer(Channel::Solar).is_empty());
    }

    #[test]
    fn test_synthetic_tick_ignored_when_not_fallback() {
        let mut c = coordinator();
        let now = Instant::now();
        c.handle(Event::Start, now);
        assert!(c.handle(Event::TimerFired(TimerKind::SyntheticTick), now).is_empty());
    }

    #[test]
    fn test_fallback_disabled() {
        let mut config = Config::default();
        config.fallback.enabled = false;
        let mut c = coordinator_with(config);
        let now = Instant::now();
        live(&mut c, now);

        let effects = c.handle(Event::Transport(TransportEvent::Closed), now);
        assert_eq!(c.state(), CoordinatorState::AwaitingConnection);
        assert!(samples(&effects, Channel::Solar).is_empty());
        assert!(c.scheduler().is_pending(TimerKind::Reconnect));
        assert!(!c.scheduler().is_pending(TimerKind::SyntheticTick));
    }

    #[test]
    fn test_keepalive_answered() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);
        let effects = c.handle(text(json!({"type": "keepalive"})), now);
        assert_eq!(effects, vec![Effect::Send(OutboundMessage::Ping)]);
    }

    #[test]
    fn test_malformed_frame_ignored() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);
        let effects = c.handle(Event::Transport(TransportEvent::Text("<html>".to_string())), now);
        assert!(effects.is_empty());
        assert_eq!(c.state(), CoordinatorState::LiveActive);
    }

    #[test]
    fn test_connection_snapshot_applied_without_sample_logs() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);

        let effects = c.handle(
            text(json!({
                "type": "connection",
                "current_data": {
                    "solar": {"voltage": 0, "ampere": 0, "power": 0},
                    "turbine": {"voltage": 210, "ampere": 5}
                },
                "mqtt_connected": true
            })),
            now,
        );
        assert_eq!(samples(&effects, Channel::Solar).len(), 1);
        assert_eq!(samples(&effects, Channel::Turbine)[0].power, 1050.0);
        assert!(logs(&effects).is_empty());
        assert!(effects.contains(&Effect::Notify(Notification::BackendStatus(true))));
    }

    #[test]
    fn test_system_status() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);

        let effects = c.handle(text(json!({"type": "system_status", "mqtt_connected": false})), now);
        assert!(effects.contains(&Effect::Notify(Notification::BackendStatus(false))));
        assert_eq!(logs(&effects)[0].severity, Severity::Warning);
    }

    #[test]
    fn test_status_data_and_unknown_are_quiet() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);
        let log_len = c.log().len();

        assert!(c.handle(text(json!({"type": "status_data", "data": {}})), now).is_empty());
        assert!(c.handle(text(json!({"type": "battery_data", "data": {}})), now).is_empty());
        assert_eq!(c.log().len(), log_len);
    }

    #[test]
    fn test_refresh_success() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);

        let effects = c.handle(Event::Api(ApiCommand::Refresh), now);
        assert!(effects.contains(&Effect::PullSnapshot));
        assert_eq!(logs(&effects)[0].message, MSG_REFRESH);

        let snapshot = StationSnapshot {
            solar: Some(json!({"voltage": 221, "ampere": 5})),
            turbine: None,
            gps: Some(json!({"latitude": -7.1, "longitude": 112.1})),
        };
        let effects = c.handle(Event::PullCompleted(Ok(snapshot)), now);
        assert_eq!(samples(&effects, Channel::Solar).len(), 1);
        let messages: Vec<String> = logs(&effects).into_iter().map(|e| e.message).collect();
        assert_eq!(
            messages,
            vec!["GPS: Lat -7.1000, Lng 112.1000".to_string(), MSG_REFRESH_OK.to_string()]
        );
    }

    #[test]
    fn test_refresh_failure() {
        let mut c = coordinator();
        let now = Instant::now();
        let effects = c.handle(
            Event::PullCompleted(Err(LinkError::Pull("connection refused".to_string()))),
            now,
        );
        let entries = logs(&effects);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, MSG_REFRESH_FAILED);
        assert_eq!(entries[0].severity, Severity::Warning);
        assert!(!effects.contains(&Effect::PullSnapshot));
    }

    #[test]
    fn test_injected_samples_accepted() {
        let mut c = coordinator();
        let now = Instant::now();
        let effects = c.handle(
            Event::Api(ApiCommand::InjectSample {
                channel: Channel::Turbine,
                voltage: 12.0,
                ampere: 2.5,
                power: None,
            }),
            now,
        );
        assert_eq!(samples(&effects, Channel::Turbine)[0].power, 30.0);
        assert_eq!(c.status().turbine_points, 1);
    }

    #[test]
    fn test_log_ring_capped() {
        let mut c = coordinator();
        let now = Instant::now();
        for i in 0..51 {
            c.handle(
                Event::Api(ApiCommand::AddLog {
                    message: format!("entry {}", i),
                    severity: Severity::Info,
                }),
                now,
            );
        }

        assert_eq!(c.log().len(), 50);
        assert!(!c.log().iter().any(|e| e.message == "entry 0"));
        assert_eq!(c.log().last().map(|e| e.message.as_str()), Some("entry 50"));
        assert_eq!(c.status().log_entries, 50);
    }

    #[test]
    fn test_status_report() {
        let mut c = coordinator();
        let now = Instant::now();
        live(&mut c, now);
        c.handle(Event::Transport(TransportEvent::Closed), now);

        let status = c.status();
        assert!(!status.connected);
        assert_eq!(status.connection, ConnectionState::Disconnected);
        assert_eq!(status.source, CoordinatorState::FallbackActive);
        assert_eq!(status.solar_points, 1);
        assert_eq!(status.turbine_points, 1);
    }
}
