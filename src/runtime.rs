//! # Session Runtime
//!
//! Single-task event loop driving the [`TelemetryCoordinator`].
//!
//! The loop waits on five sources with `tokio::select!`:
//! - host API commands from [`DashboardHandle`]s
//! - frames from the connection, while one is open
//! - the next scheduler deadline (reconnect, synthetic tick)
//! - completions of spawned connection attempts
//! - completions of spawned snapshot pulls
//!
//! Every event goes through the coordinator; the returned effects are
//! executed in order. Connection attempts and pulls run in their own tasks so
//! a slow backend never holds up timers or commands. No other task touches
//! coordinator state.

use std::future::pending;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::coordinator::presenter::{dispatch, Presenter};
use crate::coordinator::{ApiCommand, Effect, Event, StatusReport, TelemetryCoordinator};
use crate::error::{LinkError, Result};
use crate::pull::{SnapshotClient, SnapshotSource};
use crate::stream::protocol::StationSnapshot;
use crate::stream::transport::{Connection, Connector, TransportEvent, WsConnector};
use crate::telemetry::{Channel, Severity};

/// Depth of the host command queue.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Result of one connection attempt, tagged with its attempt number.
type OpenResult<C> = (u64, Result<C>);

#[derive(Debug)]
enum Command {
    Api(ApiCommand),
    Status(oneshot::Sender<StatusReport>),
    Shutdown,
}

/// Cloneable handle for talking to a running session.
///
/// Every call is queued into the session loop; none of them touches session
/// state directly.
#[derive(Debug, Clone)]
pub struct DashboardHandle {
    commands: mpsc::Sender<Command>,
}

impl DashboardHandle {
    /// Inject a solar reading. A missing or zero `power` is derived.
    pub async fn update_solar(&self, voltage: f64, ampere: f64, power: Option<f64>) -> Result<()> {
        self.inject(Channel::Solar, voltage, ampere, power).await
    }

    /// Inject a turbine reading. A missing or zero `power` is derived.
    pub async fn update_turbine(&self, voltage: f64, ampere: f64, power: Option<f64>) -> Result<()> {
        self.inject(Channel::Turbine, voltage, ampere, power).await
    }

    /// Inject a GPS fix. Non-finite coordinates are dropped by the session.
    pub async fn update_gps(&self, latitude: f64, longitude: f64) -> Result<()> {
        self.api(ApiCommand::InjectGps {
            latitude,
            longitude,
        })
        .await
    }

    /// Append an entry to the event log.
    pub async fn add_log(&self, message: impl Into<String>, severity: Severity) -> Result<()> {
        self.api(ApiCommand::AddLog {
            message: message.into(),
            severity,
        })
        .await
    }

    /// Reconnect now if not connected.
    pub async fn reconnect(&self) -> Result<()> {
        self.api(ApiCommand::Reconnect).await
    }

    /// Close the connection and cancel pending reconnects.
    pub async fn disconnect(&self) -> Result<()> {
        self.api(ApiCommand::Disconnect).await
    }

    /// Pull the current snapshot from the REST API.
    pub async fn refresh(&self) -> Result<()> {
        self.api(ApiCommand::Refresh).await
    }

    /// Query connection and buffer status.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::SessionClosed`] if the session has stopped.
    pub async fn status(&self) -> Result<StatusReport> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Status(reply)).await?;
        response.await.map_err(|_| LinkError::SessionClosed)
    }

    /// Stop the session loop and close the transport.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    async fn inject(&self, channel: Channel, voltage: f64, ampere: f64, power: Option<f64>) -> Result<()> {
        self.api(ApiCommand::InjectSample {
            channel,
            voltage,
            ampere,
            power,
        })
        .await
    }

    async fn api(&self, command: ApiCommand) -> Result<()> {
        self.send(Command::Api(command)).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| LinkError::SessionClosed)
    }
}

/// A running link between one backend and one presenter.
pub struct Session<C: Connector> {
    coordinator: TelemetryCoordinator,
    connector: Arc<C>,
    connection: Option<C::Connection>,
    presenter: Box<dyn Presenter>,
    snapshots: Arc<dyn SnapshotSource>,
    commands: mpsc::Receiver<Command>,
    attempt: u64,
    opening: Option<JoinHandle<()>>,
    open_tx: mpsc::UnboundedSender<OpenResult<C::Connection>>,
    open_rx: mpsc::UnboundedReceiver<OpenResult<C::Connection>>,
    pull_tx: mpsc::UnboundedSender<Result<StationSnapshot>>,
    pull_rx: mpsc::UnboundedReceiver<Result<StationSnapshot>>,
}

impl Session<WsConnector> {
    /// Build a WebSocket session from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Pull`] if the REST client cannot be built.
    pub fn from_config(
        config: &Config,
        presenter: Box<dyn Presenter>,
    ) -> Result<(Self, DashboardHandle)> {
        let connector = WsConnector::new(config.stream.url.clone(), config.stream.connect_timeout());
        let snapshots = SnapshotClient::new(&config.api.base_url, config.api.request_timeout())?;

        Ok(Self::new(
            TelemetryCoordinator::from_config(config),
            connector,
            presenter,
            Arc::new(snapshots),
        ))
    }
}

impl<C: Connector> Session<C> {
    /// Assemble a session from its parts.
    ///
    /// # Returns
    ///
    /// * `(Session, DashboardHandle)` - The session to [`run`](Session::run)
    ///   and a handle for the host application
    pub fn new(
        coordinator: TelemetryCoordinator,
        connector: C,
        presenter: Box<dyn Presenter>,
        snapshots: Arc<dyn SnapshotSource>,
    ) -> (Self, DashboardHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (open_tx, open_rx) = mpsc::unbounded_channel();
        let (pull_tx, pull_rx) = mpsc::unbounded_channel();

        let session = Self {
            coordinator,
            connector: Arc::new(connector),
            connection: None,
            presenter,
            snapshots,
            commands,
            attempt: 0,
            opening: None,
            open_tx,
            open_rx,
            pull_tx,
            pull_rx,
        };

        (session, DashboardHandle { commands: commands_tx })
    }

    /// Run until [`DashboardHandle::shutdown`] is called or every handle is
    /// dropped.
    pub async fn run(mut self) -> Result<()> {
        info!("Session started");
        self.process(Event::Start).await;

        loop {
            let deadline = self.coordinator.next_deadline();
            let connection_open = self.connection.as_ref().is_some_and(|c| c.is_open());

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Api(api)) => self.process(Event::Api(api)).await,
                    Some(Command::Status(reply)) => {
                        let _ = reply.send(self.coordinator.status());
                    }
                    Some(Command::Shutdown) | None => break,
                },
                event = next_event(&mut self.connection), if connection_open => {
                    if event == TransportEvent::Closed {
                        self.connection = None;
                    }
                    self.process(Event::Transport(event)).await;
                }
                _ = wait_for(deadline) => {
                    let now = Instant::now();
                    for kind in self.coordinator.due_timers(now) {
                        debug!("Timer {:?} fired", kind);
                        self.process(Event::TimerFired(kind)).await;
                    }
                }
                Some((attempt, result)) = self.open_rx.recv() => {
                    self.finish_open(attempt, result).await;
                }
                Some(result) = self.pull_rx.recv() => {
                    self.process(Event::PullCompleted(result)).await;
                }
            }
        }

        info!("Session stopping");
        self.abandon_open();
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
        Ok(())
    }

    async fn process(&mut self, event: Event) {
        let effects = self.coordinator.handle(event, Instant::now());
        for effect in effects {
            self.execute(effect).await;
        }
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::OpenTransport => self.start_open(),
            Effect::CloseTransport => {
                self.abandon_open();
                if let Some(mut connection) = self.connection.take() {
                    connection.close().await;
                }
            }
            Effect::Send(message) => {
                let Some(connection) = self.connection.as_mut() else {
                    warn!("Dropping {:?}: not connected", message);
                    return;
                };
                let sent = match message.to_text() {
                    Ok(text) => connection.send_text(text).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    warn!("Failed to send {:?}: {}", message, e);
                }
            }
            Effect::PullSnapshot => {
                let snapshots = Arc::clone(&self.snapshots);
                let results = self.pull_tx.clone();
                tokio::spawn(async move {
                    let _ = results.send(snapshots.fetch().await);
                });
            }
            Effect::Notify(notification) => {
                dispatch(self.presenter.as_mut(), &notification);
            }
        }
    }

    /// Start a connection attempt in its own task.
    fn start_open(&mut self) {
        self.abandon_open();
        self.attempt += 1;

        let attempt = self.attempt;
        let connector = Arc::clone(&self.connector);
        let results = self.open_tx.clone();
        self.opening = Some(tokio::spawn(async move {
            let _ = results.send((attempt, connector.connect().await));
        }));
    }

    /// Drop the in-flight attempt, if any. Its result will be ignored.
    fn abandon_open(&mut self) {
        if let Some(task) = self.opening.take() {
            debug!("Abandoning connection attempt {}", self.attempt);
            task.abort();
        }
    }

    async fn finish_open(&mut self, attempt: u64, result: Result<C::Connection>) {
        if attempt != self.attempt || self.opening.take().is_none() {
            debug!("Discarding result of abandoned connection attempt {}", attempt);
            if let Ok(mut stale) = result {
                stale.close().await;
            }
            return;
        }

        match result {
            Ok(connection) => {
                if let Some(mut previous) = self.connection.replace(connection) {
                    previous.close().await;
                }
                self.process(Event::Opened).await;
            }
            Err(e) => self.process(Event::OpenFailed(e.to_string())).await,
        }
    }
}

async fn next_event<T: Connection>(connection: &mut Option<T>) -> TransportEvent {
    match connection {
        Some(connection) => connection.next_event().await,
        None => pending::<TransportEvent>().await,
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}
