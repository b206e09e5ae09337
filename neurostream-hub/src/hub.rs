//! StreamHub actor
//!
//! A single task owns the session state and the client registry; everything
//! reaches it through one mpsc command queue, so there are no locks and no
//! partially-applied state transitions. Each command is handled to
//! completion before the next is taken, which is what makes the
//! recording-flag/loop-handle pair atomic. Device connects are the one slow
//! operation: they run as detached tasks that report back through the same
//! queue, so a 15-second discovery scan never stalls the other clients.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use neurostream_board::{
    BoardError, ConnectionHint, DefaultBackendFactory, DeviceEndpoint, DeviceLocator,
    DeviceSession, LinkSettings, SyntheticBackendFactory, DEFAULT_MIN_WINDOW_SAMPLES,
};
use neurostream_dsp::{MetricExtractor, MetricSample};
use neurostream_store::{EventStore, RemoteStore};

use crate::acquisition::{self, AcquisitionHandle, LoopDeps, DEFAULT_POLL_PERIOD};
use crate::client::{ClientId, ClientRegistry};
use crate::events::{BroadcastEvent, ControlMessage, ParseFailure};
use crate::state::{snapshot_channel, SessionState, StateSnapshot};

/// Produces a streaming `DeviceSession` from a connection hint. The hub only
/// sees this seam, so tests and `--synthetic` runs swap the hardware out.
pub trait SessionConnector: Send + Sync {
    fn connect(&self, hint: &ConnectionHint) -> Result<DeviceSession, BoardError>;
}

/// Production connector: two-tier connect over real serial hardware.
pub struct BoardConnector {
    pub settings: LinkSettings,
    pub builtin_radio_path: Option<String>,
    pub min_window_samples: usize,
}

impl Default for BoardConnector {
    fn default() -> Self {
        Self {
            settings: LinkSettings::default(),
            builtin_radio_path: None,
            min_window_samples: DEFAULT_MIN_WINDOW_SAMPLES,
        }
    }
}

impl SessionConnector for BoardConnector {
    fn connect(&self, hint: &ConnectionHint) -> Result<DeviceSession, BoardError> {
        let mut factory = DefaultBackendFactory::new(self.settings.clone());
        factory.builtin_radio_path = self.builtin_radio_path.clone();

        let mut session = DeviceSession::new(Box::new(factory), self.min_window_samples);
        let endpoint = session.connect_auto(hint, &DeviceLocator::new())?;
        session.start_stream()?;
        info!(endpoint = %endpoint, "recording session established");
        Ok(session)
    }
}

/// Hardware-free connector for tests and `--synthetic` runs.
pub struct SyntheticConnector {
    pub sample_rate: u32,
    pub samples_per_read: usize,
    pub min_window_samples: usize,
}

impl Default for SyntheticConnector {
    fn default() -> Self {
        Self {
            sample_rate: 250,
            samples_per_read: 250,
            min_window_samples: DEFAULT_MIN_WINDOW_SAMPLES,
        }
    }
}

impl SessionConnector for SyntheticConnector {
    fn connect(&self, _hint: &ConnectionHint) -> Result<DeviceSession, BoardError> {
        let factory = SyntheticBackendFactory {
            sample_rate: self.sample_rate,
            samples_per_read: self.samples_per_read,
        };
        let mut session = DeviceSession::new(Box::new(factory), self.min_window_samples);
        session.connect(&DeviceEndpoint::serial_usb("synthetic"), None)?;
        session.start_stream()?;
        Ok(session)
    }
}

/// Commands accepted by the hub task.
pub enum HubCommand {
    /// New WebSocket connection; replies with the assigned id after catch-up.
    Register {
        sender: UnboundedSender<Message>,
        reply: oneshot::Sender<ClientId>,
    },
    Deregister {
        client: ClientId,
    },
    /// Raw text frame from a client; parsed and dispatched by the hub.
    Control {
        client: ClientId,
        raw: String,
    },
    /// Metric sample from the acquisition loop, stamped with its mode.
    Sample {
        sample: MetricSample,
        mode: String,
    },
    /// The acquisition loop died on its own.
    StreamFailed {
        message: String,
    },
    /// A detached connect task finished (internal).
    ConnectFinished {
        client: ClientId,
        result: Result<DeviceSession, BoardError>,
    },
    Shutdown,
}

pub struct HubConfig {
    pub poll_period: Duration,
    /// Config/env connection defaults, overlaid under per-message fields.
    pub default_hint: ConnectionHint,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            poll_period: DEFAULT_POLL_PERIOD,
            default_hint: ConnectionHint::default(),
        }
    }
}

/// Handle to a running hub task.
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    task: JoinHandle<()>,
}

impl HubHandle {
    pub fn commands(&self) -> mpsc::Sender<HubCommand> {
        self.commands.clone()
    }

    /// Stop any active recording and wind the hub down.
    pub async fn shutdown(self) {
        let _ = self.commands.send(HubCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!("hub task did not shut down cleanly: {e}");
        }
    }
}

pub struct StreamHub {
    state: SessionState,
    clients: ClientRegistry,
    snapshot_tx: watch::Sender<StateSnapshot>,
    connector: Arc<dyn SessionConnector>,
    store: Arc<EventStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    config: HubConfig,
    /// Loop-to-hub sender handed to each acquisition task.
    loopback: mpsc::Sender<HubCommand>,
    recording: Option<AcquisitionHandle>,
    /// A connect task is in flight; guards against a second one.
    connecting: bool,
}

impl StreamHub {
    /// Spawn the hub actor task.
    pub fn spawn(
        connector: Arc<dyn SessionConnector>,
        store: Arc<EventStore>,
        remote: Option<Arc<dyn RemoteStore>>,
        config: HubConfig,
    ) -> HubHandle {
        let (tx, rx) = mpsc::channel(256);
        let (snapshot_tx, _) = snapshot_channel();

        let hub = Self {
            state: SessionState::default(),
            clients: ClientRegistry::new(),
            snapshot_tx,
            connector,
            store,
            remote,
            config,
            loopback: tx.clone(),
            recording: None,
            connecting: false,
        };

        let task = tokio::spawn(hub.run(rx));
        HubHandle { commands: tx, task }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<HubCommand>) {
        info!("stream hub started");
        while let Some(command) = commands.recv().await {
            match command {
                HubCommand::Register { sender, reply } => {
                    let id = self.clients.register(sender);
                    // Catch-up: one mode_changed so the client knows where
                    // the session stands.
                    self.clients.send_to(
                        id,
                        &BroadcastEvent::ModeChanged {
                            mode: self.state.mode.clone(),
                        },
                    );
                    let _ = reply.send(id);
                }
                HubCommand::Deregister { client } => {
                    self.clients.deregister(client);
                }
                HubCommand::Control { client, raw } => {
                    self.handle_control(client, &raw).await;
                }
                HubCommand::Sample { sample, mode } => {
                    // Samples still queued behind a stop are dropped, never
                    // replayed after recording_stopped.
                    if !self.state.recording {
                        continue;
                    }
                    let timestamp = sample.timestamp.timestamp() as f64
                        + f64::from(sample.timestamp.timestamp_subsec_micros()) / 1.0e6;
                    self.clients.broadcast(&BroadcastEvent::EegData {
                        data: sample,
                        mode,
                        timestamp,
                    });
                }
                HubCommand::StreamFailed { message } => {
                    self.handle_stream_failed(message).await;
                }
                HubCommand::ConnectFinished { client, result } => {
                    self.handle_connect_finished(client, result);
                }
                HubCommand::Shutdown => break,
            }
        }

        if let Some(handle) = self.recording.take() {
            handle.stop().await;
            self.state.recording = false;
        }
        info!("stream hub stopped");
    }

    async fn handle_control(&mut self, client: ClientId, raw: &str) {
        let message = match ControlMessage::parse(raw) {
            Ok(message) => message,
            Err(ParseFailure::InvalidJson) => {
                self.clients
                    .send_to(client, &BroadcastEvent::error("Invalid JSON"));
                return;
            }
            Err(ParseFailure::InvalidMessage) => {
                self.clients
                    .send_to(client, &BroadcastEvent::error("Invalid message"));
                return;
            }
        };

        match message {
            ControlMessage::SetMode { mode } => {
                info!(%mode, "mode changed");
                self.state.mode = mode.clone();
                self.publish_snapshot();
                self.clients.broadcast(&BroadcastEvent::ModeChanged { mode });
            }
            ControlMessage::SetContext { context } => {
                self.state.context = context;
                self.publish_snapshot();
            }
            ControlMessage::SetUser { user_id } => {
                info!(%user_id, "active user changed");
                self.state.user_id = user_id;
                self.publish_snapshot();
            }
            ControlMessage::StartRecording {
                serial_port,
                mac_address,
                dongle_port,
            } => {
                let hint = ConnectionHint {
                    serial_port,
                    mac_address,
                    dongle_port,
                };
                self.handle_start(client, hint);
            }
            ControlMessage::StopRecording => {
                self.handle_stop().await;
            }
        }
    }

    /// Kick off a detached connect task. Serial handshakes and discovery
    /// scans block for seconds, so the hub keeps serving other clients and
    /// picks the outcome up as a `ConnectFinished` command.
    fn handle_start(&mut self, client: ClientId, hint: ConnectionHint) {
        if self.state.recording || self.connecting {
            self.clients.send_to(
                client,
                &BroadcastEvent::info("Recording already in progress"),
            );
            return;
        }
        self.connecting = true;

        let hint = hint.or(self.config.default_hint.clone());
        let connector = Arc::clone(&self.connector);
        let hub = self.loopback.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || connector.connect(&hint))
                .await
                .unwrap_or_else(|e| {
                    error!("connect task panicked: {e}");
                    Err(BoardError::terminal("internal error"))
                });
            // If the hub is already gone, the dropped session disconnects
            // itself.
            let _ = hub.send(HubCommand::ConnectFinished { client, result }).await;
        });
    }

    fn handle_connect_finished(
        &mut self,
        client: ClientId,
        result: Result<DeviceSession, BoardError>,
    ) {
        self.connecting = false;

        let session = match result {
            Ok(session) => session,
            Err(e) => {
                warn!("recording start failed: {e}");
                self.clients.send_to(
                    client,
                    &BroadcastEvent::error(format!("Failed to start recording: {e}")),
                );
                return;
            }
        };

        let handle = acquisition::spawn(
            session,
            MetricExtractor::default(),
            LoopDeps {
                store: Arc::clone(&self.store),
                remote: self.remote.clone(),
                snapshot: self.snapshot_tx.subscribe(),
                hub: self.loopback.clone(),
                poll_period: self.config.poll_period,
            },
        );
        self.recording = Some(handle);
        self.state.recording = true;
        self.clients.broadcast(&BroadcastEvent::RecordingStarted);
    }

    async fn handle_stop(&mut self) {
        // Idle stop is a silent no-op.
        let Some(handle) = self.recording.take() else {
            return;
        };
        handle.stop().await;
        self.state.recording = false;
        self.clients.broadcast(&BroadcastEvent::RecordingStopped);
    }

    async fn handle_stream_failed(&mut self, message: String) {
        let Some(handle) = self.recording.take() else {
            return;
        };
        handle.reap().await;
        self.state.recording = false;
        self.clients.broadcast(&BroadcastEvent::error(message));
        self.clients.broadcast(&BroadcastEvent::RecordingStopped);
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.state.snapshot());
    }
}
