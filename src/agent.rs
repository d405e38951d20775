//! Recorder agent service shell.
//!
//! The agent:
//! 1. Builds the recorder handle and interface context
//! 2. Takes a launch hold so it stays up until told otherwise
//! 3. Installs SIGINT/SIGTERM handlers, then connects to the bus
//! 4. Publishes the Manager and RecorderInterface objects, then takes its name
//! 5. Releases the launch hold on a signal and tears the connection down
//! 6. Exits once no holds remain

use crate::config::{BusConfig, Config, ConfigError};
use crate::context::AgentContext;
use crate::dbus::{self, DbusService};
use crate::hold::{ApplicationHold, HoldGuard};
use crate::panic_handler;
use futures_util::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zbus::Connection;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),

    #[error("Agent already running: {0} is owned by another process")]
    AlreadyRunning(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Events that drive the agent's main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentEvent {
    /// A termination signal arrived
    Terminate,
    /// The bus connection went away or the well-known name was lost
    Disconnected,
}

/// Main agent struct
pub struct Agent {
    context: Arc<AgentContext>,
    hold: ApplicationHold,
    launch_hold: Option<HoldGuard>,
}

impl Agent {
    /// Create the agent and take the launch hold.
    pub fn new(context: Arc<AgentContext>) -> Self {
        let hold = ApplicationHold::new();
        let launch_hold = Some(hold.hold());
        Self {
            context,
            hold,
            launch_hold,
        }
    }

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.context
    }

    pub fn hold(&self) -> &ApplicationHold {
        &self.hold
    }

    /// Release the launch hold. Returns `false` if it was already released.
    pub fn release_launch_hold(&mut self) -> bool {
        match self.launch_hold.take() {
            Some(guard) => {
                drop(guard);
                debug!("Launch hold released ({} remaining)", self.hold.count());
                true
            }
            None => false,
        }
    }

    /// Publish on `bus` and run until shutdown.
    pub async fn run(self, bus: &BusConfig) -> Result<(), AgentError> {
        let (event_tx, event_rx) = mpsc::channel(8);
        let signals = spawn_signal_watcher(event_tx.clone())?;

        let (service, name_watch) = match self.register(bus, event_tx).await {
            Ok(registered) => registered,
            Err(e) => {
                signals.abort();
                return Err(e);
            }
        };

        self.serve(service, event_rx).await;

        signals.abort();
        name_watch.abort();
        Ok(())
    }

    /// Connect, start watching for name loss, then publish and take the name.
    async fn register(
        &self,
        bus: &BusConfig,
        events: mpsc::Sender<AgentEvent>,
    ) -> Result<(DbusService, JoinHandle<()>), AgentError> {
        let connection = dbus::connect(bus).await?;
        let name_watch = watch_name_lost(&connection, bus.name.clone(), events).await?;

        match DbusService::register(connection, bus, Arc::clone(&self.context), &self.hold).await
        {
            Ok(service) => Ok((service, name_watch)),
            Err(e) => {
                name_watch.abort();
                match e {
                    zbus::Error::NameTaken => Err(AgentError::AlreadyRunning(bus.name.clone())),
                    e => Err(e.into()),
                }
            }
        }
    }

    /// Main loop. Returns once every hold has been released.
    pub async fn serve(mut self, service: DbusService, mut events: mpsc::Receiver<AgentEvent>) {
        let mut service = Some(service);
        info!("Recorder agent running ({} holds)", self.hold.count());

        while self.hold.count() > 0 {
            match events.recv().await {
                Some(AgentEvent::Terminate) => {
                    info!("Shutdown signal received");
                    if !self.release_launch_hold() {
                        debug!("Shutdown already in progress");
                    }
                }
                Some(AgentEvent::Disconnected) => {
                    if let Some(service) = service.take() {
                        warn!("Bus connection lost, unpublishing interfaces");
                        service.disconnect().await;
                    }
                }
                None => {
                    warn!("Agent event channel closed, shutting down");
                    self.release_launch_hold();
                }
            }

            if self.launch_hold.is_none() {
                if let Some(service) = service.take() {
                    service.disconnect().await;
                }
            }
        }

        self.hold.wait_idle().await;
        self.context.recorder().shutdown().await;
        info!("Recorder agent stopped");
    }
}

/// Forward SIGINT and SIGTERM to the main loop.
fn spawn_signal_watcher(tx: mpsc::Sender<AgentEvent>) -> Result<JoinHandle<()>, AgentError> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            };
            debug!("Received {}", name);
            if tx.send(AgentEvent::Terminate).await.is_err() {
                break;
            }
        }
    }))
}

/// Subscribe to `NameLost` and report loss of `name` to the main loop.
///
/// The subscription is in place when this returns, so it must be called
/// before the name is requested.
async fn watch_name_lost(
    connection: &Connection,
    name: String,
    tx: mpsc::Sender<AgentEvent>,
) -> Result<JoinHandle<()>, AgentError> {
    let proxy = zbus::fdo::DBusProxy::new(connection).await?;
    let mut lost = proxy.receive_name_lost().await?;

    Ok(tokio::spawn(async move {
        while let Some(msg) = lost.next().await {
            let ours = msg
                .args()
                .map(|args| args.name().as_str() == name)
                .unwrap_or(false);
            if ours {
                warn!("Lost bus name {}", name);
                break;
            }
        }

        let _ = tx.send(AgentEvent::Disconnected).await;
    }))
}

/// Start the agent
pub async fn run(config: &Config) -> Result<(), AgentError> {
    let context = Arc::new(AgentContext::from_config(config));
    panic_handler::watch_agent(&config.bus, &context);
    info!(
        "Starting recorder agent {} (container: {})",
        config.bus.name, config.recorder.container
    );

    let agent = Agent::new(context);
    agent.run(&config.bus).await
}
