//! D-Bus service setup and client for the recorder agent.

use std::sync::Arc;
use tracing::{debug, info, warn};
use zbus::fdo::{RequestNameFlags, RequestNameReply};
use zbus::{Connection, Result};

use super::interface::{ManagerInterface, RecorderInterface};
use crate::config::{BusConfig, BusKind};
use crate::context::AgentContext;
use crate::hold::{ApplicationHold, HoldGuard};

/// Object path of the Manager interface.
pub const MANAGER_PATH: &str = "/org/hwangsaeul/Hwangsae1/Manager";

/// Object path of the RecorderInterface interface.
pub const RECORDER_PATH: &str = "/org/hwangsaeul/Hwangsae1/RecorderInterface";

pub const MANAGER_INTERFACE: &str = "org.hwangsaeul.Hwangsae1.Manager";
pub const RECORDER_INTERFACE: &str = "org.hwangsaeul.Hwangsae1.RecorderInterface";

/// Export both interfaces on `connection`.
///
/// A failed export is logged and skipped; the connection stays usable.
/// Returns the number of interfaces exported.
pub async fn publish(connection: &Connection, context: &Arc<AgentContext>) -> usize {
    let object_server = connection.object_server();
    let mut exported = 0;

    match object_server
        .at(MANAGER_PATH, ManagerInterface::new(Arc::clone(context)))
        .await
    {
        Ok(true) => exported += 1,
        Ok(false) => warn!(
            "Failed to export Hwangsae1 D-Bus interface (reason: {} already exported at {})",
            MANAGER_INTERFACE, MANAGER_PATH
        ),
        Err(e) => warn!("Failed to export Hwangsae1 D-Bus interface (reason: {})", e),
    }

    match object_server
        .at(RECORDER_PATH, RecorderInterface::new(Arc::clone(context)))
        .await
    {
        Ok(true) => exported += 1,
        Ok(false) => warn!(
            "Failed to export Hwangsae1 D-Bus interface (reason: {} already exported at {})",
            RECORDER_INTERFACE, RECORDER_PATH
        ),
        Err(e) => warn!("Failed to export Hwangsae1 D-Bus interface (reason: {})", e),
    }

    exported
}

/// Remove both interfaces from `connection`. Missing interfaces are ignored.
pub async fn unpublish(connection: &Connection) {
    let object_server = connection.object_server();

    if let Err(e) = object_server
        .remove::<ManagerInterface, _>(MANAGER_PATH)
        .await
    {
        debug!("Manager was not exported: {}", e);
    }

    if let Err(e) = object_server
        .remove::<RecorderInterface, _>(RECORDER_PATH)
        .await
    {
        debug!("RecorderInterface was not exported: {}", e);
    }
}

/// Open a connection to the configured bus.
///
/// No name is requested here. [`DbusService::register`] asks for it once the
/// objects are exported, so a call routed to the name always finds them.
pub async fn connect(bus: &BusConfig) -> Result<Connection> {
    match bus.kind {
        BusKind::Session => Connection::session().await,
        BusKind::System => Connection::system().await,
    }
}

/// A bus connection with the agent's interfaces published on it.
///
/// Holds the agent alive until [`DbusService::disconnect`] is called.
pub struct DbusService {
    connection: Connection,
    hold: Option<HoldGuard>,
}

impl DbusService {
    /// Publish the agent's interfaces on `connection`, then take `bus.name`.
    ///
    /// If the name cannot be acquired the interfaces are withdrawn again and
    /// the connection's hold is released.
    pub async fn register(
        connection: Connection,
        bus: &BusConfig,
        context: Arc<AgentContext>,
        hold: &ApplicationHold,
    ) -> Result<Self> {
        let service = Self::attach(connection, context, hold).await;
        if let Err(e) = service.request_name(bus).await {
            service.disconnect().await;
            return Err(e);
        }
        info!(
            "D-Bus service started on {} bus: {} at {}, {}",
            bus.kind, bus.name, MANAGER_PATH, RECORDER_PATH
        );
        Ok(service)
    }

    /// Publish the agent's interfaces on an established connection.
    pub async fn attach(
        connection: Connection,
        context: Arc<AgentContext>,
        hold: &ApplicationHold,
    ) -> Self {
        debug!("Registering on bus connection");
        let guard = hold.hold();
        publish(&connection, &context).await;
        Self {
            connection,
            hold: Some(guard),
        }
    }

    async fn request_name(&self, bus: &BusConfig) -> Result<()> {
        let flags = if bus.allow_replacement {
            RequestNameFlags::DoNotQueue | RequestNameFlags::AllowReplacement
        } else {
            RequestNameFlags::DoNotQueue.into()
        };
        let reply = self
            .connection
            .request_name_with_flags(bus.name.as_str(), flags)
            .await?;
        match reply {
            RequestNameReply::PrimaryOwner | RequestNameReply::AlreadyOwner => Ok(()),
            RequestNameReply::Exists | RequestNameReply::InQueue => Err(zbus::Error::NameTaken),
        }
    }

    /// Unpublish the interfaces and release the connection's hold.
    pub async fn disconnect(mut self) {
        debug!("Unregistering from bus connection");
        unpublish(&self.connection).await;
        self.hold.take();
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

/// D-Bus client for controlling a running agent.
///
/// Used by the CLI to send commands to the agent.
pub struct DbusClient {
    connection: Connection,
    bus_name: String,
}

impl DbusClient {
    /// Connect to the bus the agent is configured for.
    pub async fn connect(bus: &BusConfig) -> Result<Self> {
        Ok(Self {
            connection: connect(bus).await?,
            bus_name: bus.name.clone(),
        })
    }

    /// Check if the agent is running (owns the bus name).
    pub async fn is_agent_running(&self) -> bool {
        let Ok(name) = zbus::names::BusName::try_from(self.bus_name.as_str()) else {
            return false;
        };

        match zbus::fdo::DBusProxy::new(&self.connection).await {
            Ok(proxy) => proxy.name_has_owner(name).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn manager(&self) -> Result<AgentManagerProxy<'_>> {
        AgentManagerProxy::builder(&self.connection)
            .destination(self.bus_name.as_str())?
            .build()
            .await
    }

    async fn recorder(&self) -> Result<AgentRecorderProxy<'_>> {
        AgentRecorderProxy::builder(&self.connection)
            .destination(self.bus_name.as_str())?
            .build()
            .await
    }

    /// Start recording for `id`, returning the record id.
    pub async fn start(&self, id: &str) -> Result<String> {
        self.recorder().await?.start(id).await
    }

    /// Stop recording for `id`.
    pub async fn stop(&self, id: &str) -> Result<()> {
        self.recorder().await?.stop(id).await
    }

    /// Get the Manager status value.
    pub async fn status(&self) -> Result<i32> {
        self.manager().await?.status().await
    }

    /// Get the agent version.
    pub async fn version(&self) -> Result<String> {
        self.manager().await?.version().await
    }
}

/// Proxy for the Manager interface.
#[zbus::proxy(
    interface = "org.hwangsaeul.Hwangsae1.Manager",
    default_service = "org.hwangsaeul.Hwangsae1",
    default_path = "/org/hwangsaeul/Hwangsae1/Manager"
)]
trait AgentManager {
    #[zbus(property)]
    fn status(&self) -> zbus::Result<i32>;

    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;
}

/// Proxy for the RecorderInterface interface.
#[zbus::proxy(
    interface = "org.hwangsaeul.Hwangsae1.RecorderInterface",
    default_service = "org.hwangsaeul.Hwangsae1",
    default_path = "/org/hwangsaeul/Hwangsae1/RecorderInterface"
)]
trait AgentRecorder {
    fn start(&self, id: &str) -> zbus::Result<String>;
    fn stop(&self, id: &str) -> zbus::Result<()>;
}
