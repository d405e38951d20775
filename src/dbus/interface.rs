//! D-Bus interface definitions for the recorder agent.
//!
//! Provides `org.hwangsaeul.Hwangsae1.Manager` and
//! `org.hwangsaeul.Hwangsae1.RecorderInterface`.

use crate::context::AgentContext;
use std::sync::Arc;
use tracing::{debug, warn};
use zbus::interface;

/// Manager object, published at `/org/hwangsaeul/Hwangsae1/Manager`.
pub struct ManagerInterface {
    context: Arc<AgentContext>,
}

impl ManagerInterface {
    pub fn new(context: Arc<AgentContext>) -> Self {
        Self { context }
    }
}

#[interface(name = "org.hwangsaeul.Hwangsae1.Manager")]
impl ManagerInterface {
    /// Agent status. Fixed at 1 once the agent is up.
    #[zbus(property)]
    fn status(&self) -> i32 {
        self.context.status()
    }

    /// Agent version.
    #[zbus(property)]
    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }
}

/// Recorder control object, published at
/// `/org/hwangsaeul/Hwangsae1/RecorderInterface`.
pub struct RecorderInterface {
    context: Arc<AgentContext>,
}

impl RecorderInterface {
    pub fn new(context: Arc<AgentContext>) -> Self {
        Self { context }
    }
}

#[interface(name = "org.hwangsaeul.Hwangsae1.RecorderInterface")]
impl RecorderInterface {
    /// Start recording for `id` and return the generated record id.
    #[zbus(out_args("record_id"))]
    async fn start(&self, id: String) -> zbus::fdo::Result<String> {
        debug!("RecorderInterface.Start, id {}", id);
        self.context.recorder().start(&id).await.map_err(|e| {
            warn!("Start failed for {}: {}", id, e);
            zbus::fdo::Error::Failed(e.to_string())
        })
    }

    /// Stop the recording started for `id`.
    async fn stop(&self, id: String) -> zbus::fdo::Result<()> {
        debug!("RecorderInterface.Stop, id {}", id);
        self.context.recorder().stop(&id).await.map_err(|e| {
            warn!("Stop failed for {}: {}", id, e);
            zbus::fdo::Error::Failed(e.to_string())
        })
    }
}
