//! D-Bus integration for the recorder agent.
//!
//! The agent owns the well-known name `org.hwangsaeul.Hwangsae1` and exports
//! two objects:
//!
//! ```text
//! /org/hwangsaeul/Hwangsae1/Manager            org.hwangsaeul.Hwangsae1.Manager
//!     Status   (i, read)
//!     Version  (s, read)
//!
//! /org/hwangsaeul/Hwangsae1/RecorderInterface  org.hwangsaeul.Hwangsae1.RecorderInterface
//!     Start (s id) -> (s record_id)
//!     Stop  (s id) -> ()
//! ```
//!
//! # Usage
//!
//! ## Server (agent side)
//!
//! ```ignore
//! let context = Arc::new(AgentContext::from_config(&config));
//! let hold = ApplicationHold::new();
//! let connection = connect(&config.bus).await?;
//! let service = DbusService::register(connection, &config.bus, context, &hold).await?;
//! // ...
//! service.disconnect().await;
//! ```
//!
//! ## Client (CLI side)
//!
//! ```ignore
//! let client = DbusClient::connect(&config.bus).await?;
//! let record_id = client.start("camera-1").await?;
//! ```

mod interface;
mod service;

pub use interface::{ManagerInterface, RecorderInterface};
pub use service::{
    connect, publish, unpublish, DbusClient, DbusService, MANAGER_INTERFACE, MANAGER_PATH,
    RECORDER_INTERFACE, RECORDER_PATH,
};
