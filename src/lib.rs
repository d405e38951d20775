//! hwangsae-agent library exports for the binary and integration tests.
//!
//! The agent registers on D-Bus as `org.hwangsaeul.Hwangsae1` and forwards
//! `Start`/`Stop` requests to the recording engine.

pub mod agent;
pub mod config;
pub mod context;
pub mod dbus;
pub mod hold;
pub mod panic_handler;
pub mod recorder;
pub mod service;

// Re-export commonly used types for convenience
pub use agent::{Agent, AgentError, AgentEvent};
pub use config::Config;
pub use context::AgentContext;
pub use hold::{ApplicationHold, HoldGuard};
pub use recorder::{Container, Recorder, RecorderError, SessionRecorder};
