//! Process-wide agent state handed to the bus interfaces.

use crate::config::Config;
use crate::recorder::{Recorder, SessionRecorder};
use std::sync::Arc;

/// Value of the Manager `Status` property once the agent is up.
pub const STATUS_READY: i32 = 1;

/// State shared by everything the agent publishes.
///
/// Built once at startup and passed explicitly to the interface adapters.
pub struct AgentContext {
    recorder: Arc<dyn Recorder>,
    status: i32,
}

impl AgentContext {
    pub fn new(recorder: Arc<dyn Recorder>) -> Self {
        Self {
            recorder,
            status: STATUS_READY,
        }
    }

    /// Build a context around the bundled engine configured by `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(SessionRecorder::new(config.recorder.container)))
    }

    pub fn recorder(&self) -> &Arc<dyn Recorder> {
        &self.recorder
    }

    pub fn status(&self) -> i32 {
        self.status
    }
}
