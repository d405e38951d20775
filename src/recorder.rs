//! Recording engine handle.
//!
//! The agent never records anything itself. Every `Start`/`Stop` call coming
//! in over D-Bus is forwarded to a [`Recorder`], which owns the actual media
//! pipeline. [`SessionRecorder`] is the engine bundled with the agent: it keeps
//! track of which caller ids are recording and hands out record ids.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("Invalid recording id: {0:?}")]
    InvalidId(String),

    #[error("Already recording: {0}")]
    AlreadyRecording(String),

    #[error("Not recording: {0}")]
    NotRecording(String),
}

/// Container format of recorded files.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Ts,
}

impl Container {
    /// File extension used for this container
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Ts => "ts",
        }
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Opaque handle to the recording engine.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Begin recording for `id`, returning the generated record id.
    async fn start(&self, id: &str) -> Result<String, RecorderError>;

    /// Stop the recording started for `id`.
    async fn stop(&self, id: &str) -> Result<(), RecorderError>;

    /// Release engine resources. Called once when the agent shuts down.
    async fn shutdown(&self) {}

    /// Caller ids currently recording, without waiting on the engine.
    ///
    /// `None` when the engine cannot tell right now. Used from the panic hook.
    fn recording_ids(&self) -> Option<Vec<String>> {
        None
    }
}

/// An active recording tracked by [`SessionRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSession {
    /// Caller-supplied id
    pub id: String,
    /// Id generated for this recording
    pub record_id: String,
    pub container: Container,
    pub started_at: DateTime<Utc>,
}

impl RecordingSession {
    /// File name the engine writes this recording to
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.record_id, self.container.extension())
    }
}

/// Bundled engine keeping one active session per caller id.
pub struct SessionRecorder {
    container: Container,
    sessions: Mutex<HashMap<String, RecordingSession>>,
    next_seq: AtomicU64,
}

impl SessionRecorder {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            sessions: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Snapshot of the active sessions, ordered by caller id.
    pub async fn active_sessions(&self) -> Vec<RecordingSession> {
        let sessions = self.sessions.lock().await;
        let mut active: Vec<_> = sessions.values().cloned().collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    fn next_record_id(&self, id: &str, now: DateTime<Utc>) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", id, now.format("%Y%m%d%H%M%S"), seq)
    }
}

fn validate_id(id: &str) -> Result<&str, RecorderError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(RecorderError::InvalidId(id.to_string()));
    }
    Ok(trimmed)
}

#[async_trait]
impl Recorder for SessionRecorder {
    async fn start(&self, id: &str) -> Result<String, RecorderError> {
        let id = validate_id(id)?;
        let mut sessions = self.sessions.lock().await;

        if sessions.contains_key(id) {
            return Err(RecorderError::AlreadyRecording(id.to_string()));
        }

        let started_at = Utc::now();
        let session = RecordingSession {
            id: id.to_string(),
            record_id: self.next_record_id(id, started_at),
            container: self.container,
            started_at,
        };
        info!("Recording started: {} -> {}", id, session.file_name());

        let record_id = session.record_id.clone();
        sessions.insert(id.to_string(), session);
        Ok(record_id)
    }

    async fn stop(&self, id: &str) -> Result<(), RecorderError> {
        let id = validate_id(id)?;
        let session = self
            .sessions
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| RecorderError::NotRecording(id.to_string()))?;

        let elapsed = Utc::now() - session.started_at;
        info!(
            "Recording stopped: {} ({}, {}s)",
            id,
            session.record_id,
            elapsed.num_seconds()
        );
        Ok(())
    }

    fn recording_ids(&self) -> Option<Vec<String>> {
        let sessions = self.sessions.try_lock().ok()?;
        let mut ids: Vec<_> = sessions.keys().cloned().collect();
        ids.sort();
        Some(ids)
    }

    async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        if sessions.is_empty() {
            debug!("Recorder shut down with no active sessions");
            return;
        }
        for (id, session) in sessions.drain() {
            warn!(
                "Stopping recording {} ({}) on shutdown",
                id, session.record_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_returns_record_id() {
        let recorder = SessionRecorder::new(Container::Mp4);
        let record_id = recorder.start("camera-1").await.unwrap();

        assert!(record_id.starts_with("camera-1-"));
        let sessions = recorder.active_sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "camera-1");
        assert_eq!(sessions[0].record_id, record_id);
        assert!(sessions[0].file_name().ends_with(".mp4"));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let recorder = SessionRecorder::new(Container::Ts);
        recorder.start("cam").await.unwrap();

        let err = recorder.start("cam").await.unwrap_err();
        assert_eq!(err, RecorderError::AlreadyRecording("cam".into()));
    }

    #[tokio::test]
    async fn test_stop_unknown_id() {
        let recorder = SessionRecorder::new(Container::Mp4);
        let err = recorder.stop("ghost").await.unwrap_err();
        assert_eq!(err, RecorderError::NotRecording("ghost".into()));
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let recorder = SessionRecorder::new(Container::Mp4);
        assert!(matches!(
            recorder.start("   ").await,
            Err(RecorderError::InvalidId(_))
        ));
        assert!(matches!(
            recorder.stop("").await,
            Err(RecorderError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_restart_after_stop_gets_new_record_id() {
        let recorder = SessionRecorder::new(Container::Mp4);
        let first = recorder.start("cam").await.unwrap();
        recorder.stop("cam").await.unwrap();
        let second = recorder.start("cam").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(recorder.active_sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_id_is_trimmed() {
        let recorder = SessionRecorder::new(Container::Mp4);
        recorder.start(" cam ").await.unwrap();
        recorder.stop("cam").await.unwrap();
        assert!(recorder.active_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_drops_sessions() {
        let recorder = SessionRecorder::new(Container::Ts);
        recorder.start("a").await.unwrap();
        recorder.start("b").await.unwrap();

        let ids: Vec<_> = recorder
            .active_sessions()
            .await
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        recorder.shutdown().await;
        assert!(recorder.active_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_recording_ids_snapshot() {
        let recorder = SessionRecorder::new(Container::Mp4);
        assert_eq!(recorder.recording_ids(), Some(vec![]));

        recorder.start("b").await.unwrap();
        recorder.start("a").await.unwrap();
        assert_eq!(
            recorder.recording_ids(),
            Some(vec!["a".to_string(), "b".to_string()])
        );

        let _locked = recorder.sessions.lock().await;
        assert_eq!(recorder.recording_ids(), None);
    }

    #[test]
    fn test_container_extension() {
        assert_eq!(Container::Mp4.extension(), "mp4");
        assert_eq!(Container::Ts.extension(), "ts");
        assert_eq!(Container::default(), Container::Mp4);
    }
}
