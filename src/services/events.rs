//! Run events
//!
//! The orchestrator reports what happened through an [`EventSink`]. Events go
//! over a bounded channel to a single consumer task that logs them, so the
//! download loop never blocks on formatting or output.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Something that happened during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Downloaded {
        video: String,
        language: String,
        path: PathBuf,
        score: f64,
    },
    Skipped {
        video: String,
        language: Option<String>,
        reason: String,
    },
    Failed {
        video: String,
        language: Option<String>,
        error: String,
    },
    PluginFailed {
        plugin: String,
        path: PathBuf,
        error: String,
    },
    /// Dry-run: what would have been downloaded
    Planned {
        video: String,
        language: String,
        candidates: usize,
        best_score: Option<f64>,
    },
}

/// Sending half of the event channel
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<RunEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver its consumer reads from
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue an event. Waits while the queue is full; events sent after the
    /// consumer has gone are dropped.
    pub async fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx
            && tx.send(event).await.is_err()
        {
            debug!("Event consumer has stopped; dropping event");
        }
    }
}

/// Spawn the consumer that logs every event until all senders are dropped
pub fn spawn_logger(mut rx: mpsc::Receiver<RunEvent>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut count = 0;
        while let Some(event) = rx.recv().await {
            log_event(&event);
            count += 1;
        }
        count
    })
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn log_event(event: &RunEvent) {
    let at = timestamp();
    match event {
        RunEvent::Downloaded {
            video,
            language,
            path,
            score,
        } => info!(
            at = %at,
            video = %video,
            language = %language,
            path = %path.display(),
            score = score,
            "Downloaded subtitle"
        ),
        RunEvent::Skipped {
            video,
            language,
            reason,
        } => info!(
            at = %at,
            video = %video,
            language = language.as_deref().unwrap_or("-"),
            reason = %reason,
            "Skipped"
        ),
        RunEvent::Failed {
            video,
            language,
            error,
        } => warn!(
            at = %at,
            video = %video,
            language = language.as_deref().unwrap_or("-"),
            error = %error,
            "Failed"
        ),
        RunEvent::PluginFailed {
            plugin,
            path,
            error,
        } => warn!(
            at = %at,
            plugin = %plugin,
            path = %path.display(),
            error = %error,
            "Plugin failed"
        ),
        RunEvent::Planned {
            video,
            language,
            candidates,
            best_score,
        } => info!(
            at = %at,
            video = %video,
            language = %language,
            candidates = candidates,
            best_score = ?best_score,
            "Would download subtitle"
        ),
    }
}
