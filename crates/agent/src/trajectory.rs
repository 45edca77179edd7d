//! Trajectory recording.
//!
//! After every iteration the full run state is written to a JSON file for
//! post-hoc inspection. Recording is best effort: failures are logged and
//! never reach the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hintloop_config::HintsConfig;
use hintloop_core::message::Message;
use hintloop_core::state::{BackgroundProcess, TodoItem};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// One executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// Result payload when the tool produced one
    pub result: Option<serde_json::Value>,
    /// Failure text as shown to the model
    pub error: Option<String>,
    pub call_number: u32,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Snapshot of a run, as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub timestamp: DateTime<Utc>,
    pub iteration: u32,
    pub provider: String,
    pub model: String,
    pub conversation: Vec<Message>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub todo_list: Vec<TodoItem>,
    pub current_directory: PathBuf,
    pub final_answer: Option<String>,
    pub background_processes: BTreeMap<String, BackgroundProcess>,
    pub config: HintsConfig,
}

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("Failed to read trajectory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid trajectory {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl TrajectoryRecord {
    /// Read a record back from disk.
    pub fn load(path: &Path) -> Result<Self, TrajectoryError> {
        let content = std::fs::read_to_string(path).map_err(|source| TrajectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| TrajectoryError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Writes [`TrajectoryRecord`]s to a single file, overwriting each time.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryRecorder {
    path: Option<PathBuf>,
}

impl TrajectoryRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write `record`. Never fails; problems are logged.
    pub async fn record(&self, record: &TrajectoryRecord) {
        let Some(path) = &self.path else {
            return;
        };

        let json = match serde_json::to_string_pretty(record) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize trajectory");
                return;
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %path.display(), error = %e, "Failed to save trajectory");
                return;
            }
        }

        match tokio::fs::write(path, json).await {
            Ok(()) => debug!(
                path = %path.display(),
                iteration = record.iteration,
                "Trajectory saved"
            ),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to save trajectory"),
        }
    }
}
