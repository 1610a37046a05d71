//! Outcome persistence boundary.
//!
//! The orchestrator records run outcomes and user-curated saved outputs
//! through the `OutcomeSink` trait, which decouples the run loop from
//! any specific storage backend:
//! - servers can write to a database
//! - CLI tools use `JsonlOutcomeSink` or `NoopOutcomeSink`
//! - tests use in-memory recorders
//!
//! Recording is fire-and-forget: sink failures are logged and
//! swallowed, and never change a run's terminal status.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::run::{RunState, RunStatus};
use crate::task::EvaluationTask;

/// One appended row of the run-outcome log.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub timestamp_ms: i64,
    pub backend: String,
    pub status: &'static str,
    pub attempts: u32,
    pub elapsed_seconds: f64,
    pub target_words: Option<u32>,
    pub output_words: usize,
    pub output_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunOutcome {
    /// Snapshot a terminal run state into a log row.
    pub fn from_state(backend: &str, task: &EvaluationTask, state: &RunState) -> Self {
        Self {
            timestamp_ms: Utc::now().timestamp_millis(),
            backend: backend.to_string(),
            status: match state.status {
                RunStatus::Succeeded => "succeeded",
                RunStatus::Failed => "failed",
                RunStatus::Idle => "idle",
                RunStatus::Running => "running",
            },
            attempts: state.attempts,
            elapsed_seconds: state.elapsed.as_secs_f64(),
            target_words: task.target_words,
            output_words: state.word_count,
            output_text: state.output.clone(),
            error: state.error_detail.clone(),
        }
    }
}

/// One appended row of the saved-outputs log: a user marked this
/// backend's answer as the best one for the task.
#[derive(Debug, Clone, Serialize)]
pub struct SavedOutput {
    pub timestamp_ms: i64,
    pub task_id: String,
    pub backend: String,
    pub inputs: BTreeMap<String, String>,
    pub output_text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OutcomeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
}

/// Append-only sink for run outcomes and saved outputs.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn record_outcome(&self, outcome: RunOutcome) -> Result<(), OutcomeError>;
    async fn record_saved(&self, saved: SavedOutput) -> Result<(), OutcomeError>;
}

/// Sink that discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOutcomeSink;

#[async_trait]
impl OutcomeSink for NoopOutcomeSink {
    async fn record_outcome(&self, _outcome: RunOutcome) -> Result<(), OutcomeError> {
        Ok(())
    }

    async fn record_saved(&self, _saved: SavedOutput) -> Result<(), OutcomeError> {
        Ok(())
    }
}

/// Sink that appends JSON lines to local files. Saved outputs go to a
/// second file when one is configured, and are dropped otherwise.
pub struct JsonlOutcomeSink {
    outcomes: Mutex<File>,
    saved: Option<Mutex<File>>,
}

impl JsonlOutcomeSink {
    pub fn create(
        outcomes_path: impl AsRef<Path>,
        saved_path: Option<&Path>,
    ) -> Result<Self, OutcomeError> {
        let outcomes = open_append(outcomes_path.as_ref())?;
        let saved = match saved_path {
            Some(path) => Some(Mutex::new(open_append(path)?)),
            None => None,
        };
        Ok(Self {
            outcomes: Mutex::new(outcomes),
            saved,
        })
    }
}

fn open_append(path: &Path) -> Result<File, OutcomeError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn write_line<T: Serialize>(file: &mut File, record: &T) -> Result<(), OutcomeError> {
    let line = serde_json::to_string(record).map_err(|e| OutcomeError::Serde(e.to_string()))?;
    writeln!(file, "{line}")?;
    Ok(())
}

#[async_trait]
impl OutcomeSink for JsonlOutcomeSink {
    async fn record_outcome(&self, outcome: RunOutcome) -> Result<(), OutcomeError> {
        let mut file = self.outcomes.lock().await;
        write_line(&mut file, &outcome)
    }

    async fn record_saved(&self, saved: SavedOutput) -> Result<(), OutcomeError> {
        match &self.saved {
            Some(file) => {
                let mut file = file.lock().await;
                write_line(&mut file, &saved)
            }
            None => Ok(()),
        }
    }
}
