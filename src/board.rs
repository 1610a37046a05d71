//! Multi-run orchestrator: fan one task out to every selected backend.
//!
//! Each backend gets its own spawned run with its own slot on the run
//! board; no run waits on, reads, or writes another's state. Batches
//! are numbered: the board only accepts writes stamped with the current
//! batch epoch and targeting a still-present key, which makes re-runs
//! and deselection safe against stragglers from earlier batches: their
//! results are discarded, never stored.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::gateway::ChatGateway;
use crate::outcome::{OutcomeSink, RunOutcome};
use crate::run::{drive_run, RunObserver, RunProgress, RunState};
use crate::task::EvaluationTask;

#[derive(Default)]
struct BoardInner {
    epoch: u64,
    runs: HashMap<String, RunState>,
}

/// Shared map of backend id -> run state, observable while runs are in
/// flight. Single-writer per key: only a backend's own run (of the
/// current epoch) touches its slot.
#[derive(Clone, Default)]
pub struct RunBoard {
    inner: Arc<Mutex<BoardInner>>,
}

impl RunBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all prior state, mark every backend Running, and return the
    /// new batch epoch.
    async fn begin_batch(&self, backends: &[String]) -> u64 {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        inner.runs.clear();
        for backend in backends {
            inner.runs.insert(backend.clone(), RunState::running());
        }
        inner.epoch
    }

    async fn note_attempt(&self, epoch: u64, backend: &str, attempt: u32) {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return;
        }
        if let Some(state) = inner.runs.get_mut(backend) {
            state.attempts = attempt;
        }
    }

    /// Store a terminal state. Returns false when the write was stale
    /// (superseded batch or deselected backend) and was discarded.
    async fn complete(&self, epoch: u64, backend: &str, state: RunState) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return false;
        }
        match inner.runs.get_mut(backend) {
            Some(slot) => {
                *slot = state;
                true
            }
            None => false,
        }
    }

    /// Remove a backend's state entirely.
    pub async fn remove(&self, backend: &str) {
        self.inner.lock().await.runs.remove(backend);
    }

    pub async fn get(&self, backend: &str) -> Option<RunState> {
        self.inner.lock().await.runs.get(backend).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, RunState> {
        self.inner.lock().await.runs.clone()
    }
}

/// Forwards per-call progress from a run controller into its board
/// slot, stamped with the batch epoch so stale runs become no-ops.
struct BoardProgress {
    board: RunBoard,
    epoch: u64,
}

#[async_trait]
impl RunObserver for BoardProgress {
    async fn on_progress(&self, backend: &str, progress: RunProgress) {
        match progress {
            // begin_batch already marked the slot Running.
            RunProgress::Started => {}
            RunProgress::Attempt { attempt } => {
                self.board.note_attempt(self.epoch, backend, attempt).await;
            }
        }
    }
}

/// Owns the backend selection and the run board, and dispatches one
/// run per selected backend.
pub struct Orchestrator {
    gateway: Arc<dyn ChatGateway>,
    sink: Arc<dyn OutcomeSink>,
    board: RunBoard,
    selection: Mutex<Vec<String>>,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn ChatGateway>, sink: Arc<dyn OutcomeSink>) -> Self {
        Self {
            gateway,
            sink,
            board: RunBoard::new(),
            selection: Mutex::new(Vec::new()),
        }
    }

    pub fn board(&self) -> &RunBoard {
        &self.board
    }

    /// Add a backend to the selection. Order is preserved for display;
    /// duplicates are ignored.
    pub async fn select(&self, backend: impl Into<String>) {
        let backend = backend.into();
        let mut selection = self.selection.lock().await;
        if !selection.contains(&backend) {
            selection.push(backend);
        }
    }

    /// Drop a backend from the selection and delete its run state. An
    /// in-flight run for this backend keeps going, but its eventual
    /// result finds no slot and is discarded.
    pub async fn deselect(&self, backend: &str) {
        self.selection.lock().await.retain(|b| b != backend);
        self.board.remove(backend).await;
    }

    pub async fn selected(&self) -> Vec<String> {
        self.selection.lock().await.clone()
    }

    /// Launch one run per selected backend, all dispatched without
    /// sequential blocking. Prior batch state is cleared first.
    ///
    /// The returned handles are for callers that want to wait for the
    /// whole batch; dropping them detaches the runs instead.
    pub async fn run_all(&self, task: &EvaluationTask) -> Vec<JoinHandle<()>> {
        let backends = self.selected().await;
        let epoch = self.board.begin_batch(&backends).await;
        let task = Arc::new(task.clone());

        backends
            .into_iter()
            .map(|backend| {
                let gateway = Arc::clone(&self.gateway);
                let sink = Arc::clone(&self.sink);
                let board = self.board.clone();
                let task = Arc::clone(&task);

                tokio::spawn(async move {
                    let observer = BoardProgress {
                        board: board.clone(),
                        epoch,
                    };
                    let state = drive_run(gateway.as_ref(), &task, &backend, &observer).await;

                    if board.complete(epoch, &backend, state.clone()).await {
                        let outcome = RunOutcome::from_state(&backend, &task, &state);
                        if let Err(err) = sink.record_outcome(outcome).await {
                            tracing::warn!(%backend, error = %err, "failed to record run outcome");
                        }
                    } else {
                        tracing::debug!(%backend, "run result discarded (deselected or superseded)");
                    }
                })
            })
            .collect()
    }

    /// Convenience wrapper for CLI and tests: dispatch and wait for the
    /// whole batch to reach terminal state.
    pub async fn run_all_and_wait(&self, task: &EvaluationTask) {
        let handles = self.run_all(task).await;
        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                tracing::warn!(error = %err, "run task panicked");
            }
        }
    }
}
