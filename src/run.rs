//! Evaluation run controller: the bounded adaptive-retry loop for one
//! (task, backend) pair.
//!
//! The loop makes at most [`MAX_ATTEMPTS`] generation calls. Hard
//! gateway errors end the run as Failed immediately; only
//! content-quality rejections are retried, by appending the rejected
//! text as an assistant turn and the synthesized correction as a user
//! turn. Exhausting the budget still ends Succeeded with the last text:
//! length is a soft constraint, and the closest attempt beats no answer.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::gateway::{ChatGateway, Message};
use crate::length::word_count;
use crate::policy::{evaluate, Verdict};
use crate::task::EvaluationTask;

/// Maximum generation calls per run.
pub const MAX_ATTEMPTS: u32 = 3;

/// Lifecycle of one run. Succeeded and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

/// Per-(task, backend) run state. Created when a run launches and
/// written only by that run's own controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub status: RunStatus,
    /// Generation calls actually made.
    pub attempts: u32,
    pub elapsed: Duration,
    pub word_count: usize,
    /// Final text on success; last-seen text otherwise.
    pub output: String,
    /// Present iff `status == Failed`.
    pub error_detail: Option<String>,
}

impl RunState {
    pub fn idle() -> Self {
        Self {
            status: RunStatus::Idle,
            attempts: 0,
            elapsed: Duration::ZERO,
            word_count: 0,
            output: String::new(),
            error_detail: None,
        }
    }

    pub fn running() -> Self {
        Self {
            status: RunStatus::Running,
            ..Self::idle()
        }
    }
}

/// Progress notification emitted by the controller so observers never
/// have to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunProgress {
    Started,
    /// A generation call completed; `attempt` is the 1-based count so far.
    Attempt { attempt: u32 },
}

#[async_trait]
pub trait RunObserver: Send + Sync {
    async fn on_progress(&self, backend: &str, progress: RunProgress);
}

/// Observer that discards all progress. For tests and one-shot CLI use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

#[async_trait]
impl RunObserver for NoopObserver {
    async fn on_progress(&self, _backend: &str, _progress: RunProgress) {}
}

/// Drive one evaluation run to a terminal state.
///
/// Within the run, generation calls are strictly sequential: each
/// call's history depends on the previous verdict. The returned state
/// is terminal.
pub async fn drive_run(
    gateway: &dyn ChatGateway,
    task: &EvaluationTask,
    backend: &str,
    observer: &dyn RunObserver,
) -> RunState {
    let started = Instant::now();
    observer.on_progress(backend, RunProgress::Started).await;

    let mut history = task.messages.clone();
    let mut attempts = 0u32;
    let mut last_text = String::new();

    while attempts < MAX_ATTEMPTS {
        let text = match gateway.generate(backend, &history).await {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!(backend, code = err.code(), "generation call failed");
                return RunState {
                    status: RunStatus::Failed,
                    attempts,
                    elapsed: started.elapsed(),
                    word_count: 0,
                    output: String::new(),
                    error_detail: Some(err.to_string()),
                };
            }
        };

        attempts += 1;
        observer
            .on_progress(backend, RunProgress::Attempt { attempt: attempts })
            .await;
        last_text = text;

        match evaluate(&last_text, task.target_words) {
            Verdict::Accept => break,
            Verdict::Retry(tier) => {
                if attempts < MAX_ATTEMPTS {
                    tracing::debug!(
                        backend,
                        attempt = attempts,
                        words = word_count(&last_text),
                        target_words = ?task.target_words,
                        "length check failed, resubmitting with correction"
                    );
                    history.push(Message::assistant(last_text.clone()));
                    history.push(Message::user(tier.instruction()));
                }
            }
        }
    }

    // Acceptance or exhaustion: either way the run succeeds with the
    // best available text.
    RunState {
        status: RunStatus::Succeeded,
        attempts,
        elapsed: started.elapsed(),
        word_count: word_count(&last_text),
        output: last_text,
        error_detail: None,
    }
}
