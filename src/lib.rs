#![forbid(unsafe_code)]

//! # gauge-harness
//!
//! Run one prompt across several chat models concurrently and hold each
//! output to a target word count.
//!
//! Instead of hoping a model respects "write about 300 words",
//! gauge-harness checks every generation against the target and, when
//! it misses, resubmits with a corrective instruction scaled to how far
//! off, and in which direction, the output landed. Each backend gets
//! its own bounded run (at most three generation calls) with isolated
//! state, so a slow or failing model never drags down its siblings.
//! Length stays a soft constraint: a run that exhausts its budget still
//! surfaces its closest attempt rather than failing.

pub mod board;
pub mod gateway;
pub mod length;
pub mod outcome;
pub mod policy;
pub mod run;
pub mod task;

pub use board::{Orchestrator, RunBoard};
pub use gateway::{normalize_output, ChatGateway, GatewayError, Message, OpenRouterClient, Role};
pub use length::{parse_target_words, word_count};
pub use outcome::{
    JsonlOutcomeSink, NoopOutcomeSink, OutcomeError, OutcomeSink, RunOutcome, SavedOutput,
};
pub use policy::{evaluate, RetryTier, Verdict};
pub use run::{drive_run, NoopObserver, RunObserver, RunProgress, RunState, RunStatus, MAX_ATTEMPTS};
pub use task::{EvaluationTask, ModelInfo, TaskError, TaskSpec, CURATED_MODELS};
