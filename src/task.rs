//! Task definitions: prompt templates, placeholder substitution, and
//! the curated model catalog.
//!
//! A task spec is the external boundary: a system prompt, a user
//! template with `{placeholder}` fields, and an input map. Preparing it
//! yields the immutable [`EvaluationTask`] the orchestrator fans out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::Message;
use crate::length::parse_target_words;

/// Input field name that carries the word target.
pub const WORD_COUNT_INPUT: &str = "word_count";

/// Targets below this get a strict-length system turn injected up
/// front, so most short runs land in tolerance on the first attempt.
const STRICT_PREFLIGHT_CEILING: u32 = 250;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// The work unit submitted to the orchestrator: a prepared message
/// list plus the optional word target. Immutable once a batch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationTask {
    pub messages: Vec<Message>,
    pub target_words: Option<u32>,
}

impl EvaluationTask {
    /// Build a task directly from messages, bypassing templates.
    pub fn new(messages: Vec<Message>, target_words: Option<u32>) -> Self {
        Self {
            messages,
            target_words,
        }
    }
}

/// A named prompt template with its filled-in inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub system: Option<String>,
    pub template: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum TaskError {
    /// The template references placeholders with no matching input.
    #[error("missing inputs: {0}")]
    MissingInputs(String),
}

impl TaskSpec {
    /// Target word count parsed from the `word_count` input, if any.
    pub fn target_words(&self) -> Option<u32> {
        self.inputs
            .get(WORD_COUNT_INPUT)
            .and_then(|v| parse_target_words(v))
    }

    /// Substitute placeholders and assemble the message list.
    ///
    /// For small targets a strict-length system turn is injected before
    /// the user message; retrying into compliance is slower than asking
    /// for it upfront.
    pub fn prepare(&self) -> Result<EvaluationTask, TaskError> {
        let target = self.target_words();

        let system = self
            .system
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let mut messages = vec![Message::system(system)];

        if let Some(target) = target {
            if target < STRICT_PREFLIGHT_CEILING {
                messages.push(Message::system(strict_length_preamble(target)));
            }
        }

        let (body, missing) = substitute(&self.template, &self.inputs);
        if !missing.is_empty() {
            return Err(TaskError::MissingInputs(missing.join(", ")));
        }
        messages.push(Message::user(body));

        Ok(EvaluationTask::new(messages, target))
    }
}

fn strict_length_preamble(target: u32) -> String {
    format!(
        "STRICT LENGTH CONSTRAINT: The user requires a very short response \
         (approx {target} words).\n1. Keep it extremely concise.\n2. Go straight \
         to the point without introductory fluff.\n3. Absolute maximum length: {} words.",
        target + 20
    )
}

/// Replace `{key}` (and `{{key}}`) placeholders with values from the
/// input map. Unresolved placeholders are left verbatim and reported.
fn substitute(template: &str, values: &BTreeMap<String, String>) -> (String, Vec<String>) {
    let mut out = String::with_capacity(template.len());
    let mut missing: Vec<String> = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open..];

        let body = rest.trim_start_matches('{');
        let open_run = rest.len() - body.len();

        let Some(close) = body.find('}') else {
            // Unbalanced brace: emit the remainder as-is.
            break;
        };

        let key = body[..close].trim();
        let close_run = body[close..].len() - body[close..].trim_start_matches('}').len();
        let consumed = open_run + close + close_run;

        match values.get(key) {
            Some(value) => out.push_str(value),
            None => {
                if !key.is_empty() && !missing.iter().any(|m| m == key) {
                    missing.push(key.to_string());
                }
                out.push_str(&rest[..consumed]);
            }
        }
        rest = &rest[consumed..];
    }

    out.push_str(rest);
    (out, missing)
}

// =============================================================================
// MODEL CATALOG
// =============================================================================

/// A curated backend entry: OpenRouter id plus display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
}

/// The curated backend list offered to users.
pub const CURATED_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "meta-llama/llama-3.1-70b-instruct",
        name: "Meta: Llama 3.1 70B",
    },
    ModelInfo {
        id: "qwen/qwen-2.5-72b-instruct",
        name: "Qwen: Qwen 2.5 72B",
    },
    ModelInfo {
        id: "qwen/qwen3-32b",
        name: "Qwen: Qwen 3 32B",
    },
    ModelInfo {
        id: "openai/gpt-oss-120b",
        name: "OpenAI: GPT-OSS 120B",
    },
    ModelInfo {
        id: "google/gemini-2.5-flash-lite",
        name: "Google: Gemini 2.5 Flash Lite",
    },
];

/// Display name for a backend id, falling back to the id itself.
pub fn model_display_name(id: &str) -> &str {
    CURATED_MODELS
        .iter()
        .find(|m| m.id == id)
        .map_or(id, |m| m.name)
}
