//! Retry policy engine: accept or reject a generation against a word
//! target, and on reject synthesize the corrective follow-up.
//!
//! A single generic "get closer to N words" instruction under-corrects
//! large deviations and over-corrects small ones, so rejections are
//! tiered by deviation magnitude and direction. Short targets get their
//! own emergency tier: they are empirically prone to runaway verbosity
//! that proportional trimming cannot fix within the attempt budget.
//!
//! Everything here is pure and deterministic. Only the text under
//! evaluation is consulted, never the attempt history.

use crate::length::word_count;

/// Accepted deviation: 10% of the target, with a floor so very short
/// targets are not forced to near-exact length.
pub const TOLERANCE_FRACTION: f64 = 0.10;
pub const TOLERANCE_FLOOR_WORDS: u32 = 15;

/// Targets below this get the emergency-truncation tier on any reject.
const EMERGENCY_TARGET_CEILING: u32 = 250;

/// Sentence-count heuristic used by the summarization/trim instructions.
const WORDS_PER_SENTENCE: u32 = 15;

/// Decision for one generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Retry(RetryTier),
}

/// One of four mutually exclusive corrective-instruction categories,
/// carrying the numeric parameters its template renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryTier {
    /// Short target (< 250 words): full rewrite under a hard word cap,
    /// chosen regardless of overshoot direction.
    EmergencyTruncate { target: u32, word_count: usize },
    /// Grossly over target (> 1.5x, target >= 250): cut everything
    /// non-essential.
    AggressiveSummarize { target: u32, word_count: usize },
    /// Moderately over target: trim by the exact excess.
    Trim { target: u32, excess: u32 },
    /// Under target: expand by the exact shortfall.
    Expand { target: u32, shortfall: u32 },
}

/// Maximum words allowed by a rejected attempt's accepted band.
pub fn tolerance(target: u32) -> f64 {
    (f64::from(target) * TOLERANCE_FRACTION).max(f64::from(TOLERANCE_FLOOR_WORDS))
}

/// Evaluate `text` against an optional word target.
///
/// With no (or unusable) target the text is always accepted. Otherwise
/// accept iff the absolute deviation is within [`tolerance`], and on
/// reject pick the tier for the deviation's magnitude and direction.
pub fn evaluate(text: &str, target: Option<u32>) -> Verdict {
    let Some(target) = target else {
        return Verdict::Accept;
    };

    let count = word_count(text);
    let diff = (count as i64 - i64::from(target)).unsigned_abs();
    if diff as f64 <= tolerance(target) {
        return Verdict::Accept;
    }

    let tier = if target < EMERGENCY_TARGET_CEILING {
        RetryTier::EmergencyTruncate {
            target,
            word_count: count,
        }
    } else if count as u64 * 2 > u64::from(target) * 3 {
        RetryTier::AggressiveSummarize {
            target,
            word_count: count,
        }
    } else if count as u64 > u64::from(target) {
        RetryTier::Trim {
            target,
            excess: count as u32 - target,
        }
    } else {
        RetryTier::Expand {
            target,
            shortfall: target - count as u32,
        }
    };

    Verdict::Retry(tier)
}

fn sentence_target(target: u32) -> u32 {
    target.div_ceil(WORDS_PER_SENTENCE)
}

impl RetryTier {
    /// Render the corrective instruction sent back to the model as the
    /// next user turn.
    pub fn instruction(&self) -> String {
        match *self {
            RetryTier::EmergencyTruncate { target, word_count } => {
                let cap = target + 15;
                let min_sentences = (target / 20).max(3);
                let max_sentences = min_sentences + 2;
                format!(
                    "STRICT LENGTH CHECK: your response ({word_count} words) missed the \
                     {target}-word target.\n\nRewrite the whole answer in at most {cap} words, \
                     using {min_sentences} to {max_sentences} sentences. Do not add an \
                     introduction or a conclusion; start with the substance."
                )
            }
            RetryTier::AggressiveSummarize { target, word_count } => {
                let sentences = sentence_target(target);
                format!(
                    "STRICT SYSTEM ALERT: your output ({word_count} words) is far past the \
                     target ({target} words).\n\nSUMMARIZE AGGRESSIVELY. Cut everything \
                     non-essential, including introductions and conclusions. Aim for exactly \
                     {sentences} sentences."
                )
            }
            RetryTier::Trim { target, excess } => {
                let sentences = sentence_target(target);
                format!(
                    "Word count check: you are over by {excess} words. Trim lightly to reach \
                     approximately {target} words, around {sentences} sentences."
                )
            }
            RetryTier::Expand { target, shortfall } => {
                format!(
                    "Word count check: you are under by {shortfall} words. Expand slightly to \
                     reach approximately {target} words. Add a bit more detail under the \
                     existing subheadings."
                )
            }
        }
    }
}
