//! Core data models used throughout Counsel.
//!
//! These types represent the documents, context windows, prompts, and answers
//! that flow through a single question-answering run. None of them is shared
//! between runs; each query constructs its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Pdf,
    Docx,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Pdf => write!(f, "pdf"),
            SourceFormat::Docx => write!(f, "docx"),
        }
    }
}

/// An uploaded document after text extraction. Immutable once built.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub filename: Option<String>,
    pub format: SourceFormat,
    pub raw_text: String,
    /// SHA-256 of the uploaded bytes, hex encoded.
    pub content_hash: String,
    pub extracted_at: DateTime<Utc>,
}

/// One logical unit (paragraph or clause) of cleaned document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextUnit {
    /// Position of the unit in the cleaned source document.
    pub index: usize,
    pub text: String,
}

/// Size-bounded, cleaned excerpt of a document, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    pub units: Vec<ContextUnit>,
    /// Number of units in the cleaned document before any truncation.
    pub total_units: usize,
    pub truncated: bool,
}

impl ContextWindow {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Number of source units that did not make it into the window.
    pub fn omitted(&self) -> usize {
        self.total_units.saturating_sub(self.units.len())
    }

    /// Renders the window as prompt text.
    ///
    /// Units are separated by a blank line. Wherever source units were
    /// dropped, an omission marker takes their place so the reader of the
    /// prompt can see the excerpt is partial.
    pub fn render(&self) -> String {
        render_units(&self.units, self.total_units)
    }

    pub fn char_len(&self) -> usize {
        self.render().chars().count()
    }
}

/// Marker inserted where `n` units were dropped from the middle of a window.
pub fn omission_marker(n: usize) -> String {
    if n == 1 {
        "[... 1 section omitted ...]".to_string()
    } else {
        format!("[... {} sections omitted ...]", n)
    }
}

pub(crate) fn render_units(units: &[ContextUnit], total_units: usize) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(units.len() + 2);
    let mut expected = 0usize;
    for unit in units {
        if unit.index > expected {
            parts.push(omission_marker(unit.index - expected));
        }
        parts.push(unit.text.clone());
        expected = unit.index + 1;
    }
    if !units.is_empty() && total_units > expected {
        parts.push(omission_marker(total_units - expected));
    }
    parts.join("\n\n")
}

/// Which fixed instruction the prompt was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionVariant {
    /// Answer only from the supplied document context.
    DocumentGrounded,
    /// No usable document: general legal information.
    GeneralInformation,
    /// Summarize the supplied document context.
    DocumentSummary,
}

impl InstructionVariant {
    /// Whether the prompt carries document context.
    pub fn is_grounded(self) -> bool {
        !matches!(self, InstructionVariant::GeneralInformation)
    }
}

/// The exact payload sent to the generation service.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub variant: InstructionVariant,
    /// Set when any document context was dropped on the way here.
    pub truncated: bool,
}

impl Prompt {
    /// Total prompt size in characters (instruction + user message).
    pub fn char_len(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

/// Outcome of one question-answering run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Succeeded,
    EmptyResponse,
    GenerationTimeout,
    GenerationServiceError,
    Cancelled,
    PromptTooLarge,
}

impl AnswerStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AnswerStatus::Succeeded)
    }

    /// Short, actionable message for a user interface.
    pub fn user_message(&self) -> &'static str {
        match self {
            AnswerStatus::Succeeded => "",
            AnswerStatus::EmptyResponse => {
                "The assistant returned no answer. Try rephrasing the question."
            }
            AnswerStatus::GenerationTimeout | AnswerStatus::GenerationServiceError => {
                "The assistant is temporarily unavailable. Please try again shortly."
            }
            AnswerStatus::Cancelled => "The request was cancelled.",
            AnswerStatus::PromptTooLarge => "The question is too long to send.",
        }
    }
}

impl fmt::Display for AnswerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnswerStatus::Succeeded => "succeeded",
            AnswerStatus::EmptyResponse => "empty_response",
            AnswerStatus::GenerationTimeout => "generation_timeout",
            AnswerStatus::GenerationServiceError => "generation_service_error",
            AnswerStatus::Cancelled => "cancelled",
            AnswerStatus::PromptTooLarge => "prompt_too_large",
        };
        f.write_str(s)
    }
}

/// Notice attached to an answer that callers should render alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Caveat {
    PartialContext,
}

impl Caveat {
    pub fn notice(&self) -> &'static str {
        match self {
            Caveat::PartialContext => "Based on partial document context.",
        }
    }
}

/// The caller-facing response of [`crate::pipeline::answer`].
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub status: AnswerStatus,
    pub truncated: bool,
    /// `None` when the run stopped before a prompt was built.
    pub variant: Option<InstructionVariant>,
    pub caveat: Option<Caveat>,
    pub error: Option<String>,
    /// Number of calls made to the generation service.
    pub attempts: u32,
    /// Why a supplied document could not be used as context.
    pub context_notice: Option<String>,
}

/// Per-query options recognized by [`crate::pipeline::answer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerOptions {
    pub max_context_chars: usize,
    pub max_prompt_chars: usize,
    pub timeout_ms: u64,
    pub retry_count: u32,
    /// Base delay before the first retry; doubles per retry.
    pub backoff_ms: u64,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self {
            max_context_chars: 12_000,
            max_prompt_chars: 16_000,
            timeout_ms: 30_000,
            retry_count: 0,
            backoff_ms: 1_000,
        }
    }
}

/// Upper bounds on what a single request may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerLimits {
    pub max_retry_count: u32,
    pub max_timeout_ms: u64,
}

impl Default for AnswerLimits {
    fn default() -> Self {
        Self {
            max_retry_count: 5,
            max_timeout_ms: 120_000,
        }
    }
}

/// Per-request overrides layered over configured [`AnswerOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnswerOverrides {
    pub max_context_chars: Option<usize>,
    pub max_prompt_chars: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub retry_count: Option<u32>,
}

impl AnswerOverrides {
    /// Applies the overrides to `base`.
    ///
    /// Zero budgets and a zero timeout are rejected, as are retries and
    /// timeouts above `limits`.
    pub fn apply(
        &self,
        base: AnswerOptions,
        limits: &AnswerLimits,
    ) -> Result<AnswerOptions, String> {
        let options = AnswerOptions {
            max_context_chars: self.max_context_chars.unwrap_or(base.max_context_chars),
            max_prompt_chars: self.max_prompt_chars.unwrap_or(base.max_prompt_chars),
            timeout_ms: self.timeout_ms.unwrap_or(base.timeout_ms),
            retry_count: self.retry_count.unwrap_or(base.retry_count),
            backoff_ms: base.backoff_ms,
        };
        if options.max_context_chars == 0 || options.max_prompt_chars == 0 {
            return Err("character budgets must be > 0".to_string());
        }
        if options.timeout_ms == 0 {
            return Err("timeout_ms must be > 0".to_string());
        }
        if options.timeout_ms > limits.max_timeout_ms {
            return Err(format!("timeout_ms must be <= {}", limits.max_timeout_ms));
        }
        if options.retry_count > limits.max_retry_count {
            return Err(format!("retry_count must be <= {}", limits.max_retry_count));
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(index: usize, text: &str) -> ContextUnit {
        ContextUnit {
            index,
            text: text.to_string(),
        }
    }

    #[test]
    fn render_full_window_has_no_marker() {
        let window = ContextWindow {
            units: vec![unit(0, "First."), unit(1, "Second.")],
            total_units: 2,
            truncated: false,
        };
        assert_eq!(window.render(), "First.\n\nSecond.");
        assert_eq!(window.omitted(), 0);
    }

    #[test]
    fn render_marks_middle_gap() {
        let window = ContextWindow {
            units: vec![unit(0, "Head."), unit(4, "Tail.")],
            total_units: 5,
            truncated: true,
        };
        assert_eq!(
            window.render(),
            "Head.\n\n[... 3 sections omitted ...]\n\nTail."
        );
        assert_eq!(window.omitted(), 3);
    }

    #[test]
    fn render_marks_dropped_tail() {
        let window = ContextWindow {
            units: vec![unit(0, "Only.")],
            total_units: 2,
            truncated: true,
        };
        assert_eq!(window.render(), "Only.\n\n[... 1 section omitted ...]");
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&AnswerStatus::GenerationTimeout).unwrap();
        assert_eq!(json, "\"generation_timeout\"");
        assert_eq!(AnswerStatus::EmptyResponse.to_string(), "empty_response");
    }

    #[test]
    fn overrides_layer_over_base() {
        let overrides: AnswerOverrides =
            serde_json::from_str(r#"{"timeout_ms": 500, "retry_count": 1}"#).unwrap();
        let opts = overrides
            .apply(AnswerOptions::default(), &AnswerLimits::default())
            .unwrap();
        assert_eq!(opts.timeout_ms, 500);
        assert_eq!(opts.retry_count, 1);
        assert_eq!(opts.max_context_chars, 12_000);

        let zero = AnswerOverrides {
            max_prompt_chars: Some(0),
            ..AnswerOverrides::default()
        };
        assert!(zero
            .apply(AnswerOptions::default(), &AnswerLimits::default())
            .is_err());
    }

    #[test]
    fn overrides_cannot_exceed_limits() {
        let limits = AnswerLimits::default();
        let greedy: AnswerOverrides =
            serde_json::from_str(r#"{"retry_count": 4294967295}"#).unwrap();
        let err = greedy.apply(AnswerOptions::default(), &limits).unwrap_err();
        assert!(err.contains("retry_count"));

        let slow = AnswerOverrides {
            timeout_ms: Some(u64::MAX),
            ..AnswerOverrides::default()
        };
        assert!(slow.apply(AnswerOptions::default(), &limits).is_err());

        let at_limit = AnswerOverrides {
            retry_count: Some(limits.max_retry_count),
            timeout_ms: Some(limits.max_timeout_ms),
            ..AnswerOverrides::default()
        };
        let opts = at_limit.apply(AnswerOptions::default(), &limits).unwrap();
        assert_eq!(opts.retry_count, 5);
    }

    #[test]
    fn only_general_variant_is_ungrounded() {
        assert!(InstructionVariant::DocumentGrounded.is_grounded());
        assert!(InstructionVariant::DocumentSummary.is_grounded());
        assert!(!InstructionVariant::GeneralInformation.is_grounded());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: AnswerOptions = serde_json::from_str(r#"{"retry_count": 2}"#).unwrap();
        assert_eq!(opts.retry_count, 2);
        assert_eq!(opts.max_prompt_chars, 16_000);
    }
}
