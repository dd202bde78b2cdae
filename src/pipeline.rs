//! Caller-facing question answering.
//!
//! [`answer`] runs one query through the whole pipeline ([`summarize`] runs
//! the same stages with the summary prompt):
//!
//! ```text
//! document text ─▶ normalize ─▶ build_prompt ─▶ Mediator ─▶ Answer
//! ```
//!
//! Every run owns its document, window and prompt; nothing is cached or
//! shared between runs. A run never fails: problems surface as the
//! [`AnswerStatus`] of the returned [`Answer`]. A document that cannot be
//! used (unreadable, no text left after cleaning, or no room for it in the
//! prompt budget) degrades the run to a general-information answer and is
//! explained in `context_notice`.

use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::extract::extract_text;
use crate::generation::GenerationService;
use crate::mediator::{Mediator, MediatorOptions};
use crate::models::{Answer, AnswerOptions, AnswerStatus, ContextWindow, Prompt, SourceFormat};
use crate::normalize::{normalize, NormalizeError};
use crate::prompt::{build_prompt, build_summary_prompt, PromptError};

const NO_ROOM_NOTICE: &str =
    "The document did not fit the prompt budget; this is general information, not based on it.";

/// Where a single query run is. Terminal states never transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Normalizing,
    Building,
    Calling,
    Succeeded,
    TimedOut,
    ServiceError,
    EmptyReply,
    Cancelled,
    /// The prompt could not be built within budget.
    Rejected,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Succeeded
                | PipelineState::TimedOut
                | PipelineState::ServiceError
                | PipelineState::EmptyReply
                | PipelineState::Cancelled
                | PipelineState::Rejected
        )
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Normalizing)
                | (Normalizing, Building)
                | (Building, Calling)
                | (Building, Rejected)
                | (Calling, Succeeded)
                | (Calling, TimedOut)
                | (Calling, ServiceError)
                | (Calling, EmptyReply)
                | (Calling, Cancelled)
        )
    }

    /// Terminal state reached after the call for a given status.
    pub fn after_call(status: AnswerStatus) -> PipelineState {
        match status {
            AnswerStatus::Succeeded => PipelineState::Succeeded,
            AnswerStatus::EmptyResponse => PipelineState::EmptyReply,
            AnswerStatus::GenerationTimeout => PipelineState::TimedOut,
            AnswerStatus::GenerationServiceError => PipelineState::ServiceError,
            AnswerStatus::Cancelled => PipelineState::Cancelled,
            AnswerStatus::PromptTooLarge => PipelineState::Rejected,
        }
    }
}

/// Per-query state tracker.
struct Run {
    state: PipelineState,
    started: Instant,
}

impl Run {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }
}

/// Answers `question`, grounded in `document_text` when given.
pub async fn answer(
    service: Arc<dyn GenerationService>,
    document_text: Option<&str>,
    question: &str,
    options: &AnswerOptions,
    cancel: &CancellationToken,
) -> Answer {
    run(service, document_text, None, question, options, cancel).await
}

/// Extracts text from document bytes, then answers.
///
/// An extraction failure does not abort: the question is answered with
/// general information and the failure is reported in `context_notice`.
pub async fn answer_bytes(
    service: Arc<dyn GenerationService>,
    bytes: Vec<u8>,
    format: SourceFormat,
    question: &str,
    options: &AnswerOptions,
    cancel: &CancellationToken,
) -> Answer {
    let extracted = tokio::task::spawn_blocking(move || extract_text(&bytes, format)).await;

    match extracted {
        Ok(Ok(text)) => run(service, Some(&text), None, question, options, cancel).await,
        Ok(Err(e)) => {
            tracing::warn!(%format, error = %e, "document extraction failed, answering without it");
            let notice = format!("The document could not be read ({}).", e);
            run(service, None, Some(notice), question, options, cancel).await
        }
        Err(e) => {
            tracing::warn!(%format, error = %e, "extraction task failed, answering without it");
            let notice = "The document could not be read.".to_string();
            run(service, None, Some(notice), question, options, cancel).await
        }
    }
}

/// Summarizes `document_text` in about `summary_words` words.
///
/// # Errors
///
/// [`NormalizeError::NoContent`] when the document has no usable text. Every
/// other problem is reported through the [`AnswerStatus`] of the answer.
pub async fn summarize(
    service: Arc<dyn GenerationService>,
    document_text: &str,
    summary_words: usize,
    options: &AnswerOptions,
    cancel: &CancellationToken,
) -> Result<Answer, NormalizeError> {
    let mut run = Run::new();

    run.advance(PipelineState::Normalizing);
    let window = normalize(document_text, options.max_context_chars)?;

    run.advance(PipelineState::Building);
    let built = build_summary_prompt(&window, summary_words, options.max_prompt_chars);
    Ok(complete(run, built, window.truncated, None, service, options, cancel).await)
}

async fn run(
    service: Arc<dyn GenerationService>,
    document_text: Option<&str>,
    mut context_notice: Option<String>,
    question: &str,
    options: &AnswerOptions,
    cancel: &CancellationToken,
) -> Answer {
    let mut run = Run::new();

    run.advance(PipelineState::Normalizing);
    let window: Option<ContextWindow> = match document_text {
        Some(text) => match normalize(text, options.max_context_chars) {
            Ok(window) => Some(window),
            Err(e) => {
                tracing::warn!(error = %e, "document has no usable text, answering without it");
                if context_notice.is_none() {
                    context_notice = Some(format!("The document was not used: {}.", e));
                }
                None
            }
        },
        None => None,
    };

    run.advance(PipelineState::Building);
    let built = build_prompt(window.as_ref(), question, options.max_prompt_chars);
    let dropped_for_budget =
        window.is_some() && matches!(&built, Ok(p) if !p.variant.is_grounded());
    if dropped_for_budget && context_notice.is_none() {
        context_notice = Some(NO_ROOM_NOTICE.to_string());
    }

    let window_truncated = window.as_ref().map(|w| w.truncated).unwrap_or(false);
    complete(run, built, window_truncated, context_notice, service, options, cancel).await
}

/// Sends a built prompt through the mediator and assembles the [`Answer`].
async fn complete(
    mut run: Run,
    built: Result<Prompt, PromptError>,
    window_truncated: bool,
    context_notice: Option<String>,
    service: Arc<dyn GenerationService>,
    options: &AnswerOptions,
    cancel: &CancellationToken,
) -> Answer {
    let prompt = match built {
        Ok(prompt) => prompt,
        Err(e) => {
            run.advance(PipelineState::Rejected);
            tracing::warn!(error = %e, "prompt rejected");
            return Answer {
                text: String::new(),
                status: AnswerStatus::PromptTooLarge,
                truncated: window_truncated,
                variant: None,
                caveat: None,
                error: Some(e.to_string()),
                attempts: 0,
                context_notice,
            };
        }
    };

    run.advance(PipelineState::Calling);
    let mediator = Mediator::new(service, MediatorOptions::from_answer_options(options));
    let mediated = mediator.mediate(&prompt, cancel).await;
    run.advance(PipelineState::after_call(mediated.status));

    tracing::info!(
        variant = ?prompt.variant,
        truncated = prompt.truncated,
        prompt_chars = prompt.char_len(),
        status = %mediated.status,
        attempts = mediated.attempts,
        elapsed_ms = run.started.elapsed().as_millis() as u64,
        "query answered"
    );

    Answer {
        text: mediated.text,
        status: mediated.status,
        truncated: prompt.truncated,
        variant: Some(prompt.variant),
        caveat: mediated.caveat,
        error: mediated.error,
        attempts: mediated.attempts,
        context_notice,
    }
}
