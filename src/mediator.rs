//! Response mediator: one prompt in, one classified reply out.
//!
//! The mediator owns everything around the remote call that the
//! [`GenerationService`] itself does not: the per-attempt timeout, bounded
//! retries with exponential backoff, cooperative cancellation, and reply
//! post-processing. The partial-context caveat is attached only to replies
//! built on a truncated document excerpt, never to general answers.
//!
//! # Retry Strategy
//!
//! `retry_count = 0` (the default) means exactly one call. With retries
//! enabled, only transient failures are repeated:
//! - timeout, transport error, HTTP 429, HTTP 5xx → retry
//! - HTTP 4xx (including 401/403), invalid reply, disabled service → fail immediately
//! - Backoff: `backoff_base × 2^(attempt-1)`, exponent capped at 5

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::generation::{GenerationError, GenerationService};
use crate::models::{AnswerOptions, AnswerStatus, Caveat, Prompt};

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").unwrap());

static DISCLAIMER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:not (?:formal |professional )?legal advice|not a substitute for (?:professional )?legal advice|consult (?:with )?(?:a |an )?(?:qualified |licensed )?(?:lawyer|attorney|legal professional))\b",
    )
    .unwrap()
});

static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").unwrap());

/// A sentence is boilerplate when fewer letters and digits than this remain
/// after its disclaimer phrase is removed.
const MAX_DISCLAIMER_RESIDUE: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct MediatorOptions {
    /// Bound on each individual attempt.
    pub timeout: Duration,
    /// Additional attempts after the first, for transient failures only.
    pub retry_count: u32,
    pub backoff_base: Duration,
}

impl Default for MediatorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_count: 0,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl MediatorOptions {
    pub fn from_answer_options(options: &AnswerOptions) -> Self {
        Self {
            timeout: Duration::from_millis(options.timeout_ms),
            retry_count: options.retry_count,
            backoff_base: Duration::from_millis(options.backoff_ms),
        }
    }
}

/// Result of mediating one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mediated {
    pub status: AnswerStatus,
    /// Post-processed reply; empty unless `status` is `Succeeded`.
    pub text: String,
    pub caveat: Option<Caveat>,
    pub error: Option<String>,
    /// Calls actually started against the service.
    pub attempts: u32,
}

impl Mediated {
    fn failed(status: AnswerStatus, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            status,
            text: String::new(),
            caveat: None,
            error: Some(error.into()),
            attempts,
        }
    }
}

pub struct Mediator {
    service: Arc<dyn GenerationService>,
    options: MediatorOptions,
}

impl Mediator {
    pub fn new(service: Arc<dyn GenerationService>, options: MediatorOptions) -> Self {
        Self { service, options }
    }

    /// Sends `prompt` to the service and classifies the outcome.
    ///
    /// Never fails: every error becomes a [`Mediated`] with the matching
    /// [`AnswerStatus`].
    pub async fn mediate(&self, prompt: &Prompt, cancel: &CancellationToken) -> Mediated {
        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Mediated::failed(AnswerStatus::Cancelled, "request cancelled", attempts);
            }
            attempts += 1;
            tracing::debug!(attempt = attempts, model = self.service.model(), "calling generation service");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Mediated::failed(AnswerStatus::Cancelled, "request cancelled", attempts);
                }
                r = tokio::time::timeout(self.options.timeout, self.service.generate(prompt)) => {
                    r.unwrap_or(Err(GenerationError::Timeout))
                }
            };

            let err = match result {
                Ok(reply) => return finish(&reply, prompt, attempts),
                Err(err) => err,
            };

            if !err.is_retryable() || attempts > self.options.retry_count {
                tracing::warn!(attempts, error = %err, "generation failed");
                return Mediated::failed(status_for(&err), err.to_string(), attempts);
            }

            let delay = backoff(self.options.backoff_base, attempts);
            tracing::warn!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient generation failure, retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Mediated::failed(AnswerStatus::Cancelled, "request cancelled", attempts);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn status_for(err: &GenerationError) -> AnswerStatus {
    match err {
        GenerationError::Timeout => AnswerStatus::GenerationTimeout,
        _ => AnswerStatus::GenerationServiceError,
    }
}

/// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, ... up to 32×base.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(5))
}

fn finish(reply: &str, prompt: &Prompt, attempts: u32) -> Mediated {
    let text = collapse_disclaimers(reply.trim());
    if text.is_empty() {
        return Mediated {
            status: AnswerStatus::EmptyResponse,
            text,
            caveat: None,
            error: Some("generation service returned an empty reply".to_string()),
            attempts,
        };
    }
    Mediated {
        status: AnswerStatus::Succeeded,
        text,
        caveat: (prompt.variant.is_grounded() && prompt.truncated)
            .then_some(Caveat::PartialContext),
        error: None,
        attempts,
    }
}

/// Drops repeated disclaimer paragraphs, keeping the first disclaimer.
///
/// Only paragraphs made entirely of disclaimer boilerplate are dropped. A
/// paragraph that mentions "consult a lawyer" alongside real content is
/// always kept.
pub fn collapse_disclaimers(text: &str) -> String {
    let paragraphs: Vec<&str> = PARAGRAPH_BREAK.split(text).collect();
    let mut seen = false;
    let mut dropped = 0usize;
    let mut kept = Vec::with_capacity(paragraphs.len());
    for paragraph in paragraphs {
        if !DISCLAIMER.is_match(paragraph) {
            kept.push(paragraph);
            continue;
        }
        if seen && is_boilerplate(paragraph) {
            dropped += 1;
            continue;
        }
        seen = true;
        kept.push(paragraph);
    }

    if dropped == 0 {
        return text.to_string();
    }
    tracing::debug!(dropped, "collapsed repeated disclaimers");
    kept.join("\n\n")
}

fn is_boilerplate(paragraph: &str) -> bool {
    SENTENCE_BREAK
        .split(paragraph)
        .filter(|s| !s.trim().is_empty())
        .all(|sentence| {
            DISCLAIMER.is_match(sentence)
                && DISCLAIMER
                    .replace_all(sentence, "")
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .count()
                    < MAX_DISCLAIMER_RESIDUE
        })
}
