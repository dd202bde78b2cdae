//! Prompt builder: context window + question → [`Prompt`].
//!
//! Three fixed instructions exist. The document-grounded one confines the
//! model to the supplied excerpt and asks for an explicit
//! "not found in document" when the excerpt cannot answer; the
//! general-information one is used when no document context is available;
//! the summary one asks for a plain-language summary of the excerpt.
//! All of them forbid presenting the output as formal legal advice.
//!
//! The prompt never exceeds `max_prompt_chars`. Only the document context is
//! ever shortened to get there; the instruction and the question are sent
//! verbatim.

use crate::models::{ContextWindow, InstructionVariant, Prompt};
use crate::normalize::fit_units;

/// Phrase the model is told to use when the document does not answer the question.
pub const NOT_FOUND_PHRASE: &str = "not found in document";

const GROUNDED_INSTRUCTION: &str = "You are a cautious assistant that explains legal documents in plain language.

Rules:
1. Answer ONLY from the document context supplied in the user message. Do not use outside knowledge about the parties or the agreement.
2. If the context does not contain the answer, reply exactly: not found in document
3. Quote or name the clause you rely on when you can.
4. If the user message says the excerpt is partial, say that your answer is based on part of the document.
5. You provide legal information, not legal advice. Do not present your answer as formal legal advice and do not repeat this disclaimer more than once.";

const GENERAL_INSTRUCTION: &str = "You are a cautious legal information assistant. No document has been provided, so this answer is general legal information and is not based on any specific document.

Rules:
1. Explain the relevant legal concepts clearly and concisely, using numbered lists where they help.
2. If you are unsure, say so.
3. You provide legal information, not legal advice. Do not present your answer as formal legal advice and do not repeat this disclaimer more than once.";

const SUMMARY_INSTRUCTION: &str = "You summarize legal documents in plain language for people without legal training.

Rules:
1. Summarize ONLY the document context supplied in the user message.
2. Cover who the parties are, what the document is for, the main obligations of each party, money and deadlines, how it ends, and any terms that look unusual or one-sided.
3. If the user message says the excerpt is partial, say that the summary covers only part of the document.
4. You provide legal information, not legal advice. Do not present your summary as formal legal advice and do not repeat this disclaimer more than once.";

const PARTIAL_NOTE: &str =
    "NOTE: This is a partial excerpt. Some sections of the document were omitted to fit.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("prompt needs {size} characters but the limit is {limit}")]
    PromptTooLarge { size: usize, limit: usize },
}

/// Returns the fixed instruction for a variant.
pub fn instruction(variant: InstructionVariant) -> &'static str {
    match variant {
        InstructionVariant::DocumentGrounded => GROUNDED_INSTRUCTION,
        InstructionVariant::GeneralInformation => GENERAL_INSTRUCTION,
        InstructionVariant::DocumentSummary => SUMMARY_INSTRUCTION,
    }
}

/// Builds the prompt for `question`, grounded in `context` when there is any.
///
/// # Errors
///
/// [`PromptError::PromptTooLarge`] when the instruction and the question
/// alone exceed `max_prompt_chars`. Context is always shrunk or dropped
/// before this can happen, so the error means the question itself is too
/// long for the budget.
pub fn build_prompt(
    context: Option<&ContextWindow>,
    question: &str,
    max_prompt_chars: usize,
) -> Result<Prompt, PromptError> {
    let window = match context {
        Some(w) if !w.is_empty() => w,
        other => {
            let truncated = other.map(|w| w.truncated).unwrap_or(false);
            return general_prompt(question, truncated, max_prompt_chars);
        }
    };

    let request = format!("QUESTION: {}", question);
    match fit_context(InstructionVariant::DocumentGrounded, window, &request, max_prompt_chars) {
        Some(prompt) => Ok(prompt),
        None => {
            tracing::warn!(
                max_prompt_chars,
                "no room for document context, falling back to general information"
            );
            general_prompt(question, true, max_prompt_chars)
        }
    }
}

/// Builds a prompt asking for a summary of `window` in about `summary_words` words.
///
/// # Errors
///
/// [`PromptError::PromptTooLarge`] when the window is empty or not even a
/// shortened excerpt fits next to the instruction.
pub fn build_summary_prompt(
    window: &ContextWindow,
    summary_words: usize,
    max_prompt_chars: usize,
) -> Result<Prompt, PromptError> {
    let request = format!("TASK: Summarize this document in about {} words.", summary_words);
    let variant = InstructionVariant::DocumentSummary;
    if !window.is_empty() {
        if let Some(prompt) = fit_context(variant, window, &request, max_prompt_chars) {
            return Ok(prompt);
        }
    }
    let size = with_context(variant, &window.render(), window.truncated, &request).char_len();
    Err(PromptError::PromptTooLarge {
        size,
        limit: max_prompt_chars,
    })
}

/// Fits `window` next to the instruction and `request`, shrinking only the
/// context. `None` when no context fits at all.
fn fit_context(
    variant: InstructionVariant,
    window: &ContextWindow,
    request: &str,
    max_prompt_chars: usize,
) -> Option<Prompt> {
    let prompt = with_context(variant, &window.render(), window.truncated, request);
    if prompt.char_len() <= max_prompt_chars {
        return Some(prompt);
    }

    // Shrink the context into whatever room the instruction and request leave
    let overhead = with_context(variant, "", true, request).char_len();
    let refit = max_prompt_chars
        .checked_sub(overhead)
        .map(|room| fit_units(&window.units, window.total_units, room))
        .filter(|w| !w.is_empty())?;

    tracing::debug!(
        kept = refit.units.len(),
        total = refit.total_units,
        max_prompt_chars,
        "context shrunk to fit prompt budget"
    );
    Some(with_context(variant, &refit.render(), true, request))
}

fn with_context(
    variant: InstructionVariant,
    context: &str,
    partial: bool,
    request: &str,
) -> Prompt {
    let mut user = String::new();
    user.push_str("DOCUMENT CONTEXT:\n\"\"\"\n");
    user.push_str(context);
    user.push_str("\n\"\"\"\n\n");
    if partial {
        user.push_str(PARTIAL_NOTE);
        user.push_str("\n\n");
    }
    user.push_str(request);

    Prompt {
        system: instruction(variant).to_string(),
        user,
        variant,
        truncated: partial,
    }
}

fn general_prompt(
    question: &str,
    truncated: bool,
    max_prompt_chars: usize,
) -> Result<Prompt, PromptError> {
    let prompt = Prompt {
        system: GENERAL_INSTRUCTION.to_string(),
        user: format!("QUESTION: {}", question),
        variant: InstructionVariant::GeneralInformation,
        truncated,
    };
    let size = prompt.char_len();
    if size > max_prompt_chars {
        return Err(PromptError::PromptTooLarge {
            size,
            limit: max_prompt_chars,
        });
    }
    Ok(prompt)
}
