//! Whole-document analysis: size metadata, risk assessment and a
//! plain-language rewrite, computed locally.
//!
//! A generated summary is not part of [`Analysis`]; callers that want one run
//! [`crate::pipeline::summarize`] on the same text, since it needs the
//! generation service.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::RiskConfig;
use crate::normalize::{segment, NormalizeError};
use crate::risk::{assess_text, RiskAssessment};
use crate::simplify::{simplify, Simplified};

static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").unwrap());
static CLAUSE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r";\s*|[.!?]+\s+").unwrap());

/// Size of a document after cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    /// Characters of cleaned text.
    pub chars: usize,
    pub words: usize,
    pub sentences: usize,
    /// Sentences further split at semicolons.
    pub clauses: usize,
    /// Paragraphs and numbered clauses found by segmentation.
    pub units: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub metadata: DocumentMetadata,
    pub risk: RiskAssessment,
    pub simplified: Simplified,
}

/// Counts the cleaned text of `raw`.
pub fn document_metadata(raw: &str) -> DocumentMetadata {
    let units = segment(raw);
    let text = units.join("\n\n");
    DocumentMetadata {
        chars: text.chars().count(),
        words: text.split_whitespace().count(),
        sentences: units.iter().map(|u| count_pieces(&SENTENCE_BREAK, u)).sum(),
        clauses: units.iter().map(|u| count_pieces(&CLAUSE_BREAK, u)).sum(),
        units: units.len(),
    }
}

/// Pieces between breaks that contain at least one letter, so a bare
/// clause number like `1.` is not counted.
fn count_pieces(breaks: &Regex, unit: &str) -> usize {
    breaks
        .split(unit)
        .filter(|piece| piece.chars().any(char::is_alphabetic))
        .count()
}

/// Analyzes a document locally.
///
/// # Errors
///
/// [`NormalizeError::NoContent`] when nothing is left after cleaning.
pub fn analyze_text(raw: &str, risk: &RiskConfig) -> Result<Analysis, NormalizeError> {
    let metadata = document_metadata(raw);
    if metadata.units == 0 {
        return Err(NormalizeError::NoContent);
    }
    let cleaned = segment(raw).join("\n\n");
    let analysis = Analysis {
        metadata,
        risk: assess_text(raw, risk),
        simplified: simplify(&cleaned),
    };
    tracing::info!(
        chars = metadata.chars,
        units = metadata.units,
        risky_clauses = analysis.risk.clauses.len(),
        replacements = analysis.simplified.replacements.len(),
        "document analyzed"
    );
    Ok(analysis)
}
