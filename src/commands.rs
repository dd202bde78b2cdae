//! Implementations of the `counsel` CLI commands.
//!
//! Each `run_*` function loads what it needs, writes its result to stdout
//! and returns an error only for problems the user has to fix (missing file,
//! unsupported format, bad option). An unsuccessful answer is not an error:
//! [`run_ask`] reports it through its returned [`AnswerStatus`] so the binary
//! can pick the exit code. [`run_analyze`] does the same for its optional
//! summary.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use serde::Serialize;

use crate::analysis::{analyze_text, document_metadata, Analysis};
use crate::config::Config;
use crate::extract::read_document;
use crate::generation::GenerationService;
use crate::models::{Answer, AnswerOptions, AnswerOverrides, AnswerStatus, SourceFormat};
use crate::normalize::{normalize, segment, NormalizeError};
use crate::pipeline;
use crate::risk::{assess_text, RiskAssessment};
use crate::simplify::simplify;

/// A document as the CLI reads it: extracted text, or raw bytes to extract later.
enum Input {
    Text(String),
    Bytes(Vec<u8>, SourceFormat),
}

/// `.txt`/`.md` files are read as-is; `.pdf`/`.docx` go through extraction.
fn is_plain_text(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("txt") | Some("md")
    )
}

fn check_size(path: &Path, config: &Config) -> Result<()> {
    let max = config.context.max_file_bytes();
    let size = std::fs::metadata(path)
        .with_context(|| format!("Failed to read {}", path.display()))?
        .len();
    if size > max {
        bail!(
            "{} is {} bytes, limit is {} bytes (context.max_file_size_mb)",
            path.display(),
            size,
            max
        );
    }
    Ok(())
}

fn read_plain_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_input(path: &Path, config: &Config) -> Result<Input> {
    check_size(path, config)?;
    if is_plain_text(path) {
        return Ok(Input::Text(read_plain_text(path)?));
    }
    let format = SourceFormat::from_path(path)?;
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Input::Bytes(bytes, format))
}

/// Extracts the text of any supported file, failing on extraction errors.
fn read_text(path: &Path, config: &Config) -> Result<String> {
    if is_plain_text(path) {
        check_size(path, config)?;
        return read_plain_text(path);
    }
    let doc = read_document(path, config.context.max_file_bytes())
        .with_context(|| format!("Failed to extract {}", path.display()))?;
    eprintln!(
        "{}: {} ({} chars, sha256 {})",
        doc.filename.as_deref().unwrap_or("document"),
        doc.format,
        doc.raw_text.chars().count(),
        &doc.content_hash[..12]
    );
    Ok(doc.raw_text)
}

fn answer_options(config: &Config, overrides: &AnswerOverrides) -> Result<AnswerOptions> {
    overrides
        .apply(config.answer_options(), &config.answer_limits())
        .map_err(anyhow::Error::msg)
}

/// Cancelled on Ctrl+C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    cancel
}

/// `counsel ask`: answers a question, optionally about a document.
pub async fn run_ask(
    config: &Config,
    service: Arc<dyn GenerationService>,
    file: Option<&Path>,
    question: &str,
    overrides: &AnswerOverrides,
    json: bool,
) -> Result<AnswerStatus> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }
    let options = answer_options(config, overrides)?;
    let input = file.map(|p| read_input(p, config)).transpose()?;

    let cancel = interrupt_token();

    let answer = match input {
        None => pipeline::answer(service, None, question, &options, &cancel).await,
        Some(Input::Text(text)) => {
            pipeline::answer(service, Some(&text), question, &options, &cancel).await
        }
        Some(Input::Bytes(bytes, format)) => {
            pipeline::answer_bytes(service, bytes, format, question, &options, &cancel).await
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(answer.status);
    }

    if let Some(notice) = &answer.context_notice {
        eprintln!("note: {}", notice);
    }
    print_answer(&answer);
    Ok(answer.status)
}

fn print_answer(answer: &Answer) {
    if answer.status.is_success() {
        println!("{}", answer.text);
        if let Some(caveat) = answer.caveat {
            println!();
            println!("({})", caveat.notice());
        }
    } else {
        eprintln!("{}", answer.status.user_message());
        if let Some(error) = &answer.error {
            eprintln!("error [{}]: {}", answer.status, error);
        }
    }
}

/// `counsel extract`: prints extracted text, or the normalized context window.
pub fn run_extract(config: &Config, file: &Path, normalized: bool) -> Result<()> {
    let text = read_text(file, config)?;
    let meta = document_metadata(&text);
    eprintln!(
        "{} chars, {} words, {} sentences, {} clauses, {} units",
        meta.chars, meta.words, meta.sentences, meta.clauses, meta.units
    );
    if !normalized {
        println!("{}", text);
        return Ok(());
    }

    let window = normalize(&text, config.context.max_context_chars)?;
    eprintln!(
        "{} of {} units, {} chars{}",
        window.units.len(),
        window.total_units,
        window.char_len(),
        if window.truncated { ", truncated" } else { "" }
    );
    println!("{}", window.render());
    Ok(())
}

/// `counsel risk`: scores a document's risky clauses.
pub fn run_risk(config: &Config, file: &Path, json: bool) -> Result<()> {
    let text = read_text(file, config)?;
    let assessment = assess_text(&text, &config.risk);

    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
        return Ok(());
    }
    print_risk(&assessment);
    Ok(())
}

fn print_risk(assessment: &RiskAssessment) {
    println!(
        "Risk: {} (score {:.2}, {} risky clause{})",
        assessment.level,
        assessment.score,
        assessment.clauses.len(),
        if assessment.clauses.len() == 1 { "" } else { "s" }
    );
    for clause in &assessment.clauses {
        println!();
        println!(
            "[{}] #{} {} (confidence {:.1})",
            clause.category, clause.unit_index, clause.keyword, clause.confidence
        );
        println!("    {}", clause.text);
    }
    println!();
    println!("Recommendations:");
    for rec in &assessment.recommendations {
        println!("  - {}", rec);
    }
}

/// `counsel simplify`: rewrites legal terms in plain language.
pub fn run_simplify(config: &Config, file: &Path, json: bool) -> Result<()> {
    let text = read_text(file, config)?;
    let units = segment(&text);
    if units.is_empty() {
        return Err(NormalizeError::NoContent.into());
    }
    let simplified = simplify(&units.join("\n\n"));

    if json {
        println!("{}", serde_json::to_string_pretty(&simplified)?);
        return Ok(());
    }

    println!("{}", simplified.text);
    if !simplified.replacements.is_empty() {
        eprintln!();
        for r in &simplified.replacements {
            eprintln!("{} -> {} (x{})", r.term, r.plain, r.count);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct AnalysisReport<'a> {
    #[serde(flatten)]
    analysis: &'a Analysis,
    summary: Option<&'a Answer>,
}

/// `counsel analyze`: metadata, risk and plain-language text for a document,
/// plus a generated summary when `service` is given.
///
/// Returns the summary's status, or `None` when no summary was asked for.
pub async fn run_analyze(
    config: &Config,
    service: Option<Arc<dyn GenerationService>>,
    file: &Path,
    overrides: &AnswerOverrides,
    json: bool,
) -> Result<Option<AnswerStatus>> {
    let options = answer_options(config, overrides)?;
    let text = read_text(file, config)?;
    let analysis = analyze_text(&text, &config.risk)?;

    let summary = match service {
        Some(service) => Some(
            pipeline::summarize(
                service,
                &text,
                config.analysis.summary_words,
                &options,
                &interrupt_token(),
            )
            .await?,
        ),
        None => None,
    };

    if json {
        let report = AnalysisReport {
            analysis: &analysis,
            summary: summary.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(summary.map(|s| s.status));
    }

    let meta = &analysis.metadata;
    println!(
        "Document: {} chars, {} words, {} sentences, {} clauses, {} units",
        meta.chars, meta.words, meta.sentences, meta.clauses, meta.units
    );
    if let Some(answer) = &summary {
        println!();
        println!("Summary:");
        print_answer(answer);
    }
    println!();
    print_risk(&analysis.risk);
    println!();
    println!("Plain language:");
    println!("{}", analysis.simplified.text);
    Ok(summary.map(|s| s.status))
}

/// `counsel check`: validates the configuration and reports the generation setup.
///
/// Never prints the API key itself, only whether it is set.
pub fn run_check(config: &Config, config_path: &Path) -> Result<()> {
    crate::config::validate(config)?;

    let source = if config_path.exists() {
        config_path.display().to_string()
    } else {
        "built-in defaults".to_string()
    };
    println!("config:     {}", source);
    println!("provider:   {}", config.generation.provider);
    if !config.generation.is_enabled() {
        println!("generation is disabled; `ask` will report generation_service_error");
        return Ok(());
    }

    println!("base_url:   {}", config.generation.base_url);
    println!("model:      {}", config.generation.model);
    println!(
        "budgets:    context {} chars, prompt {} chars",
        config.context.max_context_chars, config.context.max_prompt_chars
    );
    println!(
        "timeout:    {} ms, {} retr{}",
        config.generation.timeout_ms,
        config.generation.retry_count,
        if config.generation.retry_count == 1 { "y" } else { "ies" }
    );

    match config.generation.api_key() {
        Some(_) => println!("api key:    {} is set", config.generation.api_key_env),
        None => bail!("{} environment variable not set", config.generation.api_key_env),
    }
    Ok(())
}
