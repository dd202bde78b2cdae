//! # Counsel CLI (`counsel`)
//!
//! Ask questions about a legal document, extract its text, score its risky
//! clauses, or serve the same over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! counsel --config ./config/counsel.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `counsel ask "<question>" [--file doc.pdf]` | Answer a question, grounded in the document if given |
//! | `counsel extract <file>` | Print the extracted (or `--normalized`) text |
//! | `counsel risk <file>` | Detect risky clauses and score the document |
//! | `counsel simplify <file>` | Rewrite legal terms in plain language |
//! | `counsel analyze <file> [--summary]` | Metadata, risk and plain language, plus an optional summary |
//! | `counsel check` | Validate configuration and the generation setup |
//! | `counsel serve` | Start the JSON HTTP server |
//! | `counsel completions <shell>` | Print shell completions |
//!
//! ## Exit codes
//!
//! `0` success, `1` usage or configuration error, `2` the question (or the
//! requested summary) was processed but no answer was produced (timeout,
//! service error, empty reply, cancelled, prompt too large).
//!
//! Logs go to stderr, filtered by `RUST_LOG` (default `counsel=info`).

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use counsel::models::AnswerOverrides;
use counsel::{commands, config, generation, server};

/// Counsel: document-grounded answers to questions about legal documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without one, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "counsel",
    about = "Counsel: ask questions about legal documents",
    version,
    long_about = "Counsel extracts text from a PDF or Word document, fits it into a bounded \
    prompt together with your question, and asks a hosted language model to answer from the \
    document only. Answers are legal information, not legal advice."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/counsel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question, optionally about a document.
    ///
    /// With `--file`, the answer is grounded in the document. A document that
    /// cannot be read is skipped with a note and the question is answered
    /// with general legal information.
    Ask {
        /// The question to answer.
        question: String,

        /// Document to answer from (`.pdf`, `.docx`, `.txt`, `.md`).
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Override `context.max_context_chars`.
        #[arg(long)]
        max_context_chars: Option<usize>,

        /// Override `context.max_prompt_chars`.
        #[arg(long)]
        max_prompt_chars: Option<usize>,

        /// Override `generation.timeout_ms`.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Override `generation.retry_count`.
        #[arg(long)]
        retries: Option<u32>,

        /// Print the full answer record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the text extracted from a document.
    Extract {
        /// Document to extract (`.pdf`, `.docx`, `.txt`, `.md`).
        file: PathBuf,

        /// Print the cleaned, budget-bounded context window instead of raw text.
        #[arg(long)]
        normalized: bool,
    },

    /// Detect risky clauses and score a document.
    Risk {
        /// Document to assess (`.pdf`, `.docx`, `.txt`, `.md`).
        file: PathBuf,

        /// Print the assessment as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rewrite legal terms in a document in plain language.
    Simplify {
        /// Document to simplify (`.pdf`, `.docx`, `.txt`, `.md`).
        file: PathBuf,

        /// Print the text and the replacements made as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Report a document's size, risky clauses and plain-language text.
    ///
    /// Runs locally unless `--summary` is given, which also asks the
    /// generation service for a summary of `[analysis].summary_words` words.
    Analyze {
        /// Document to analyze (`.pdf`, `.docx`, `.txt`, `.md`).
        file: PathBuf,

        /// Also generate a summary.
        #[arg(long)]
        summary: bool,

        /// Override `generation.timeout_ms` for the summary.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Override `generation.retry_count` for the summary.
        #[arg(long)]
        retries: Option<u32>,

        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration and report the generation setup.
    Check,

    /// Start the JSON HTTP server on `[server].bind`.
    Serve,

    /// Print shell completions to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("counsel=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "counsel", &mut std::io::stdout());
        return Ok(());
    }

    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = config::load_or_minimal(&cli.config)?;

    match cli.command {
        Commands::Ask {
            question,
            file,
            max_context_chars,
            max_prompt_chars,
            timeout_ms,
            retries,
            json,
        } => {
            let service = generation::create_service(&cfg.generation)?;
            let overrides = AnswerOverrides {
                max_context_chars,
                max_prompt_chars,
                timeout_ms,
                retry_count: retries,
            };
            let status =
                commands::run_ask(&cfg, service, file.as_deref(), &question, &overrides, json)
                    .await?;
            if !status.is_success() {
                std::process::exit(2);
            }
        }
        Commands::Extract { file, normalized } => {
            commands::run_extract(&cfg, &file, normalized)?;
        }
        Commands::Risk { file, json } => {
            commands::run_risk(&cfg, &file, json)?;
        }
        Commands::Simplify { file, json } => {
            commands::run_simplify(&cfg, &file, json)?;
        }
        Commands::Analyze {
            file,
            summary,
            timeout_ms,
            retries,
            json,
        } => {
            let service = if summary {
                Some(generation::create_service(&cfg.generation)?)
            } else {
                None
            };
            let overrides = AnswerOverrides {
                timeout_ms,
                retry_count: retries,
                ..AnswerOverrides::default()
            };
            let status = commands::run_analyze(&cfg, service, &file, &overrides, json).await?;
            if status.is_some_and(|s| !s.is_success()) {
                std::process::exit(2);
            }
        }
        Commands::Check => {
            commands::run_check(&cfg, &cli.config)?;
        }
        Commands::Serve => {
            let service = generation::create_service(&cfg.generation)?;
            server::run_server(&cfg, service).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}
