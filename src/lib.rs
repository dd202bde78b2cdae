//! # Counsel
//!
//! Document-grounded question answering for legal documents.
//!
//! Counsel turns an uploaded contract (PDF or Word) plus a user question into
//! a bounded, well-formed request to a hosted text-generation service, and
//! turns the reply into a classified, caveat-carrying answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌──────────┐
//! │ extract  │──▶│ normalize  │──▶│  prompt  │──▶│ mediator │──▶ Answer
//! │ PDF/DOCX │   │ clean+fit  │   │ budgeted │   │ timeout  │
//! └──────────┘   └────────────┘   └──────────┘   └────┬─────┘
//!                                                     ▼
//!                                          GenerationService (HTTP)
//! ```
//!
//! Each query is an independent, sequential run with no shared mutable
//! state. The only suspension point is the generation call, which is bounded
//! by a timeout and cancellable.
//!
//! ## Quick Start
//!
//! ```bash
//! export GROQ_API_KEY=...
//! counsel ask "When does this agreement end?" --file lease.pdf
//! counsel risk lease.docx
//! counsel analyze lease.pdf --summary
//! counsel serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF / DOCX text extraction |
//! | [`normalize`] | Text cleaning, segmentation, budgeted context windows |
//! | [`prompt`] | Prompt construction within a character budget |
//! | [`generation`] | Generation service port and HTTP client |
//! | [`mediator`] | Timeout, retry, cancellation, reply post-processing |
//! | [`pipeline`] | Caller-facing `answer` and `summarize` |
//! | [`risk`] | Risky-clause detection and scoring |
//! | [`simplify`] | Plain-language rewriting of legal terms |
//! | [`analysis`] | Document metadata plus risk and plain-language text |
//! | [`server`] | JSON HTTP server |
//! | [`commands`] | CLI command implementations |

pub mod analysis;
pub mod commands;
pub mod config;
pub mod extract;
pub mod generation;
pub mod mediator;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod risk;
pub mod server;
pub mod simplify;
