use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::models::{AnswerLimits, AnswerOptions};

/// Largest accepted `context.max_file_size_mb`.
const MAX_FILE_SIZE_MB: u64 = 1024;
/// Largest accepted `generation.max_retry_count`.
const RETRY_CEILING: u32 = 10;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
            max_prompt_chars: default_max_prompt_chars(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

fn default_max_context_chars() -> usize {
    12_000
}
fn default_max_prompt_chars() -> usize {
    16_000
}
fn default_max_file_size_mb() -> u64 {
    10
}

impl ContextConfig {
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Most retries a single request may ask for.
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    /// Longest per-attempt timeout a single request may ask for.
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_ms: default_timeout_ms(),
            retry_count: 0,
            backoff_ms: default_backoff_ms(),
            max_retry_count: default_max_retry_count(),
            max_timeout_ms: default_max_timeout_ms(),
        }
    }
}

fn default_provider() -> String {
    "openai-compatible".to_string()
}
fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.2
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_backoff_ms() -> u64 {
    1_000
}
fn default_max_retry_count() -> u32 {
    AnswerLimits::default().max_retry_count
}
fn default_max_timeout_ms() -> u64 {
    AnswerLimits::default().max_timeout_ms
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reads the API key from the environment variable named by `api_key_env`.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RiskConfig {
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            low_threshold: default_low_threshold(),
            medium_threshold: default_medium_threshold(),
        }
    }
}

fn default_low_threshold() -> f64 {
    0.3
}
fn default_medium_threshold() -> f64 {
    0.6
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Target length of a generated summary, in words.
    #[serde(default = "default_summary_words")]
    pub summary_words: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            summary_words: default_summary_words(),
        }
    }
}

fn default_summary_words() -> usize {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// Configuration used when no config file is present: every section at its default.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Per-query options derived from the configured defaults.
    pub fn answer_options(&self) -> AnswerOptions {
        AnswerOptions {
            max_context_chars: self.context.max_context_chars,
            max_prompt_chars: self.context.max_prompt_chars,
            timeout_ms: self.generation.timeout_ms,
            retry_count: self.generation.retry_count,
            backoff_ms: self.generation.backoff_ms,
        }
    }

    pub fn answer_limits(&self) -> AnswerLimits {
        AnswerLimits {
            max_retry_count: self.generation.max_retry_count,
            max_timeout_ms: self.generation.max_timeout_ms,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Loads `path` if it exists, otherwise falls back to [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate context budgets
    if config.context.max_context_chars == 0 {
        anyhow::bail!("context.max_context_chars must be > 0");
    }
    if config.context.max_prompt_chars == 0 {
        anyhow::bail!("context.max_prompt_chars must be > 0");
    }
    let max_file_size_mb = config.context.max_file_size_mb;
    if max_file_size_mb == 0 || max_file_size_mb > MAX_FILE_SIZE_MB {
        anyhow::bail!("context.max_file_size_mb must be in 1..={}", MAX_FILE_SIZE_MB);
    }

    // Validate generation
    let generation = &config.generation;
    if generation.timeout_ms == 0 {
        anyhow::bail!("generation.timeout_ms must be > 0");
    }
    if generation.max_retry_count > RETRY_CEILING {
        anyhow::bail!("generation.max_retry_count must be <= {}", RETRY_CEILING);
    }
    if generation.retry_count > generation.max_retry_count {
        anyhow::bail!(
            "generation.retry_count ({}) exceeds generation.max_retry_count ({})",
            generation.retry_count,
            generation.max_retry_count
        );
    }
    if generation.timeout_ms > generation.max_timeout_ms {
        anyhow::bail!(
            "generation.timeout_ms ({}) exceeds generation.max_timeout_ms ({})",
            generation.timeout_ms,
            generation.max_timeout_ms
        );
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if config.generation.max_tokens == 0 {
        anyhow::bail!("generation.max_tokens must be > 0");
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai-compatible" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai-compatible.",
            other
        ),
    }

    if config.generation.is_enabled() && config.generation.model.trim().is_empty() {
        anyhow::bail!(
            "generation.model must be specified when provider is '{}'",
            config.generation.provider
        );
    }

    // Validate risk thresholds
    let risk = &config.risk;
    if !(0.0..=1.0).contains(&risk.low_threshold) || !(0.0..=1.0).contains(&risk.medium_threshold)
    {
        anyhow::bail!("risk thresholds must be in [0.0, 1.0]");
    }
    if risk.low_threshold > risk.medium_threshold {
        anyhow::bail!("risk.low_threshold must be <= risk.medium_threshold");
    }

    if !(1..=2000).contains(&config.analysis.summary_words) {
        anyhow::bail!("analysis.summary_words must be in 1..=2000");
    }

    Ok(())
}
