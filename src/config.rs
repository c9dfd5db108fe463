//! TOML configuration parsing and validation.
//!
//! All settings live in a single file (default `./config/ragwatch.toml`).
//! Every section except `[db]` has defaults, so a minimal config is:
//!
//! ```toml
//! [db]
//! path = "./data/ragwatch.sqlite"
//! ```
//!
//! Secrets are never read from the file: OpenAI-backed providers read
//! `OPENAI_API_KEY` from the environment when they are constructed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    "vectordb".to_string()
}

/// Watched directory and queue settings.
#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_watch_root")]
    pub root: PathBuf,
    /// File-name globs; a created file is picked up if any one matches.
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    /// Delay between detection and enqueue, to let the writer finish.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Enqueue matching files already present (and unknown to the ledger) at startup.
    #[serde(default)]
    pub scan_existing: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: default_watch_root(),
            patterns: default_patterns(),
            settle_ms: default_settle_ms(),
            queue_capacity: default_queue_capacity(),
            scan_existing: false,
        }
    }
}

fn default_watch_root() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_patterns() -> Vec<String> {
    vec!["*.pdf".to_string(), "*.txt".to_string()]
}
fn default_settle_ms() -> u64 {
    2000
}
fn default_queue_capacity() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatusConfig {
    #[serde(default = "default_status_path")]
    pub path: PathBuf,
    /// `processing` records older than this are marked `failed` at startup.
    /// Zero disables reconciliation.
    #[serde(default)]
    pub stale_after_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            path: default_status_path(),
            stale_after_secs: 0,
        }
    }
}

fn default_status_path() -> PathBuf {
    PathBuf::from("./file_status.json")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PartitionConfig {
    #[serde(default)]
    pub strategy: PartitionStrategy,
}

/// How much work the partitioner does per document.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Per-page extraction with element classification (titles, list items, text).
    #[default]
    HiRes,
    /// Whole-document extraction, paragraphs only, no page numbers.
    Fast,
}

/// Thresholds handed to the chunk aggregator. Character counts, not tokens.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_characters")]
    pub max_characters: usize,
    #[serde(default = "default_new_after_n_chars")]
    pub new_after_n_chars: usize,
    #[serde(default = "default_combine_under")]
    pub combine_text_under_n_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_characters: default_max_characters(),
            new_after_n_chars: default_new_after_n_chars(),
            combine_text_under_n_chars: default_combine_under(),
        }
    }
}

fn default_max_characters() -> usize {
    3000
}
fn default_new_after_n_chars() -> usize {
    2400
}
fn default_combine_under() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override: an OpenAI-compatible API or an Ollama instance
    /// (default `http://localhost:11434`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: default_llm_model(),
            url: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_model() -> Option<String> {
    Some("gpt-5-nano".to_string())
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Hits scoring below this similarity are treated as "no context".
    #[serde(default)]
    pub min_score: Option<f64>,
    /// Keep a transcript per session and send it with every prompt.
    #[serde(default)]
    pub conversation: bool,
    #[serde(default)]
    pub max_turns: Option<usize>,
    /// Upper bound on live sessions; the least recently used is evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Sessions unused for this long are dropped. Zero keeps them until evicted.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
            conversation: false,
            max_turns: None,
            max_sessions: default_max_sessions(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_top_k() -> usize {
    1
}
fn default_max_sessions() -> usize {
    1000
}
fn default_session_idle_secs() -> u64 {
    3600
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
    "127.0.0.1:5050".to_string()
}

/// Log filter settings; `RUST_LOG` wins over both fields when set.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Checks cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    let chunking = &config.chunking;
    if chunking.max_characters == 0 {
        anyhow::bail!("chunking.max_characters must be > 0");
    }
    if chunking.new_after_n_chars == 0 || chunking.new_after_n_chars > chunking.max_characters {
        anyhow::bail!("chunking.new_after_n_chars must be in 1..=max_characters");
    }
    if chunking.combine_text_under_n_chars > chunking.max_characters {
        anyhow::bail!("chunking.combine_text_under_n_chars must be <= max_characters");
    }

    if config.watch.patterns.is_empty() {
        anyhow::bail!("watch.patterns must not be empty");
    }
    if config.watch.queue_capacity == 0 {
        anyhow::bail!("watch.queue_capacity must be > 0");
    }

    if config.store.collection.trim().is_empty() {
        anyhow::bail!("store.collection must not be empty");
    }

    if config.query.top_k == 0 {
        anyhow::bail!("query.top_k must be >= 1");
    }
    if config.query.max_sessions == 0 {
        anyhow::bail!("query.max_sessions must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Config {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse("[db]\npath = \"/tmp/x.sqlite\"\n");
        assert_eq!(cfg.store.collection, "vectordb");
        assert_eq!(cfg.watch.patterns, vec!["*.pdf", "*.txt"]);
        assert_eq!(cfg.watch.settle_ms, 2000);
        assert_eq!(cfg.chunking.max_characters, 3000);
        assert_eq!(cfg.chunking.new_after_n_chars, 2400);
        assert_eq!(cfg.chunking.combine_text_under_n_chars, 500);
        assert_eq!(cfg.partition.strategy, PartitionStrategy::HiRes);
        assert_eq!(cfg.query.top_k, 1);
        assert!(!cfg.query.conversation);
        assert_eq!(cfg.query.max_sessions, 1000);
        assert_eq!(cfg.query.session_idle_secs, 3600);
        assert_eq!(cfg.server.bind, "127.0.0.1:5050");
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_rejects_soft_threshold_above_max() {
        let cfg = parse(
            "[db]\npath = \"x\"\n[chunking]\nmax_characters = 100\nnew_after_n_chars = 200\n",
        );
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_rejects_enabled_embedding_without_dims() {
        let cfg = parse(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n",
        );
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_rejects_unknown_llm_provider() {
        let cfg = parse("[db]\npath = \"x\"\n[llm]\nprovider = \"magic\"\n");
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_rejects_zero_max_sessions() {
        let cfg = parse("[db]\npath = \"x\"\n[query]\nconversation = true\nmax_sessions = 0\n");
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("query.max_sessions"));
    }

    #[test]
    fn test_fast_strategy_parses() {
        let cfg = parse("[db]\npath = \"x\"\n[partition]\nstrategy = \"fast\"\n");
        assert_eq!(cfg.partition.strategy, PartitionStrategy::Fast);
    }
}
