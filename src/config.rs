//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to defaults.
//! Provider availability (embedding, generative model, remote answering
//! service) is decided here, once, and handed to the components that need
//! it; nothing reads provider settings ad hoc at request time.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tenant_rag_core::chunk::DEFAULT_MAX_CHARS;
use tenant_rag_core::embedding::DEFAULT_FALLBACK_DIMS;
use tenant_rag_core::rank::RankingParams;

use crate::pii::PiiEntity;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub pii: PiiConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// A configuration with every provider disabled, backed by `db_path`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            remote: RemoteConfig::default(),
            identity: IdentityConfig::default(),
            ingest: IngestConfig::default(),
            audit: AuditConfig::default(),
            pii: PiiConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

/// Ranking knobs. Defaults mirror [`RankingParams::default`].
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub candidate_window: usize,
    pub top_k: usize,
    pub min_score: f32,
    pub spread: f32,
    pub other_doc_margin: f32,
    pub mmr_lambda: f32,
    pub lexical_boost_per_token: f32,
    pub lexical_boost_cap: f32,
    pub dominant_top_n: usize,
    pub type_hint_min_pool: usize,
    pub identity_max_docs: usize,
    pub identity_min_pool: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let p = RankingParams::default();
        Self {
            candidate_window: p.candidate_window,
            top_k: p.top_k,
            min_score: p.min_score,
            spread: p.spread,
            other_doc_margin: p.other_doc_margin,
            mmr_lambda: p.mmr_lambda,
            lexical_boost_per_token: p.lexical_boost_per_token,
            lexical_boost_cap: p.lexical_boost_cap,
            dominant_top_n: p.dominant_top_n,
            type_hint_min_pool: p.type_hint_min_pool,
            identity_max_docs: p.identity_max_docs,
            identity_min_pool: p.identity_min_pool,
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RankingParams {
        RankingParams {
            candidate_window: self.candidate_window,
            top_k: self.top_k,
            min_score: self.min_score,
            spread: self.spread,
            other_doc_margin: self.other_doc_margin,
            mmr_lambda: self.mmr_lambda,
            lexical_boost_per_token: self.lexical_boost_per_token,
            lexical_boost_cap: self.lexical_boost_cap,
            dominant_top_n: self.dominant_top_n,
            type_hint_min_pool: self.type_hint_min_pool,
            identity_max_docs: self.identity_max_docs,
            identity_min_pool: self.identity_min_pool,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, or `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (Ollama default `http://localhost:11434`, OpenAI default `https://api.openai.com`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_fallback_dims")]
    pub fallback_dims: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            fallback_dims: DEFAULT_FALLBACK_DIMS,
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `disabled`, `openai`, or `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            temperature: 0.0,
            max_retries: default_llm_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Remote tool-augmented answering service. Absent `url` means local only.
#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_remote_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    /// Name of the environment variable holding the HS256 secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
            issuer: default_issuer(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Roles allowed to upload or purge documents over HTTP.
    #[serde(default = "default_uploader_roles")]
    pub uploader_roles: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            uploader_roles: default_uploader_roles(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    /// Roles allowed to read the audit log over HTTP.
    #[serde(default = "default_reader_roles")]
    pub reader_roles: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            reader_roles: default_reader_roles(),
        }
    }
}

/// Redaction of personal data before it reaches the audit log.
#[derive(Debug, Deserialize, Clone)]
pub struct PiiConfig {
    #[serde(default = "default_true")]
    pub redaction_enabled: bool,
    /// Any of `email`, `phone`, `ssn`, `credit_card`.
    #[serde(default = "default_pii_entities")]
    pub entities: Vec<String>,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            redaction_enabled: true,
            entities: default_pii_entities(),
        }
    }
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

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_fallback_dims() -> usize {
    DEFAULT_FALLBACK_DIMS
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout_secs() -> u64 {
    10
}
fn default_llm_max_retries() -> u32 {
    1
}
fn default_llm_timeout_secs() -> u64 {
    30
}
fn default_remote_timeout_ms() -> u64 {
    5000
}
fn default_secret_env() -> String {
    "TRAG_IDENTITY_SECRET".to_string()
}
fn default_issuer() -> String {
    "tenant-rag".to_string()
}
fn default_ttl_secs() -> u64 {
    60
}
fn default_uploader_roles() -> Vec<String> {
    vec!["hr".to_string(), "ceo".to_string(), "admin".to_string()]
}
fn default_reader_roles() -> Vec<String> {
    vec!["admin".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_pii_entities() -> Vec<String> {
    PiiEntity::ALL.iter().map(|e| e.as_str().to_string()).collect()
}
fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }

    let r = &config.retrieval;
    if r.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if r.candidate_window == 0 {
        bail!("retrieval.candidate_window must be >= 1");
    }
    if !(0.0..=1.0).contains(&r.mmr_lambda) {
        bail!("retrieval.mmr_lambda must be in [0.0, 1.0]");
    }
    for (name, value) in [
        ("min_score", r.min_score),
        ("spread", r.spread),
        ("other_doc_margin", r.other_doc_margin),
        ("lexical_boost_per_token", r.lexical_boost_per_token),
        ("lexical_boost_cap", r.lexical_boost_cap),
    ] {
        if !(0.0..=1.0).contains(&value) {
            bail!("retrieval.{} must be in [0.0, 1.0]", name);
        }
    }

    if config.embedding.fallback_dims == 0 {
        bail!("embedding.fallback_dims must be > 0");
    }
    check_provider("embedding", &config.embedding.provider, &config.embedding.model)?;
    check_provider("llm", &config.llm.provider, &config.llm.model)?;

    if let Some(url) = &config.remote.url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("remote.url must be an http(s) URL, got '{}'", url);
        }
    }
    if config.remote.timeout_ms == 0 {
        bail!("remote.timeout_ms must be > 0");
    }

    if config.identity.ttl_secs == 0 {
        bail!("identity.ttl_secs must be > 0");
    }
    if config.ingest.uploader_roles.is_empty() {
        bail!("ingest.uploader_roles must not be empty");
    }
    for entity in &config.pii.entities {
        PiiEntity::parse(entity).context("pii.entities")?;
    }

    Ok(())
}

fn check_provider(section: &str, provider: &str, model: &Option<String>) -> Result<()> {
    match provider {
        "disabled" => Ok(()),
        "openai" | "ollama" => {
            if model.as_deref().map_or(true, |m| m.trim().is_empty()) {
                bail!(
                    "{}.model must be specified when provider is '{}'",
                    section,
                    provider
                );
            }
            Ok(())
        }
        other => bail!(
            "Unknown {} provider: '{}'. Must be disabled, openai, or ollama.",
            section,
            other
        ),
    }
}
