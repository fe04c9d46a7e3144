//! Configuration for the RAG backend

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RagConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Corpus (PDF directory) configuration
    #[serde(default)]
    pub corpus: CorpusConfig,
    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Persisted vector index configuration
    #[serde(default)]
    pub index: IndexConfig,
    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Prompt / retrieval knobs
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Auth collaborator configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

impl RagConfig {
    /// Load configuration: TOML file (if given) then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // A missing .env is the normal case outside development.
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.access_secret = secret;
        }
        if let Some(secret) = lookup("REFRESH_TOKEN_SECRET") {
            self.auth.refresh_secret = secret;
        }
        if let Some(dir) = lookup("PDF_RAG_CORPUS_DIR") {
            self.corpus.directory = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("PDF_RAG_INDEX_DIR") {
            self.index.directory = PathBuf::from(dir);
        }
        if let Some(url) = lookup("PDF_RAG_LLM_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("PDF_RAG_LLM_MODEL") {
            self.llm.generate_model = model;
        }
        if let Some(key) = lookup("PDF_RAG_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<()> {
        check_secret("JWT_SECRET", &self.auth.access_secret)?;
        check_secret("REFRESH_TOKEN_SECRET", &self.auth.refresh_secret)?;
        if self.auth.access_secret == self.auth.refresh_secret {
            return Err(Error::Config(
                "access and refresh tokens must use different secrets".to_string(),
            ));
        }
        if self.auth.access_ttl_minutes == 0 || self.auth.refresh_ttl_days == 0 {
            return Err(Error::Config("token TTLs must be positive".to_string()));
        }
        if self.generation.top_k == 0 {
            return Err(Error::Config("generation.top_k must be at least 1".to_string()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(Error::Config("llm.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Shortest accepted token secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Values copied from sample `.env` files rather than generated
const PLACEHOLDER_SECRETS: &[&str] = &[
    "secret",
    "changeme",
    "change-me",
    "change_me",
    "jwt_secret",
    "refresh_token_secret",
    "your_jwt_secret",
    "your-jwt-secret",
    "your_secret_key",
    "your-secret-key",
    "your_refresh_token_secret",
    "your-refresh-token-secret",
];

fn check_secret(name: &str, secret: &str) -> Result<()> {
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(Error::Config(format!("{} must not be empty", name)));
    }
    let lowered = secret.to_ascii_lowercase();
    if PLACEHOLDER_SECRETS.contains(&lowered.as_str())
        || lowered.starts_with("change")
        || lowered.starts_with("your")
    {
        return Err(Error::Config(format!(
            "{} is still a placeholder value; generate a random secret",
            name
        )));
    }
    if secret.len() < MIN_SECRET_LEN {
        return Err(Error::Config(format!(
            "{} must be at least {} bytes",
            name, MIN_SECRET_LEN
        )));
    }
    Ok(())
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum JSON body size in bytes
    pub max_body_size: usize,
    /// Build (or load) the index at startup instead of on the first query
    pub eager_index: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            enable_cors: true,
            max_body_size: 64 * 1024,
            eager_index: true,
        }
    }
}

/// Corpus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Directory scanned (non-recursively) for PDF files
    pub directory: PathBuf,
    /// Per-file extraction timeout in seconds
    pub extract_timeout_secs: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("uploads"),
            extract_timeout_secs: 60,
        }
    }
}

/// Which embedding backend to use
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local ONNX sentence-transformer
    #[default]
    Onnx,
    /// Ollama `/api/embeddings`
    Ollama,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend
    #[serde(default)]
    pub backend: EmbeddingBackend,
    /// Sentence-transformers model name (default: all-mpnet-base-v2)
    pub model: String,
    /// Batch size for embedding generation
    pub batch_size: usize,
    /// Maximum sequence length
    pub max_length: usize,
    /// Cache directory for models
    pub cache_dir: PathBuf,
    /// Ollama base URL (ollama backend only)
    pub ollama_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Onnx,
            model: "all-mpnet-base-v2".to_string(),
            batch_size: 32,
            max_length: 384,
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pdf-rag")
                .join("models"),
            ollama_url: "http://localhost:11434".to_string(),
        }
    }
}

/// Persisted index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding the persisted index
    pub directory: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("vector_index"),
        }
    }
}

/// Which streaming completion API to talk to
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// OpenAI-compatible `/chat/completions` (LM Studio, vLLM, llama.cpp server)
    #[default]
    OpenAi,
    /// Ollama `/api/generate`
    Ollama,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend
    #[serde(default)]
    pub backend: LlmBackend,
    /// Base URL of the completion API
    pub base_url: String,
    /// Bearer key sent to OpenAI-compatible endpoints
    #[serde(default)]
    pub api_key: Option<String>,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Timeout in seconds for connecting and for each awaited token
    pub timeout_secs: u64,
    /// Number of retries for failed connection attempts
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::OpenAi,
            base_url: "http://localhost:1234/v1".to_string(),
            api_key: None,
            generate_model: "local-model".to_string(),
            temperature: 0.3,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// What the corpus is about, interpolated into the prompt
    pub corpus_description: String,
    /// Pages retrieved per query; their text is joined, nearest first, into
    /// the prompt context
    pub top_k: usize,
    /// Channel capacity between the model task and the HTTP stream
    pub channel_capacity: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            corpus_description: "yoga exercises".to_string(),
            top_k: 1,
            channel_capacity: 32,
        }
    }
}

/// Auth collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for access tokens
    pub access_secret: String,
    /// HMAC secret for refresh tokens
    pub refresh_secret: String,
    /// Access token validity (minutes)
    pub access_ttl_minutes: u64,
    /// Refresh token validity (days)
    pub refresh_ttl_days: u64,
    /// SQLite user database
    pub database_path: PathBuf,
    /// Mark the refresh cookie `Secure`
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: String::new(),
            refresh_secret: String::new(),
            access_ttl_minutes: 60,
            refresh_ttl_days: 7,
            database_path: PathBuf::from("users.db"),
            secure_cookies: false,
        }
    }
}
