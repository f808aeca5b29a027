//! Configuration management for ExpertScope services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Answer LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Search pipeline configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Graph expansion configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Expert ranking configuration
    #[serde(default)]
    pub experts: ExpertsConfig,

    /// Ask pipeline configuration
    #[serde(default)]
    pub ask: AskConfig,

    /// Live-fetch read-through configuration
    #[serde(default)]
    pub live_fetch: LiveFetchConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: auto, openai, local
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the hosted embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension; query vectors are resized to this
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Allow falling back to the deterministic hash backend when the
    /// hosted backend fails at query time
    #[serde(default = "default_allow_hash_fallback")]
    pub allow_hash_fallback: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// API key; answers fall back to extractive mode when absent
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Chat model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on retryable upstream failures
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,

    /// Base backoff in seconds between retries
    #[serde(default = "default_llm_backoff")]
    pub backoff_secs: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Results per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Chunk rows fetched per scan batch
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// Hard budget on chunk rows examined per scan
    #[serde(default = "default_search_max_chunk_scan")]
    pub max_chunk_scan: usize,

    /// Snippet length cap in characters
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Ranked hits used as expansion seeds
    #[serde(default = "default_expansion_seed_count")]
    pub expansion_seed_count: usize,

    /// Hard cap on papers discovered by expansion
    #[serde(default = "default_expansion_limit")]
    pub expansion_limit: usize,

    /// Enable the second expansion hop
    #[serde(default = "default_enable_two_hop")]
    pub enable_two_hop: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpertsConfig {
    /// Experts returned per query
    #[serde(default = "default_top_experts")]
    pub top_experts: usize,

    /// Papers kept per expert for scoring and payload
    #[serde(default = "default_top_papers")]
    pub top_papers: usize,

    /// Topics shown per expert
    #[serde(default = "default_top_topics")]
    pub top_topics: usize,

    /// Hard budget on chunk rows examined per scan
    #[serde(default = "default_experts_max_chunk_scan")]
    pub max_chunk_scan: usize,

    /// Unique topics at which topic coverage saturates
    #[serde(default = "default_topic_diversity_target")]
    pub topic_diversity_target: usize,

    /// Enable the citation-authority term (centrality lookups)
    #[serde(default = "default_enable_centrality")]
    pub enable_centrality: bool,

    /// Minimum blended score to keep an expert row
    #[serde(default = "default_experts_min_score")]
    pub min_score: f64,

    /// Rows kept when the min-score filter would empty the list
    #[serde(default = "default_experts_min_keep")]
    pub min_keep: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AskConfig {
    /// Chunks retrieved as answer context
    #[serde(default = "default_ask_top_k")]
    pub top_k: usize,

    /// Hard budget on chunk rows examined per scan
    #[serde(default = "default_ask_max_chunk_scan")]
    pub max_chunk_scan: usize,

    /// Sentences kept by the extractive fallback
    #[serde(default = "default_fallback_sentence_count")]
    pub fallback_sentence_count: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LiveFetchConfig {
    /// Enable the read-through backfill
    #[serde(default = "default_live_fetch_enabled")]
    pub enabled: bool,

    /// Unique local hits below which a fetch is considered
    #[serde(default = "default_live_fetch_min_results")]
    pub min_results: usize,

    /// Maximum works imported per fetch
    #[serde(default = "default_live_fetch_limit")]
    pub fetch_limit: usize,

    /// Seconds before the same query may trigger another fetch
    #[serde(default = "default_live_fetch_cooldown")]
    pub cooldown_secs: u64,

    /// Works API base URL
    #[serde(default = "default_live_fetch_base_url")]
    pub base_url: String,

    /// Contact email sent to the works API (enables the fetch)
    pub mailto: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_live_fetch_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 50 }
fn default_min_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "auto".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 8 }
fn default_embedding_timeout() -> u64 { 15 }
fn default_embedding_retries() -> u32 { 3 }
fn default_allow_hash_fallback() -> bool { true }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_temperature() -> f32 { 0.1 }
fn default_llm_timeout() -> u64 { 30 }
fn default_llm_retries() -> u32 { 3 }
fn default_llm_backoff() -> f64 { 1.0 }
fn default_page_size() -> usize { 10 }
fn default_scan_batch_size() -> usize { 200 }
fn default_search_max_chunk_scan() -> usize { 2000 }
fn default_snippet_max_chars() -> usize { 220 }
fn default_expansion_seed_count() -> usize { 5 }
fn default_expansion_limit() -> usize { 20 }
fn default_enable_two_hop() -> bool { true }
fn default_top_experts() -> usize { 10 }
fn default_top_papers() -> usize { 3 }
fn default_top_topics() -> usize { 3 }
fn default_experts_max_chunk_scan() -> usize { 3000 }
fn default_topic_diversity_target() -> usize { 5 }
fn default_enable_centrality() -> bool { true }
fn default_experts_min_score() -> f64 { 0.05 }
fn default_experts_min_keep() -> usize { 3 }
fn default_ask_top_k() -> usize { 8 }
fn default_ask_max_chunk_scan() -> usize { 2000 }
fn default_fallback_sentence_count() -> usize { 3 }
fn default_live_fetch_enabled() -> bool { true }
fn default_live_fetch_min_results() -> usize { 10 }
fn default_live_fetch_limit() -> usize { 40 }
fn default_live_fetch_cooldown() -> u64 { 900 }
fn default_live_fetch_base_url() -> String { "https://api.openalex.org".to_string() }
fn default_live_fetch_timeout() -> u64 { 15 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "expertscope".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_rate_limit_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }

    /// Get the live-fetch cooldown as Duration
    pub fn live_fetch_cooldown(&self) -> Duration {
        Duration::from_secs(self.live_fetch.cooldown_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            allow_hash_fallback: default_allow_hash_fallback(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            model: default_llm_model(),
            temperature: default_llm_temperature(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
            backoff_secs: default_llm_backoff(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            scan_batch_size: default_scan_batch_size(),
            max_chunk_scan: default_search_max_chunk_scan(),
            snippet_max_chars: default_snippet_max_chars(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            expansion_seed_count: default_expansion_seed_count(),
            expansion_limit: default_expansion_limit(),
            enable_two_hop: default_enable_two_hop(),
        }
    }
}

impl Default for ExpertsConfig {
    fn default() -> Self {
        Self {
            top_experts: default_top_experts(),
            top_papers: default_top_papers(),
            top_topics: default_top_topics(),
            max_chunk_scan: default_experts_max_chunk_scan(),
            topic_diversity_target: default_topic_diversity_target(),
            enable_centrality: default_enable_centrality(),
            min_score: default_experts_min_score(),
            min_keep: default_experts_min_keep(),
        }
    }
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            top_k: default_ask_top_k(),
            max_chunk_scan: default_ask_max_chunk_scan(),
            fallback_sentence_count: default_fallback_sentence_count(),
        }
    }
}

impl Default for LiveFetchConfig {
    fn default() -> Self {
        Self {
            enabled: default_live_fetch_enabled(),
            min_results: default_live_fetch_min_results(),
            fetch_limit: default_live_fetch_limit(),
            cooldown_secs: default_live_fetch_cooldown(),
            base_url: default_live_fetch_base_url(),
            mailto: None,
            timeout_secs: default_live_fetch_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_rate_limit_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/expertscope".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            graph: GraphConfig::default(),
            experts: ExpertsConfig::default(),
            ask: AskConfig::default(),
            live_fetch: LiveFetchConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
