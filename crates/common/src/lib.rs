//! ExpertScope Common Library
//!
//! Shared code for the ExpertScope services including:
//! - Database models and repository patterns
//! - Clearance model and caller identity
//! - Embedding client abstraction
//! - Chat-completion client for answer synthesis
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod auth;
pub mod clearance;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use auth::CallerContext;
pub use clearance::Clearance;
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use embeddings::{Embedder, QueryEmbedder};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
