//! ExpertScope Discovery Library
//!
//! The three clearance-aware discovery pipelines and their shared
//! machinery:
//! - Query optimization and domain vocabulary expansion
//! - Bounded vector retrieval over pgvector
//! - Co-author and topic graph expansion
//! - Search rank fusion
//! - Expert ranking
//! - Grounded answer synthesis with extractive fallback
//! - OpenAlex live-fetch read-through
//! - Best-effort audit logging

pub mod ask;
pub mod audit;
pub mod experts;
pub mod graph;
pub mod livefetch;
pub mod query;
pub mod ranking;
pub mod request;
pub mod retrieval;
pub mod search;
pub mod synthesis;

pub use ask::AskService;
pub use experts::ExpertsService;
pub use search::SearchService;
