//! Clearance-aware paper search
//!
//! Provides:
//! - Validated, paginated search over the chunk corpus
//! - Graph expansion of the page's top hits into related papers
//! - Live-fetch read-through consultation with a single rerun
//! - Rank fusion, audit logging and the response payload
//!
//! The page slice is taken from the ranked hits before expansion, so
//! connectivity signals only ever see the page's own candidate set.

use crate::audit::{AuditRecord, AuditRecorder};
use crate::graph::GraphExpander;
use crate::livefetch::{LiveFetcher, ReadThroughStatus};
use crate::query::QueryOptimizer;
use crate::ranking::search::{fuse_candidates, SearchCandidate, SearchResultRow};
use crate::request;
use crate::retrieval::{build_snippet, ChunkRetriever, RankedHit};
use async_trait::async_trait;
use expertscope_common::auth::CallerContext;
use expertscope_common::clearance::Clearance;
use expertscope_common::config::{GraphConfig, SearchConfig};
use expertscope_common::db::models::{Chunk, Paper};
use expertscope_common::db::{PaperAuthorRow, PaperDistanceRow, PaperTopicRow, Repository};
use expertscope_common::embeddings::QueryEmbedder;
use expertscope_common::errors::{AppError, Result};
use expertscope_common::metrics;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const SEARCH_ENDPOINT: &str = "/api/search";

/// Paper metadata loads the search pipeline performs after retrieval
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Best chunk distance per paper, for graph-discovered candidates
    async fn best_distances(
        &self,
        embedding: &[f32],
        paper_ids: &[Uuid],
    ) -> Result<Vec<PaperDistanceRow>>;

    async fn find_papers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Paper>>;

    async fn find_chunks_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Chunk>>;

    /// Author rows ordered by (author_order, author id) within a paper
    async fn authors_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperAuthorRow>>;

    /// Topic rows ordered by (name, topic id) within a paper
    async fn topics_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperTopicRow>>;
}

#[async_trait]
impl SearchStore for Repository {
    async fn best_distances(
        &self,
        embedding: &[f32],
        paper_ids: &[Uuid],
    ) -> Result<Vec<PaperDistanceRow>> {
        Repository::best_distances(self, embedding, paper_ids).await
    }

    async fn find_papers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Paper>> {
        Repository::find_papers_by_ids(self, ids).await
    }

    async fn find_chunks_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Chunk>> {
        Repository::find_chunks_by_ids(self, ids).await
    }

    async fn authors_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperAuthorRow>> {
        Repository::authors_for_papers(self, paper_ids).await
    }

    async fn topics_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperTopicRow>> {
        Repository::topics_for_papers(self, paper_ids).await
    }
}

/// Parameters of one search request
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,

    /// Requested clearance; the session role decides when absent
    pub clearance: Option<String>,

    /// 1-based page number
    pub page: u64,
}

/// Search response payload
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub clearance: String,
    pub page: u64,
    pub page_size: usize,
    pub redacted_count: usize,
    pub live_fetch: ReadThroughStatus,
    pub results: Vec<SearchResultRow>,
}

/// Search pipeline over retrieval, expansion, read-through and fusion
pub struct SearchService {
    store: Arc<dyn SearchStore>,
    optimizer: QueryOptimizer,
    embedder: Arc<QueryEmbedder>,
    retriever: ChunkRetriever,
    expander: GraphExpander,
    live_fetcher: LiveFetcher,
    audit: AuditRecorder,
    page_size: usize,
    snippet_max_chars: usize,
    expansion_seed_count: usize,
    expansion_limit: usize,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("page_size", &self.page_size)
            .field("snippet_max_chars", &self.snippet_max_chars)
            .field("expansion_seed_count", &self.expansion_seed_count)
            .field("expansion_limit", &self.expansion_limit)
            .finish_non_exhaustive()
    }
}

impl SearchService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn SearchStore>,
        embedder: Arc<QueryEmbedder>,
        retriever: ChunkRetriever,
        expander: GraphExpander,
        live_fetcher: LiveFetcher,
        audit: AuditRecorder,
        search: &SearchConfig,
        graph: &GraphConfig,
    ) -> Result<Self> {
        if search.page_size == 0 {
            return Err(AppError::Configuration {
                message: "page_size must be greater than 0".to_string(),
            });
        }
        if search.snippet_max_chars == 0 {
            return Err(AppError::Configuration {
                message: "snippet_max_chars must be greater than 0".to_string(),
            });
        }
        if graph.expansion_seed_count == 0 {
            return Err(AppError::Configuration {
                message: "expansion_seed_count must be greater than 0".to_string(),
            });
        }
        if graph.expansion_limit == 0 {
            return Err(AppError::Configuration {
                message: "expansion_limit must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            store,
            optimizer: QueryOptimizer::new(),
            embedder,
            retriever,
            expander,
            live_fetcher,
            audit,
            page_size: search.page_size,
            snippet_max_chars: search.snippet_max_chars,
            expansion_seed_count: graph.expansion_seed_count,
            expansion_limit: graph.expansion_limit,
        })
    }

    /// Run one search request. Validation failures reject before any
    /// side effect; infrastructure failures after validation surface as
    /// the fixed backend-unavailable error.
    pub async fn search(
        &self,
        params: &SearchParams,
        caller: &CallerContext,
    ) -> Result<SearchResponse> {
        let query_text = request::clean_query(&params.query)?;
        if params.page == 0 {
            return Err(AppError::Validation {
                message: "page must be greater than zero.".to_string(),
                field: Some("page".to_string()),
            });
        }
        let clearance = caller.resolve_clearance(params.clearance.as_deref())?;

        let started = Instant::now();
        let response = match self
            .run(
                &query_text,
                clearance,
                params.page,
                params.clearance.as_deref(),
                caller,
            )
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(error = %error, "Search pipeline failed");
                return Err(AppError::backend_unavailable());
            }
        };

        metrics::record_pipeline(
            "search",
            started.elapsed().as_secs_f64(),
            response.results.len(),
            response.redacted_count,
        );
        Ok(response)
    }

    async fn run(
        &self,
        query_text: &str,
        clearance: Clearance,
        page: u64,
        requested_clearance: Option<&str>,
        caller: &CallerContext,
    ) -> Result<SearchResponse> {
        let optimized = self.optimizer.optimize(query_text);
        let query_vector = self.embedder.embed_query(optimized.retrieval_text()).await?;

        let target_unique = (page as usize).saturating_mul(self.page_size);
        let mut ranked = self
            .retriever
            .collect_ranked_hits(&query_vector, clearance, target_unique)
            .await?;

        let live_fetch = self
            .live_fetcher
            .fetch_if_needed(query_text, ranked.hits.len(), page)
            .await;
        metrics::record_live_fetch(
            &live_fetch.reason,
            live_fetch.duration_ms as f64 / 1000.0,
            live_fetch.papers_touched,
        );
        if live_fetch.should_rerun_search() {
            ranked = self
                .retriever
                .collect_ranked_hits(&query_vector, clearance, target_unique)
                .await?;
        }

        let page_hits = page_slice(&ranked.hits, page, self.page_size);
        let page_ids: HashSet<Uuid> = page_hits.iter().map(|hit| hit.paper_id).collect();

        let seeds: Vec<Uuid> = page_hits
            .iter()
            .take(self.expansion_seed_count)
            .map(|hit| hit.paper_id)
            .collect();
        let expansion = self
            .expander
            .expand(&seeds, clearance, self.expansion_limit)
            .await?;

        let mut discovered_ids: Vec<Uuid> = expansion
            .keys()
            .filter(|id| !page_ids.contains(id))
            .copied()
            .collect();
        discovered_ids.sort();

        let discovered_distances: HashMap<Uuid, f64> = self
            .store
            .best_distances(&query_vector, &discovered_ids)
            .await?
            .into_iter()
            .map(|row| (row.paper_id, row.distance))
            .collect();

        let mut candidate_ids: Vec<Uuid> = page_hits.iter().map(|hit| hit.paper_id).collect();
        candidate_ids.extend(discovered_ids.iter().copied());

        let papers: HashMap<Uuid, Paper> = self
            .store
            .find_papers_by_ids(&candidate_ids)
            .await?
            .into_iter()
            .map(|paper| (paper.id, paper))
            .collect();
        let mut authors_by_paper: HashMap<Uuid, Vec<PaperAuthorRow>> = HashMap::new();
        for row in self.store.authors_for_papers(&candidate_ids).await? {
            authors_by_paper.entry(row.paper_id).or_default().push(row);
        }
        let mut topics_by_paper: HashMap<Uuid, Vec<PaperTopicRow>> = HashMap::new();
        for row in self.store.topics_for_papers(&candidate_ids).await? {
            topics_by_paper.entry(row.paper_id).or_default().push(row);
        }

        let best_chunk_ids: Vec<Uuid> = page_hits.iter().map(|hit| hit.best_chunk_id).collect();
        let chunk_content: HashMap<Uuid, String> = self
            .store
            .find_chunks_by_ids(&best_chunk_ids)
            .await?
            .into_iter()
            .map(|chunk| (chunk.id, chunk.content))
            .collect();

        let mut candidates = Vec::with_capacity(page_hits.len() + discovered_ids.len());
        for hit in &page_hits {
            // A racing delete can leave a hit without metadata; the row
            // drops out rather than failing the request
            let Some(paper) = papers.get(&hit.paper_id) else {
                continue;
            };
            let snippet = chunk_content
                .get(&hit.best_chunk_id)
                .map(|content| build_snippet(content, self.snippet_max_chars))
                .unwrap_or_default();
            candidates.push(SearchCandidate {
                paper_id: paper.id,
                title: paper.title.clone(),
                published_date: paper.published_date,
                best_distance: Some(hit.best_distance),
                hint: None,
                authors: authors_by_paper.remove(&hit.paper_id).unwrap_or_default(),
                topics: topics_by_paper.remove(&hit.paper_id).unwrap_or_default(),
                snippet,
            });
        }
        for paper_id in &discovered_ids {
            let (Some(paper), Some(hint)) = (papers.get(paper_id), expansion.get(paper_id)) else {
                continue;
            };
            candidates.push(SearchCandidate {
                paper_id: paper.id,
                title: paper.title.clone(),
                published_date: paper.published_date,
                best_distance: discovered_distances.get(paper_id).copied(),
                hint: Some(hint.clone()),
                authors: authors_by_paper.remove(paper_id).unwrap_or_default(),
                topics: topics_by_paper.remove(paper_id).unwrap_or_default(),
                snippet: String::new(),
            });
        }

        let results = fuse_candidates(candidates);
        let redacted_count = ranked.redacted_count;

        self.audit
            .record(AuditRecord {
                endpoint: SEARCH_ENDPOINT,
                query: query_text.to_string(),
                clearance: clearance.as_str().to_string(),
                user_role: caller.audit_user_role(requested_clearance, clearance),
                redacted_count: redacted_count as i32,
                client_id: Some(caller.audit_client_id()),
            })
            .await;

        Ok(SearchResponse {
            query: query_text.to_string(),
            clearance: clearance.as_str().to_string(),
            page,
            page_size: self.page_size,
            redacted_count,
            live_fetch,
            results,
        })
    }
}

/// Slice the ranked hits down to the requested 1-based page
fn page_slice(hits: &[RankedHit], page: u64, page_size: usize) -> Vec<RankedHit> {
    let start = (page.saturating_sub(1) as usize).saturating_mul(page_size);
    hits.iter().skip(start).take(page_size).cloned().collect()
}
