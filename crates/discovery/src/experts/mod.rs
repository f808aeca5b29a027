//! Clearance-aware expert discovery
//!
//! Provides:
//! - Validated expert search over the level-filtered chunk scan
//! - Evidence collection into immutable lookup maps
//! - Author ranking with audit logging and the response payload
//! - Un-audited recommendations for embedding in other pipelines
//!
//! Hidden papers never reach this pipeline: the scan is restricted to
//! the caller's allowed levels in SQL, so there is nothing to redact
//! and nothing to count.

use crate::audit::{AuditRecord, AuditRecorder};
use crate::query::QueryOptimizer;
use crate::ranking::{rank_experts, ExpertEvidence, ExpertRow, PaperMatch, PaperSummary};
use crate::request;
use crate::retrieval::ChunkRetriever;
use async_trait::async_trait;
use chrono::Utc;
use expertscope_common::auth::CallerContext;
use expertscope_common::clearance::Clearance;
use expertscope_common::config::ExpertsConfig;
use expertscope_common::db::models::Paper;
use expertscope_common::db::{PaperAuthorRow, PaperTopicRow, Repository};
use expertscope_common::embeddings::QueryEmbedder;
use expertscope_common::errors::{AppError, Result};
use expertscope_common::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const EXPERTS_ENDPOINT: &str = "/api/experts";

/// Paper metadata loads the expert pipeline performs after the scan
#[async_trait]
pub trait ExpertStore: Send + Sync {
    async fn find_papers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Paper>>;

    /// Author rows ordered by (author_order, author id) within a paper
    async fn authors_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperAuthorRow>>;

    /// Topic rows ordered by (name, topic id) within a paper
    async fn topics_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperTopicRow>>;
}

#[async_trait]
impl ExpertStore for Repository {
    async fn find_papers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Paper>> {
        Repository::find_papers_by_ids(self, ids).await
    }

    async fn authors_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperAuthorRow>> {
        Repository::authors_for_papers(self, paper_ids).await
    }

    async fn topics_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperTopicRow>> {
        Repository::topics_for_papers(self, paper_ids).await
    }
}

/// Parameters of one expert search request
#[derive(Debug, Clone)]
pub struct ExpertsParams {
    pub query: String,

    /// Requested clearance; the session role decides when absent
    pub clearance: Option<String>,
}

/// Expert search response payload
#[derive(Debug, Clone, Serialize)]
pub struct ExpertsResponse {
    pub query: String,
    pub clearance: String,
    pub experts: Vec<ExpertRow>,
}

/// Expert discovery pipeline over the visible-chunk scan
pub struct ExpertsService {
    store: Arc<dyn ExpertStore>,
    optimizer: QueryOptimizer,
    embedder: Arc<QueryEmbedder>,
    retriever: ChunkRetriever,
    audit: AuditRecorder,
    config: ExpertsConfig,
}

impl std::fmt::Debug for ExpertsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpertsService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExpertsService {
    pub fn new(
        store: Arc<dyn ExpertStore>,
        embedder: Arc<QueryEmbedder>,
        retriever: ChunkRetriever,
        audit: AuditRecorder,
        config: &ExpertsConfig,
    ) -> Result<Self> {
        if config.top_experts == 0 {
            return Err(AppError::Configuration {
                message: "top_experts must be greater than 0".to_string(),
            });
        }
        if config.top_papers == 0 {
            return Err(AppError::Configuration {
                message: "top_papers must be greater than 0".to_string(),
            });
        }
        if config.top_topics == 0 {
            return Err(AppError::Configuration {
                message: "top_topics must be greater than 0".to_string(),
            });
        }
        if config.topic_diversity_target == 0 {
            return Err(AppError::Configuration {
                message: "topic_diversity_target must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            store,
            optimizer: QueryOptimizer::new(),
            embedder,
            retriever,
            audit,
            config: config.clone(),
        })
    }

    /// Run one expert search request. Validation failures reject before
    /// any side effect; infrastructure failures after validation surface
    /// as the fixed backend-unavailable error.
    pub async fn experts(
        &self,
        params: &ExpertsParams,
        caller: &CallerContext,
    ) -> Result<ExpertsResponse> {
        let query_text = request::clean_query(&params.query)?;
        let clearance = caller.resolve_clearance(params.clearance.as_deref())?;

        let started = Instant::now();
        let response = match self
            .run(&query_text, clearance, params.clearance.as_deref(), caller)
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(error = %error, "Experts pipeline failed");
                return Err(AppError::backend_unavailable());
            }
        };

        metrics::record_pipeline(
            "experts",
            started.elapsed().as_secs_f64(),
            response.experts.len(),
            0,
        );
        Ok(response)
    }

    /// Ranked experts for a query another pipeline already validated.
    /// Writes no audit row; the enclosing request owns the accounting.
    pub async fn recommend(
        &self,
        query_text: &str,
        clearance: Clearance,
        limit: usize,
    ) -> Result<Vec<ExpertRow>> {
        self.collect_and_rank(query_text, clearance, limit).await
    }

    async fn run(
        &self,
        query_text: &str,
        clearance: Clearance,
        requested_clearance: Option<&str>,
        caller: &CallerContext,
    ) -> Result<ExpertsResponse> {
        let experts = self
            .collect_and_rank(query_text, clearance, self.config.top_experts)
            .await?;

        self.audit
            .record(AuditRecord {
                endpoint: EXPERTS_ENDPOINT,
                query: query_text.to_string(),
                clearance: clearance.as_str().to_string(),
                user_role: caller.audit_user_role(requested_clearance, clearance),
                redacted_count: 0,
                client_id: Some(caller.audit_client_id()),
            })
            .await;

        Ok(ExpertsResponse {
            query: query_text.to_string(),
            clearance: clearance.as_str().to_string(),
            experts,
        })
    }

    async fn collect_and_rank(
        &self,
        query_text: &str,
        clearance: Clearance,
        top_experts: usize,
    ) -> Result<Vec<ExpertRow>> {
        let optimized = self.optimizer.optimize(query_text);
        let query_vector = self.embedder.embed_query(optimized.retrieval_text()).await?;

        let hits = self
            .retriever
            .collect_visible_hits(&query_vector, clearance, usize::MAX)
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let matches: Vec<PaperMatch> = hits
            .iter()
            .map(|hit| PaperMatch {
                paper_id: hit.paper_id,
                distance: hit.best_distance,
            })
            .collect();
        let paper_ids: Vec<Uuid> = hits.iter().map(|hit| hit.paper_id).collect();

        let papers: HashMap<Uuid, PaperSummary> = self
            .store
            .find_papers_by_ids(&paper_ids)
            .await?
            .into_iter()
            .map(|paper| {
                (
                    paper.id,
                    PaperSummary {
                        title: paper.title,
                        published_date: paper.published_date,
                    },
                )
            })
            .collect();
        let mut authorships: HashMap<Uuid, Vec<PaperAuthorRow>> = HashMap::new();
        for row in self.store.authors_for_papers(&paper_ids).await? {
            authorships.entry(row.paper_id).or_default().push(row);
        }
        let mut topics: HashMap<Uuid, Vec<String>> = HashMap::new();
        for row in self.store.topics_for_papers(&paper_ids).await? {
            topics.entry(row.paper_id).or_default().push(row.name);
        }

        let evidence = ExpertEvidence {
            matches,
            papers,
            authorships,
            topics,
        };
        let config = ExpertsConfig {
            top_experts,
            ..self.config.clone()
        };
        Ok(rank_experts(
            &evidence,
            &optimized,
            &config,
            Utc::now().date_naive(),
        ))
    }
}
