//! Grounded question answering
//!
//! Provides:
//! - The ask pipeline: validate, retrieve a redacted context window,
//!   number citations, synthesize, recommend experts, audit
//! - The response payload with the normalized answer and 1-based
//!   citations
//!
//! Redacted slots keep their citation number and expose nothing else,
//! so the answer can be checked against visible sources without hinting
//! at hidden content.

use crate::audit::{AuditRecord, AuditRecorder};
use crate::experts::ExpertsService;
use crate::query::QueryOptimizer;
use crate::ranking::ExpertRow;
use crate::request;
use crate::retrieval::ChunkRetriever;
use crate::synthesis::{build_citations, AnswerPayload, AnswerSynthesizer, Citation};
use expertscope_common::auth::CallerContext;
use expertscope_common::clearance::Clearance;
use expertscope_common::config::AskConfig;
use expertscope_common::embeddings::QueryEmbedder;
use expertscope_common::errors::{AppError, Result};
use expertscope_common::metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

const ASK_ENDPOINT: &str = "/api/ask";

/// Experts attached to every answer
const RECOMMENDED_EXPERT_COUNT: usize = 5;

/// Parameters of one ask request
#[derive(Debug, Clone)]
pub struct AskParams {
    pub query: String,

    /// Requested clearance; the session role decides when absent
    pub clearance: Option<String>,
}

/// Ask response payload
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    /// The normalized payload's answer string, surfaced for clients
    /// that want only the text
    pub answer: String,
    pub answer_payload: AnswerPayload,
    pub optimized_query: String,
    pub citations: Vec<Citation>,
    pub recommended_experts: Vec<ExpertRow>,
    pub redacted_count: usize,
}

/// Question answering pipeline over the redacted context window
pub struct AskService {
    optimizer: QueryOptimizer,
    embedder: Arc<QueryEmbedder>,
    retriever: ChunkRetriever,
    synthesizer: AnswerSynthesizer,
    experts: Arc<ExpertsService>,
    audit: AuditRecorder,
    top_k: usize,
}

impl std::fmt::Debug for AskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AskService")
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl AskService {
    pub fn new(
        embedder: Arc<QueryEmbedder>,
        retriever: ChunkRetriever,
        synthesizer: AnswerSynthesizer,
        experts: Arc<ExpertsService>,
        audit: AuditRecorder,
        config: &AskConfig,
    ) -> Result<Self> {
        if config.top_k == 0 {
            return Err(AppError::Configuration {
                message: "top_k must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            optimizer: QueryOptimizer::new(),
            embedder,
            retriever,
            synthesizer,
            experts,
            audit,
            top_k: config.top_k,
        })
    }

    /// Run one ask request. Validation failures reject before any side
    /// effect; infrastructure failures after validation surface as the
    /// fixed backend-unavailable error.
    pub async fn ask(&self, params: &AskParams, caller: &CallerContext) -> Result<AskResponse> {
        let query_text = request::clean_query(&params.query)?;
        let clearance = caller.resolve_clearance(params.clearance.as_deref())?;

        let started = Instant::now();
        let response = match self
            .run(&query_text, clearance, params.clearance.as_deref(), caller)
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(error = %error, "Ask pipeline failed");
                return Err(AppError::backend_unavailable());
            }
        };

        metrics::record_pipeline(
            "ask",
            started.elapsed().as_secs_f64(),
            response.citations.len(),
            response.redacted_count,
        );
        Ok(response)
    }

    async fn run(
        &self,
        query_text: &str,
        clearance: Clearance,
        requested_clearance: Option<&str>,
        caller: &CallerContext,
    ) -> Result<AskResponse> {
        let optimized = self.optimizer.optimize(query_text);
        let query_vector = self.embedder.embed_query(optimized.retrieval_text()).await?;

        let window = self
            .retriever
            .retrieve_top_chunks(&query_vector, clearance, self.top_k)
            .await?;
        let (citations, visible) = build_citations(&window);

        let synthesis_started = Instant::now();
        let (payload, mode) = self.synthesizer.synthesize(query_text, &visible).await;
        metrics::record_answer(mode.as_str(), synthesis_started.elapsed().as_secs_f64());

        let recommended_experts = self
            .experts
            .recommend(query_text, clearance, RECOMMENDED_EXPERT_COUNT)
            .await?;

        self.audit
            .record(AuditRecord {
                endpoint: ASK_ENDPOINT,
                query: query_text.to_string(),
                clearance: clearance.as_str().to_string(),
                user_role: caller.audit_user_role(requested_clearance, clearance),
                redacted_count: window.redacted_count as i32,
                client_id: Some(caller.audit_client_id()),
            })
            .await;

        Ok(AskResponse {
            answer: payload.answer.clone(),
            answer_payload: payload,
            optimized_query: optimized.retrieval_text().to_string(),
            citations,
            recommended_experts,
            redacted_count: window.redacted_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditSink;
    use crate::experts::ExpertStore;
    use crate::retrieval::ChunkScanSource;
    use async_trait::async_trait;
    use chrono::Utc;
    use expertscope_common::db::models::{Paper, SearchAudit};
    use expertscope_common::db::{
        ChunkScanRow, ContextScanRow, PaperAuthorRow, PaperTopicRow,
    };
    use expertscope_common::embeddings::HashEmbedder;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn context_row(chunk: u128, paper: u128, level: &str, content: &str, distance: f64) -> ContextScanRow {
        ContextScanRow {
            chunk_id: Uuid::from_u128(chunk),
            paper_id: Uuid::from_u128(paper),
            paper_external_id: format!("W{}", paper),
            paper_title: format!("Paper {}", paper),
            security_level: level.to_string(),
            content: content.to_string(),
            distance,
        }
    }

    fn scan_row(paper: u128, chunk: u128, level: &str, distance: f64) -> ChunkScanRow {
        ChunkScanRow {
            chunk_id: Uuid::from_u128(chunk),
            paper_id: Uuid::from_u128(paper),
            security_level: level.to_string(),
            distance,
        }
    }

    fn paper(id: u128, title: &str) -> Paper {
        let now = Utc::now();
        Paper {
            id: Uuid::from_u128(id),
            external_id: format!("W{}", id),
            title: title.to_string(),
            abstract_text: String::new(),
            published_date: None,
            security_level: "PUBLIC".to_string(),
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    fn author_row(paper: u128, author: u128, name: &str) -> PaperAuthorRow {
        PaperAuthorRow {
            paper_id: Uuid::from_u128(paper),
            author_id: Uuid::from_u128(author),
            name: name.to_string(),
            institution: None,
            centrality_score: None,
            author_order: 1,
        }
    }

    struct FakeScan {
        context_rows: Vec<ContextScanRow>,
        visible_rows: Vec<ChunkScanRow>,
        fail_context: bool,
    }

    #[async_trait]
    impl ChunkScanSource for FakeScan {
        async fn scan_ranked(
            &self,
            _query_vector: &[f32],
            _offset: u64,
            _limit: u64,
        ) -> Result<Vec<ChunkScanRow>> {
            Ok(Vec::new())
        }

        async fn scan_context(
            &self,
            _query_vector: &[f32],
            offset: u64,
            limit: u64,
        ) -> Result<Vec<ContextScanRow>> {
            if self.fail_context {
                return Err(AppError::DatabaseConnection {
                    message: "connection refused".to_string(),
                });
            }
            Ok(self
                .context_rows
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn scan_visible(
            &self,
            _query_vector: &[f32],
            allowed_levels: &[&str],
            offset: u64,
            limit: u64,
        ) -> Result<Vec<ChunkScanRow>> {
            Ok(self
                .visible_rows
                .iter()
                .filter(|row| allowed_levels.contains(&row.security_level.as_str()))
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        papers: Vec<Paper>,
        authors: Vec<PaperAuthorRow>,
        topics: Vec<PaperTopicRow>,
        fail: bool,
    }

    #[async_trait]
    impl ExpertStore for FakeStore {
        async fn find_papers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Paper>> {
            if self.fail {
                return Err(AppError::DatabaseConnection {
                    message: "connection refused".to_string(),
                });
            }
            Ok(self
                .papers
                .iter()
                .filter(|paper| ids.contains(&paper.id))
                .cloned()
                .collect())
        }

        async fn authors_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperAuthorRow>> {
            Ok(self
                .authors
                .iter()
                .filter(|row| paper_ids.contains(&row.paper_id))
                .cloned()
                .collect())
        }

        async fn topics_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperTopicRow>> {
            Ok(self
                .topics
                .iter()
                .filter(|row| paper_ids.contains(&row.paper_id))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeAudit {
        rows: Mutex<Vec<(String, String, String, String, i32, Option<String>)>>,
    }

    #[async_trait]
    impl AuditSink for FakeAudit {
        async fn insert_search_audit(
            &self,
            endpoint: &str,
            query: &str,
            clearance: &str,
            user_role: &str,
            redacted_count: i32,
            client_id: Option<String>,
        ) -> Result<SearchAudit> {
            self.rows.lock().unwrap().push((
                endpoint.to_string(),
                query.to_string(),
                clearance.to_string(),
                user_role.to_string(),
                redacted_count,
                client_id.clone(),
            ));
            Ok(SearchAudit {
                id: Uuid::from_u128(500),
                endpoint: endpoint.to_string(),
                query: query.to_string(),
                clearance: clearance.to_string(),
                user_role: user_role.to_string(),
                redacted_count,
                client_id,
                created_at: Utc::now().into(),
            })
        }
    }

    fn experts_config() -> expertscope_common::config::ExpertsConfig {
        expertscope_common::config::ExpertsConfig {
            top_experts: 10,
            top_papers: 3,
            top_topics: 3,
            max_chunk_scan: 3000,
            topic_diversity_target: 5,
            enable_centrality: true,
            min_score: 0.05,
            min_keep: 3,
        }
    }

    fn ask_config() -> AskConfig {
        AskConfig {
            top_k: 8,
            max_chunk_scan: 2000,
            fallback_sentence_count: 3,
        }
    }

    fn caller() -> CallerContext {
        CallerContext {
            session_role: None,
            client_id: Some("test-client".to_string()),
            request_id: "req-1".to_string(),
        }
    }

    fn build_service(scan: FakeScan, store: FakeStore, audit: Arc<FakeAudit>) -> AskService {
        let scan = Arc::new(scan);
        let embedder = Arc::new(QueryEmbedder::without_fallback(Arc::new(HashEmbedder::new(
            8,
        ))));
        let experts_retriever = ChunkRetriever::new(scan.clone(), 100, 3000).unwrap();
        let experts = Arc::new(
            ExpertsService::new(
                Arc::new(store),
                embedder.clone(),
                experts_retriever,
                AuditRecorder::new(audit.clone()),
                &experts_config(),
            )
            .unwrap(),
        );

        let ask_retriever = ChunkRetriever::new(scan, 100, 2000).unwrap();
        AskService::new(
            embedder,
            ask_retriever,
            AnswerSynthesizer::new(None, 3).unwrap(),
            experts,
            AuditRecorder::new(audit),
            &ask_config(),
        )
        .unwrap()
    }

    fn params(query: &str, clearance: Option<&str>) -> AskParams {
        AskParams {
            query: query.to_string(),
            clearance: clearance.map(String::from),
        }
    }

    fn answer_fixture() -> (FakeScan, FakeStore) {
        let scan = FakeScan {
            context_rows: vec![
                context_row(
                    11,
                    1,
                    "PUBLIC",
                    "Network slicing enables tenant isolation. Unrelated filler trails here.",
                    0.05,
                ),
                context_row(12, 2, "CONFIDENTIAL", "Hidden capacity figures.", 0.08),
                context_row(
                    13,
                    3,
                    "PUBLIC",
                    "Slicing policy controls the network core.",
                    0.12,
                ),
            ],
            visible_rows: vec![scan_row(1, 91, "PUBLIC", 0.05)],
            fail_context: false,
        };
        let store = FakeStore {
            papers: vec![paper(1, "Network slicing in 5G cores")],
            authors: vec![author_row(1, 31, "Ada Lovelace")],
            ..FakeStore::default()
        };
        (scan, store)
    }

    #[test]
    fn test_constructor_rejects_zero_top_k() {
        let scan = Arc::new(FakeScan {
            context_rows: Vec::new(),
            visible_rows: Vec::new(),
            fail_context: false,
        });
        let embedder = Arc::new(QueryEmbedder::without_fallback(Arc::new(HashEmbedder::new(
            8,
        ))));
        let retriever = ChunkRetriever::new(scan.clone(), 100, 2000).unwrap();
        let experts = Arc::new(
            ExpertsService::new(
                Arc::new(FakeStore::default()),
                embedder.clone(),
                ChunkRetriever::new(scan, 100, 3000).unwrap(),
                AuditRecorder::new(Arc::new(FakeAudit::default())),
                &experts_config(),
            )
            .unwrap(),
        );
        let config = AskConfig {
            top_k: 0,
            ..ask_config()
        };

        let error = AskService::new(
            embedder,
            retriever,
            AnswerSynthesizer::new(None, 3).unwrap(),
            experts,
            AuditRecorder::new(Arc::new(FakeAudit::default())),
            &config,
        )
        .unwrap_err();

        match error {
            AppError::Configuration { message } => {
                assert_eq!(message, "top_k must be greater than 0");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_blank_query_without_side_effects() {
        let audit = Arc::new(FakeAudit::default());
        let scan = FakeScan {
            context_rows: Vec::new(),
            visible_rows: Vec::new(),
            fail_context: false,
        };
        let service = build_service(scan, FakeStore::default(), Arc::clone(&audit));

        let error = service.ask(&params("  ", None), &caller()).await.unwrap_err();

        match error {
            AppError::Validation { message, .. } => assert_eq!(message, "query cannot be empty."),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(audit.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_no_context_answer() {
        let audit = Arc::new(FakeAudit::default());
        let scan = FakeScan {
            context_rows: Vec::new(),
            visible_rows: Vec::new(),
            fail_context: false,
        };
        let service = build_service(scan, FakeStore::default(), Arc::clone(&audit));

        let response = service
            .ask(&params("network slicing", None), &caller())
            .await
            .unwrap();

        assert_eq!(
            response.answer,
            "Evidence is weak: no accessible chunks were found for this query at your current \
             clearance level."
        );
        assert!(response.citations.is_empty());
        assert!(response.recommended_experts.is_empty());
        assert_eq!(response.redacted_count, 0);
        assert_eq!(response.answer_payload.confidence, "low");

        let audit_rows = audit.rows.lock().unwrap();
        assert_eq!(audit_rows.len(), 1);
        assert_eq!(audit_rows[0].0, "/api/ask");
    }

    #[tokio::test]
    async fn test_answer_cites_visible_chunks_and_keeps_redacted_slots() {
        let (scan, store) = answer_fixture();
        let audit = Arc::new(FakeAudit::default());
        let service = build_service(scan, store, Arc::clone(&audit));

        let response = service
            .ask(&params("network slicing", None), &caller())
            .await
            .unwrap();

        assert_eq!(response.citations.len(), 3);
        assert_eq!(response.citations[0].id, 1);
        assert_eq!(response.citations[0].reference, "W1");
        assert!(!response.citations[0].redacted);
        assert_eq!(response.citations[1].paper_title, "[REDACTED]");
        assert_eq!(response.citations[1].reference, "redacted:2");
        assert_eq!(response.citations[1].chunk_id, None);
        assert!(response.citations[1].redacted);
        assert_eq!(response.redacted_count, 1);

        // The hidden chunk contributes nothing beyond its slot
        let serialized = serde_json::to_string(&response).unwrap();
        assert!(!serialized.contains("Hidden capacity figures"));

        assert_eq!(
            response.answer,
            "Network slicing enables tenant isolation. This summary is grounded in the \
             highest-similarity retrieved chunks."
        );
        assert_eq!(
            response.answer_payload.key_points[0],
            "Network slicing enables tenant isolation. [1]"
        );
        assert_eq!(response.answer_payload.confidence, "medium");

        assert_eq!(response.recommended_experts.len(), 1);
        assert_eq!(response.recommended_experts[0].name, "Ada Lovelace");

        let audit_rows = audit.rows.lock().unwrap();
        assert_eq!(audit_rows.len(), 1);
        assert_eq!(
            audit_rows[0],
            (
                "/api/ask".to_string(),
                "network slicing".to_string(),
                "PUBLIC".to_string(),
                "PUBLIC".to_string(),
                1,
                Some("test-client".to_string()),
            )
        );
    }

    #[tokio::test]
    async fn test_optimized_query_surfaces_retrieval_text() {
        let (scan, store) = answer_fixture();
        let service = build_service(scan, store, Arc::new(FakeAudit::default()));

        let response = service
            .ask(&params("network slicing", None), &caller())
            .await
            .unwrap();

        assert!(response.optimized_query.contains("network slicing"));
    }

    #[tokio::test]
    async fn test_recommended_experts_capped_at_five() {
        let context_rows = vec![context_row(
            11,
            1,
            "PUBLIC",
            "Network slicing enables tenant isolation.",
            0.05,
        )];
        let visible_rows: Vec<ChunkScanRow> = (1..=6)
            .map(|i| scan_row(i, 90 + i, "PUBLIC", 0.01 * i as f64))
            .collect();
        let papers: Vec<Paper> = (1..=6).map(|i| paper(i, "Slicing paper")).collect();
        let authors: Vec<PaperAuthorRow> = (1..=6)
            .map(|i| author_row(i, 30 + i, &format!("Author {}", i)))
            .collect();

        let scan = FakeScan {
            context_rows,
            visible_rows,
            fail_context: false,
        };
        let store = FakeStore {
            papers,
            authors,
            ..FakeStore::default()
        };
        let service = build_service(scan, store, Arc::new(FakeAudit::default()));

        let response = service
            .ask(&params("network slicing", None), &caller())
            .await
            .unwrap();

        assert_eq!(response.recommended_experts.len(), 5);
    }

    #[tokio::test]
    async fn test_context_scan_failure_maps_to_backend_unavailable() {
        let audit = Arc::new(FakeAudit::default());
        let scan = FakeScan {
            context_rows: Vec::new(),
            visible_rows: Vec::new(),
            fail_context: true,
        };
        let service = build_service(scan, FakeStore::default(), Arc::clone(&audit));

        let error = service
            .ask(&params("network slicing", None), &caller())
            .await
            .unwrap_err();

        assert!(matches!(error, AppError::BackendUnavailable { .. }));
        assert_eq!(error.to_string(), "Search backend unavailable.");
        assert!(audit.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expert_lookup_failure_fails_the_request() {
        let (scan, _) = answer_fixture();
        let audit = Arc::new(FakeAudit::default());
        let store = FakeStore {
            fail: true,
            ..FakeStore::default()
        };
        let service = build_service(scan, store, Arc::clone(&audit));

        let error = service
            .ask(&params("network slicing", None), &caller())
            .await
            .unwrap_err();

        assert!(matches!(error, AppError::BackendUnavailable { .. }));
        assert!(audit.rows.lock().unwrap().is_empty());
    }
}
