//! Live-fetch read-through
//!
//! When a first-page search comes back sparse, a bounded backfill pulls
//! works from the external works API, imports the ones that actually
//! match the query, and embeds their chunks so the search can rerun
//! over the enriched corpus. The gate is consulted at most once per
//! search and every outcome is reported in the response, never as a
//! request failure.

pub mod openalex;

use crate::livefetch::openalex::{WorkRecord, WorkSource};
use crate::query;
use async_trait::async_trait;
use chrono::Utc;
use expertscope_common::clearance::Clearance;
use expertscope_common::config::LiveFetchConfig;
use expertscope_common::db::models::{Author, FetchRun, Paper, RunStatus, Topic};
use expertscope_common::db::Repository;
use expertscope_common::embeddings::Embedder;
use expertscope_common::errors::{AppError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const MIN_QUERY_COVERAGE: f64 = 0.18;
const CHUNK_WINDOW_WORDS: usize = 180;
const CHUNK_WINDOW_OVERLAP: usize = 40;
const MIN_TOKEN_LEN: usize = 3;

/// Outcome of consulting the read-through gate, embedded in the search
/// response as `live_fetch`
#[derive(Debug, Clone, Serialize)]
pub struct ReadThroughStatus {
    pub enabled: bool,
    pub attempted: bool,
    pub reason: String,
    pub works_processed: usize,
    pub papers_touched: usize,
    pub chunks_embedded: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl ReadThroughStatus {
    fn skipped(enabled: bool, reason: &str) -> Self {
        Self {
            enabled,
            attempted: false,
            reason: reason.to_string(),
            works_processed: 0,
            papers_touched: 0,
            chunks_embedded: 0,
            duration_ms: 0,
            error: None,
        }
    }

    /// The search reruns its ranked-hit collection once when the fetch
    /// actually touched papers
    pub fn should_rerun_search(&self) -> bool {
        self.attempted && self.papers_touched > 0
    }
}

/// Storage surface the backfill writes through
#[async_trait]
pub trait BackfillStore: Send + Sync {
    async fn latest_fetch_run(&self, query: &str) -> Result<Option<FetchRun>>;

    async fn create_fetch_run(&self, query: &str) -> Result<FetchRun>;

    async fn complete_fetch_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        works_processed: i32,
        papers_touched: i32,
        chunks_embedded: i32,
        error_message: Option<String>,
    ) -> Result<()>;

    async fn upsert_paper(
        &self,
        external_id: &str,
        title: &str,
        abstract_text: &str,
        published_date: Option<chrono::NaiveDate>,
        security_level: &str,
    ) -> Result<(Paper, bool)>;

    async fn upsert_author(
        &self,
        external_id: &str,
        name: &str,
        institution: Option<String>,
    ) -> Result<Author>;

    async fn upsert_topic(&self, external_id: &str, name: &str) -> Result<Topic>;

    async fn link_authorship(&self, paper_id: Uuid, author_id: Uuid, author_order: i32)
        -> Result<()>;

    async fn link_paper_topic(&self, paper_id: Uuid, topic_id: Uuid) -> Result<()>;

    async fn replace_chunks(
        &self,
        paper_id: Uuid,
        chunks: Vec<(i32, String, Vec<f32>)>,
    ) -> Result<usize>;
}

#[async_trait]
impl BackfillStore for Repository {
    async fn latest_fetch_run(&self, query: &str) -> Result<Option<FetchRun>> {
        Repository::latest_fetch_run(self, query).await
    }

    async fn create_fetch_run(&self, query: &str) -> Result<FetchRun> {
        Repository::create_fetch_run(self, query).await
    }

    async fn complete_fetch_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        works_processed: i32,
        papers_touched: i32,
        chunks_embedded: i32,
        error_message: Option<String>,
    ) -> Result<()> {
        Repository::complete_fetch_run(
            self,
            run_id,
            status,
            works_processed,
            papers_touched,
            chunks_embedded,
            error_message,
        )
        .await
    }

    async fn upsert_paper(
        &self,
        external_id: &str,
        title: &str,
        abstract_text: &str,
        published_date: Option<chrono::NaiveDate>,
        security_level: &str,
    ) -> Result<(Paper, bool)> {
        Repository::upsert_paper(self, external_id, title, abstract_text, published_date, security_level)
            .await
    }

    async fn upsert_author(
        &self,
        external_id: &str,
        name: &str,
        institution: Option<String>,
    ) -> Result<Author> {
        Repository::upsert_author(self, external_id, name, institution).await
    }

    async fn upsert_topic(&self, external_id: &str, name: &str) -> Result<Topic> {
        Repository::upsert_topic(self, external_id, name).await
    }

    async fn link_authorship(
        &self,
        paper_id: Uuid,
        author_id: Uuid,
        author_order: i32,
    ) -> Result<()> {
        Repository::link_authorship(self, paper_id, author_id, author_order).await
    }

    async fn link_paper_topic(&self, paper_id: Uuid, topic_id: Uuid) -> Result<()> {
        Repository::link_paper_topic(self, paper_id, topic_id).await
    }

    async fn replace_chunks(
        &self,
        paper_id: Uuid,
        chunks: Vec<(i32, String, Vec<f32>)>,
    ) -> Result<usize> {
        Repository::replace_chunks(self, paper_id, chunks).await
    }
}

struct ImportOutcome {
    works_processed: usize,
    papers_touched: usize,
    chunks_embedded: usize,
}

/// Gate plus importer for the read-through backfill
pub struct LiveFetcher {
    store: Arc<dyn BackfillStore>,
    source: Option<Arc<dyn WorkSource>>,
    embedder: Arc<dyn Embedder>,
    enabled: bool,
    min_results: usize,
    fetch_limit: usize,
    cooldown_secs: u64,
}

impl LiveFetcher {
    pub fn new(
        store: Arc<dyn BackfillStore>,
        source: Option<Arc<dyn WorkSource>>,
        embedder: Arc<dyn Embedder>,
        config: &LiveFetchConfig,
    ) -> Result<Self> {
        if config.min_results == 0 {
            return Err(AppError::Configuration {
                message: "min_results must be greater than 0".to_string(),
            });
        }
        if config.fetch_limit == 0 {
            return Err(AppError::Configuration {
                message: "fetch_limit must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            store,
            source,
            embedder,
            enabled: config.enabled,
            min_results: config.min_results,
            fetch_limit: config.fetch_limit,
            cooldown_secs: config.cooldown_secs,
        })
    }

    /// Consult the gate and run the backfill when every gate passes.
    /// Infallible: infrastructure failures degrade to `reason: "error"`.
    pub async fn fetch_if_needed(
        &self,
        query: &str,
        current_result_count: usize,
        page: u64,
    ) -> ReadThroughStatus {
        match self.consult(query, current_result_count, page).await {
            Ok(status) => status,
            Err(error) => {
                tracing::warn!(error = %error, "Live fetch gate failed");
                let mut status = ReadThroughStatus::skipped(self.enabled, "error");
                status.error = Some(error.to_string());
                status
            }
        }
    }

    async fn consult(
        &self,
        query: &str,
        current_result_count: usize,
        page: u64,
    ) -> Result<ReadThroughStatus> {
        let query_text = query.trim();
        if !self.enabled {
            return Ok(ReadThroughStatus::skipped(false, "disabled"));
        }
        if query_text.is_empty() {
            return Ok(ReadThroughStatus::skipped(true, "empty_query"));
        }
        if page != 1 {
            return Ok(ReadThroughStatus::skipped(true, "page_not_supported"));
        }
        if current_result_count >= self.min_results {
            return Ok(ReadThroughStatus::skipped(true, "sufficient_local_results"));
        }
        let Some(source) = &self.source else {
            return Ok(ReadThroughStatus::skipped(true, "missing_api_key"));
        };

        let run_query = format!("live_fetch:{}", query_text);
        if self.in_cooldown(&run_query).await? {
            return Ok(ReadThroughStatus::skipped(true, "cooldown"));
        }

        let run = self.store.create_fetch_run(&run_query).await?;
        let started = Instant::now();

        match self.import(source.as_ref(), query_text, run.id).await {
            Ok(outcome) => Ok(ReadThroughStatus {
                enabled: true,
                attempted: true,
                reason: "fetched".to_string(),
                works_processed: outcome.works_processed,
                papers_touched: outcome.papers_touched,
                chunks_embedded: outcome.chunks_embedded,
                duration_ms: started.elapsed().as_millis() as u64,
                error: None,
            }),
            Err(error) => {
                tracing::warn!(error = %error, query = query_text, "Live fetch attempt failed");
                if let Err(mark_error) = self
                    .store
                    .complete_fetch_run(run.id, RunStatus::Failed, 0, 0, 0, Some(error.to_string()))
                    .await
                {
                    tracing::warn!(error = %mark_error, "Failed to mark fetch run as failed");
                }
                Ok(ReadThroughStatus {
                    enabled: true,
                    attempted: true,
                    reason: "failed".to_string(),
                    works_processed: 0,
                    papers_touched: 0,
                    chunks_embedded: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: Some(error.to_string()),
                })
            }
        }
    }

    /// A query cools down after a completed run until `cooldown_secs`
    /// elapse; failed runs never block a retry
    async fn in_cooldown(&self, run_query: &str) -> Result<bool> {
        if self.cooldown_secs == 0 {
            return Ok(false);
        }
        let Some(run) = self.store.latest_fetch_run(run_query).await? else {
            return Ok(false);
        };
        if run.run_status() != RunStatus::Completed {
            return Ok(false);
        }
        let Some(completed_at) = run.completed_at else {
            return Ok(false);
        };

        let window_start = Utc::now() - chrono::Duration::seconds(self.cooldown_secs as i64);
        Ok(completed_at.with_timezone(&Utc) >= window_start)
    }

    async fn import(
        &self,
        source: &dyn WorkSource,
        query: &str,
        run_id: Uuid,
    ) -> Result<ImportOutcome> {
        let works = source.fetch_works(query, self.fetch_limit).await?;
        let query_terms = tokenize(query);

        let mut works_processed = 0usize;
        let mut works_skipped = 0usize;
        let mut paper_ids: HashSet<Uuid> = HashSet::new();
        let mut chunks_embedded = 0usize;

        for work in works {
            if !is_relevant_work(&work, &query_terms) {
                works_skipped += 1;
                tracing::debug!(
                    external_id = %work.external_id,
                    "Skipped work with low query alignment"
                );
                continue;
            }

            let (paper, _created) = self
                .store
                .upsert_paper(
                    &work.external_id,
                    &work.title,
                    &work.abstract_text,
                    work.published_date,
                    Clearance::Public.as_str(),
                )
                .await?;

            for (index, author) in work.authors.iter().enumerate() {
                let row = self
                    .store
                    .upsert_author(&author.external_id, &author.name, author.institution.clone())
                    .await?;
                self.store
                    .link_authorship(paper.id, row.id, (index + 1) as i32)
                    .await?;
            }

            for topic in &work.topics {
                let row = self.store.upsert_topic(&topic.external_id, &topic.name).await?;
                self.store.link_paper_topic(paper.id, row.id).await?;
            }

            chunks_embedded += self.embed_chunks(paper.id, &work).await?;
            works_processed += 1;
            paper_ids.insert(paper.id);
        }

        tracing::info!(
            query,
            works_processed,
            works_skipped,
            papers_touched = paper_ids.len(),
            chunks_embedded,
            "Live fetch import complete"
        );

        self.store
            .complete_fetch_run(
                run_id,
                RunStatus::Completed,
                works_processed as i32,
                paper_ids.len() as i32,
                chunks_embedded as i32,
                None,
            )
            .await?;

        Ok(ImportOutcome {
            works_processed,
            papers_touched: paper_ids.len(),
            chunks_embedded,
        })
    }

    async fn embed_chunks(&self, paper_id: Uuid, work: &WorkRecord) -> Result<usize> {
        let text = if work.abstract_text.is_empty() {
            work.title.clone()
        } else if work.title.is_empty() {
            work.abstract_text.clone()
        } else {
            format!("{}\n\n{}", work.title, work.abstract_text)
        };

        let windows = chunk_windows(&text, CHUNK_WINDOW_WORDS, CHUNK_WINDOW_OVERLAP);
        if windows.is_empty() {
            return Ok(0);
        }

        let vectors = self.embedder.embed_batch(&windows).await?;
        let rows = windows
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (content, embedding))| (index as i32, content, embedding))
            .collect();

        self.store.replace_chunks(paper_id, rows).await
    }
}

/// Overlapping word windows; the last window ends at the final word
fn chunk_windows(text: &str, window: usize, overlap: usize) -> Vec<String> {
    if window == 0 || overlap >= window {
        return Vec::new();
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let step = window - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + window).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Keep only works whose text shares enough vocabulary with the query.
/// Domain terms in the query must show up in the work.
fn is_relevant_work(work: &WorkRecord, query_terms: &HashSet<String>) -> bool {
    if query_terms.is_empty() {
        return true;
    }

    let mut corpus = format!("{} {}", work.title, work.abstract_text);
    for topic in &work.topics {
        corpus.push(' ');
        corpus.push_str(&topic.name);
    }
    let corpus_terms = tokenize(&corpus);
    if corpus_terms.is_empty() {
        return false;
    }

    let overlap = query_terms.intersection(&corpus_terms).count();
    if overlap == 0 {
        return false;
    }

    let coverage = overlap as f64 / query_terms.len() as f64;
    if coverage < MIN_QUERY_COVERAGE && overlap < 2 {
        return false;
    }

    let domain_terms: Vec<&String> = query_terms
        .iter()
        .filter(|t| query::is_domain_term(t))
        .collect();
    if !domain_terms.is_empty() && !domain_terms.iter().any(|t| corpus_terms.contains(t.as_str())) {
        return false;
    }

    true
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}
