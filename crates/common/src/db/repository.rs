//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling. Each query path gets its own explicit,
//! parameterized statement; vector similarity runs through raw SQL.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, Set, Statement,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of a distance-ordered chunk scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkScanRow {
    pub chunk_id: Uuid,
    pub paper_id: Uuid,
    pub security_level: String,
    pub distance: f64,
}

/// One row of a distance-ordered context scan (ask path)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextScanRow {
    pub chunk_id: Uuid,
    pub paper_id: Uuid,
    pub paper_external_id: String,
    pub paper_title: String,
    pub security_level: String,
    pub content: String,
    pub distance: f64,
}

/// Best (minimum) chunk distance for a paper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperDistanceRow {
    pub paper_id: Uuid,
    pub distance: f64,
}

/// One author credited on a paper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperAuthorRow {
    pub paper_id: Uuid,
    pub author_id: Uuid,
    pub name: String,
    pub institution: Option<String>,
    pub centrality_score: Option<f64>,
    pub author_order: i32,
}

/// One topic tagged on a paper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperTopicRow {
    pub paper_id: Uuid,
    pub topic_id: Uuid,
    pub name: String,
}

/// One shared-author or shared-topic link out of a seed paper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedLinkRow {
    pub seed_paper_id: Uuid,
    pub related_paper_id: Uuid,
    pub via_label: String,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

fn format_vector(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

// Levels come from the static clearance tables, ids are Uuids; both are
// safe to splice into SQL text.
fn level_list(levels: &[&str]) -> String {
    levels
        .iter()
        .map(|l| format!("'{}'", l))
        .collect::<Vec<_>>()
        .join(",")
}

fn id_list(ids: &[Uuid]) -> String {
    ids.iter()
        .map(|id| format!("'{}'", id))
        .collect::<Vec<_>>()
        .join(",")
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Chunk Scans (distance-ordered, batched)
    // ========================================================================

    /// Fetch one batch of the global distance-ordered chunk scan.
    ///
    /// Rows come back ordered by (cosine distance asc, chunk id asc) so
    /// repeated batches walk a stable total order. The caller accounts for
    /// clearance; this scan sees every embedded chunk.
    pub async fn scan_chunks_by_distance(
        &self,
        embedding: &[f32],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ChunkScanRow>> {
        let embedding_str = format_vector(embedding);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                c.id as chunk_id,
                c.paper_id,
                p.security_level,
                c.embedding <=> $1::vector as distance
            FROM chunks c
            JOIN papers p ON c.paper_id = p.id
            WHERE c.embedding IS NOT NULL
            ORDER BY c.embedding <=> $1::vector, c.id
            LIMIT $2 OFFSET $3
            "#,
            vec![
                embedding_str.into(),
                (limit as i64).into(),
                (offset as i64).into(),
            ],
        );

        let rows = self
            .read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(ChunkScanRow {
                    chunk_id: row.try_get_by_index::<Uuid>(0).ok()?,
                    paper_id: row.try_get_by_index::<Uuid>(1).ok()?,
                    security_level: row.try_get_by_index::<String>(2).ok()?,
                    distance: row.try_get_by_index::<f64>(3).ok()?,
                })
            })
            .collect();

        Ok(rows)
    }

    /// Fetch one batch of the distance-ordered scan restricted to the given
    /// stored security levels. Used where redaction accounting is not
    /// needed and hidden rows must not be touched at all.
    pub async fn scan_visible_chunks_by_distance(
        &self,
        embedding: &[f32],
        allowed_levels: &[&str],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ChunkScanRow>> {
        let embedding_str = format_vector(embedding);

        let sql = format!(
            r#"
            SELECT
                c.id as chunk_id,
                c.paper_id,
                p.security_level,
                c.embedding <=> $1::vector as distance
            FROM chunks c
            JOIN papers p ON c.paper_id = p.id
            WHERE c.embedding IS NOT NULL
              AND p.security_level IN ({})
            ORDER BY c.embedding <=> $1::vector, c.id
            LIMIT $2 OFFSET $3
            "#,
            level_list(allowed_levels)
        );

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            vec![
                embedding_str.into(),
                (limit as i64).into(),
                (offset as i64).into(),
            ],
        );

        let rows = self
            .read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(ChunkScanRow {
                    chunk_id: row.try_get_by_index::<Uuid>(0).ok()?,
                    paper_id: row.try_get_by_index::<Uuid>(1).ok()?,
                    security_level: row.try_get_by_index::<String>(2).ok()?,
                    distance: row.try_get_by_index::<f64>(3).ok()?,
                })
            })
            .collect();

        Ok(rows)
    }

    /// Fetch one batch of the distance-ordered scan with chunk text and
    /// paper identity attached (answer-context path).
    pub async fn scan_context_chunks_by_distance(
        &self,
        embedding: &[f32],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ContextScanRow>> {
        let embedding_str = format_vector(embedding);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                c.id as chunk_id,
                c.paper_id,
                p.external_id as paper_external_id,
                p.title as paper_title,
                p.security_level,
                c.content,
                c.embedding <=> $1::vector as distance
            FROM chunks c
            JOIN papers p ON c.paper_id = p.id
            WHERE c.embedding IS NOT NULL
            ORDER BY c.embedding <=> $1::vector, c.id
            LIMIT $2 OFFSET $3
            "#,
            vec![
                embedding_str.into(),
                (limit as i64).into(),
                (offset as i64).into(),
            ],
        );

        let rows = self
            .read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(ContextScanRow {
                    chunk_id: row.try_get_by_index::<Uuid>(0).ok()?,
                    paper_id: row.try_get_by_index::<Uuid>(1).ok()?,
                    paper_external_id: row.try_get_by_index::<String>(2).ok()?,
                    paper_title: row.try_get_by_index::<String>(3).ok()?,
                    security_level: row.try_get_by_index::<String>(4).ok()?,
                    content: row.try_get_by_index::<String>(5).ok()?,
                    distance: row.try_get_by_index::<f64>(6).ok()?,
                })
            })
            .collect();

        Ok(rows)
    }

    /// Minimum chunk distance per paper for the given ids. Papers with no
    /// embedded chunks are absent from the result.
    pub async fn best_distances(
        &self,
        embedding: &[f32],
        paper_ids: &[Uuid],
    ) -> Result<Vec<PaperDistanceRow>> {
        if paper_ids.is_empty() {
            return Ok(Vec::new());
        }

        let embedding_str = format_vector(embedding);

        let sql = format!(
            r#"
            SELECT
                c.paper_id,
                MIN(c.embedding <=> $1::vector) as distance
            FROM chunks c
            WHERE c.embedding IS NOT NULL
              AND c.paper_id IN ({})
            GROUP BY c.paper_id
            "#,
            id_list(paper_ids)
        );

        let stmt =
            Statement::from_sql_and_values(DbBackend::Postgres, &sql, vec![embedding_str.into()]);

        let rows = self
            .read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(PaperDistanceRow {
                    paper_id: row.try_get_by_index::<Uuid>(0).ok()?,
                    distance: row.try_get_by_index::<f64>(1).ok()?,
                })
            })
            .collect();

        Ok(rows)
    }

    // ========================================================================
    // Paper Metadata
    // ========================================================================

    /// Find papers by ids
    pub async fn find_papers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Paper>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        PaperEntity::find()
            .filter(PaperColumn::Id.is_in(ids.to_vec()))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find paper by external id
    pub async fn find_paper_by_external_id(&self, external_id: &str) -> Result<Option<Paper>> {
        PaperEntity::find()
            .filter(PaperColumn::ExternalId.eq(external_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find chunks by ids
    pub async fn find_chunks_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        ChunkEntity::find()
            .filter(ChunkColumn::Id.is_in(ids.to_vec()))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Authors credited on the given papers, byline order preserved
    pub async fn authors_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperAuthorRow>> {
        if paper_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = AuthorshipEntity::find()
            .filter(AuthorshipColumn::PaperId.is_in(paper_ids.to_vec()))
            .find_also_related(AuthorEntity)
            .order_by_asc(AuthorshipColumn::PaperId)
            .order_by_asc(AuthorshipColumn::AuthorOrder)
            .order_by_asc(AuthorshipColumn::Id)
            .all(self.read_conn())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(link, author)| {
                let author = author?;
                Some(PaperAuthorRow {
                    paper_id: link.paper_id,
                    author_id: author.id,
                    name: author.name,
                    institution: author.institution,
                    centrality_score: author.centrality_score,
                    author_order: link.author_order,
                })
            })
            .collect())
    }

    /// Topics tagged on the given papers, name order
    pub async fn topics_for_papers(&self, paper_ids: &[Uuid]) -> Result<Vec<PaperTopicRow>> {
        if paper_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = PaperTopicEntity::find()
            .filter(PaperTopicColumn::PaperId.is_in(paper_ids.to_vec()))
            .find_also_related(TopicEntity)
            .order_by_asc(TopicColumn::Name)
            .order_by_asc(TopicColumn::Id)
            .all(self.read_conn())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(link, topic)| {
                let topic = topic?;
                Some(PaperTopicRow {
                    paper_id: link.paper_id,
                    topic_id: topic.id,
                    name: topic.name,
                })
            })
            .collect())
    }

    // ========================================================================
    // Graph Neighborhood
    // ========================================================================

    /// Papers sharing at least one author with any of the given papers,
    /// restricted to the allowed security levels. One row per
    /// (seed, related, author) triple, ordered by (author name, related id)
    /// so callers fold deterministically.
    pub async fn papers_sharing_author(
        &self,
        paper_ids: &[Uuid],
        allowed_levels: &[&str],
    ) -> Result<Vec<SharedLinkRow>> {
        if paper_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT DISTINCT
                a1.paper_id as seed_paper_id,
                a2.paper_id as related_paper_id,
                au.name as via_label
            FROM authorships a1
            JOIN authorships a2 ON a2.author_id = a1.author_id
                               AND a2.paper_id <> a1.paper_id
            JOIN authors au ON au.id = a1.author_id
            JOIN papers p ON p.id = a2.paper_id
            WHERE a1.paper_id IN ({})
              AND p.security_level IN ({})
            ORDER BY au.name, a2.paper_id
            "#,
            id_list(paper_ids),
            level_list(allowed_levels)
        );

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, vec![]);

        let rows = self
            .read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(SharedLinkRow {
                    seed_paper_id: row.try_get_by_index::<Uuid>(0).ok()?,
                    related_paper_id: row.try_get_by_index::<Uuid>(1).ok()?,
                    via_label: row.try_get_by_index::<String>(2).ok()?,
                })
            })
            .collect();

        Ok(rows)
    }

    /// Papers sharing at least one topic with any of the given papers,
    /// restricted to the allowed security levels.
    pub async fn papers_sharing_topic(
        &self,
        paper_ids: &[Uuid],
        allowed_levels: &[&str],
    ) -> Result<Vec<SharedLinkRow>> {
        if paper_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT DISTINCT
                t1.paper_id as seed_paper_id,
                t2.paper_id as related_paper_id,
                tp.name as via_label
            FROM paper_topics t1
            JOIN paper_topics t2 ON t2.topic_id = t1.topic_id
                                AND t2.paper_id <> t1.paper_id
            JOIN topics tp ON tp.id = t1.topic_id
            JOIN papers p ON p.id = t2.paper_id
            WHERE t1.paper_id IN ({})
              AND p.security_level IN ({})
            ORDER BY tp.name, t2.paper_id
            "#,
            id_list(paper_ids),
            level_list(allowed_levels)
        );

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, vec![]);

        let rows = self
            .read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(SharedLinkRow {
                    seed_paper_id: row.try_get_by_index::<Uuid>(0).ok()?,
                    related_paper_id: row.try_get_by_index::<Uuid>(1).ok()?,
                    via_label: row.try_get_by_index::<String>(2).ok()?,
                })
            })
            .collect();

        Ok(rows)
    }

    // ========================================================================
    // Audit Operations
    // ========================================================================

    /// Insert one audit row for a query request
    pub async fn insert_search_audit(
        &self,
        endpoint: &str,
        query: &str,
        clearance: &str,
        user_role: &str,
        redacted_count: i32,
        client_id: Option<String>,
    ) -> Result<SearchAudit> {
        let now = chrono::Utc::now();

        let audit = SearchAuditActiveModel {
            id: Set(Uuid::new_v4()),
            endpoint: Set(endpoint.to_string()),
            query: Set(query.to_string()),
            clearance: Set(clearance.to_string()),
            user_role: Set(user_role.to_string()),
            redacted_count: Set(redacted_count),
            client_id: Set(client_id),
            created_at: Set(now.into()),
        };

        audit.insert(self.write_conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Fetch Run Operations (read-through bookkeeping)
    // ========================================================================

    /// Latest fetch run recorded for a normalized query
    pub async fn latest_fetch_run(&self, query: &str) -> Result<Option<FetchRun>> {
        FetchRunEntity::find()
            .filter(FetchRunColumn::Query.eq(query))
            .order_by_desc(FetchRunColumn::StartedAt)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Record the start of a fetch run
    pub async fn create_fetch_run(&self, query: &str) -> Result<FetchRun> {
        let now = chrono::Utc::now();

        let run = FetchRunActiveModel {
            id: Set(Uuid::new_v4()),
            query: Set(query.to_string()),
            status: Set(String::from(RunStatus::Running)),
            works_processed: Set(0),
            papers_touched: Set(0),
            chunks_embedded: Set(0),
            error_message: Set(None),
            started_at: Set(now.into()),
            completed_at: Set(None),
        };

        run.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Record the outcome of a fetch run
    pub async fn complete_fetch_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        works_processed: i32,
        papers_touched: i32,
        chunks_embedded: i32,
        error_message: Option<String>,
    ) -> Result<()> {
        let now = chrono::Utc::now();

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE fetch_runs
            SET status = $1,
                works_processed = $2,
                papers_touched = $3,
                chunks_embedded = $4,
                error_message = $5,
                completed_at = $6
            WHERE id = $7
            "#,
            vec![
                String::from(status).into(),
                works_processed.into(),
                papers_touched.into(),
                chunks_embedded.into(),
                error_message.into(),
                now.into(),
                run_id.into(),
            ],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    // ========================================================================
    // Backfill Writes (read-through import)
    // ========================================================================

    /// Insert or refresh a paper keyed by external id. Returns the stored
    /// paper and whether it was newly created. A refresh never touches the
    /// stored security level, so re-imports cannot downgrade classification.
    pub async fn upsert_paper(
        &self,
        external_id: &str,
        title: &str,
        abstract_text: &str,
        published_date: Option<chrono::NaiveDate>,
        security_level: &str,
    ) -> Result<(Paper, bool)> {
        let now = chrono::Utc::now();

        if let Some(existing) = self.find_paper_by_external_id(external_id).await? {
            let mut model: PaperActiveModel = existing.into();
            model.title = Set(title.to_string());
            model.abstract_text = Set(abstract_text.to_string());
            model.published_date = Set(published_date);
            model.updated_at = Set(now.into());
            let updated = model.update(self.write_conn()).await?;
            return Ok((updated, false));
        }

        let paper = PaperActiveModel {
            id: Set(Uuid::new_v4()),
            external_id: Set(external_id.to_string()),
            title: Set(title.to_string()),
            abstract_text: Set(abstract_text.to_string()),
            published_date: Set(published_date),
            security_level: Set(security_level.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let inserted = paper.insert(self.write_conn()).await?;
        Ok((inserted, true))
    }

    /// Insert or refresh an author keyed by external id
    pub async fn upsert_author(
        &self,
        external_id: &str,
        name: &str,
        institution: Option<String>,
    ) -> Result<Author> {
        let now = chrono::Utc::now();

        let existing = AuthorEntity::find()
            .filter(AuthorColumn::ExternalId.eq(external_id))
            .one(self.write_conn())
            .await?;

        if let Some(author) = existing {
            let mut model: AuthorActiveModel = author.into();
            model.name = Set(name.to_string());
            if institution.is_some() {
                model.institution = Set(institution);
            }
            model.updated_at = Set(now.into());
            return model.update(self.write_conn()).await.map_err(Into::into);
        }

        let author = AuthorActiveModel {
            id: Set(Uuid::new_v4()),
            external_id: Set(external_id.to_string()),
            name: Set(name.to_string()),
            institution: Set(institution),
            centrality_score: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        author.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Insert a topic if missing, keyed by external id
    pub async fn upsert_topic(&self, external_id: &str, name: &str) -> Result<Topic> {
        let existing = TopicEntity::find()
            .filter(TopicColumn::ExternalId.eq(external_id))
            .one(self.write_conn())
            .await?;

        if let Some(topic) = existing {
            return Ok(topic);
        }

        let now = chrono::Utc::now();
        let topic = TopicActiveModel {
            id: Set(Uuid::new_v4()),
            external_id: Set(external_id.to_string()),
            name: Set(name.to_string()),
            created_at: Set(now.into()),
        };

        topic.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Link an author to a paper at a byline position, idempotently
    pub async fn link_authorship(
        &self,
        paper_id: Uuid,
        author_id: Uuid,
        author_order: i32,
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO authorships (id, paper_id, author_id, author_order)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (paper_id, author_id) DO UPDATE SET
                author_order = EXCLUDED.author_order
            "#,
            vec![
                Uuid::new_v4().into(),
                paper_id.into(),
                author_id.into(),
                author_order.into(),
            ],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Link a topic to a paper, idempotently
    pub async fn link_paper_topic(&self, paper_id: Uuid, topic_id: Uuid) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO paper_topics (id, paper_id, topic_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (paper_id, topic_id) DO NOTHING
            "#,
            vec![Uuid::new_v4().into(), paper_id.into(), topic_id.into()],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Replace a paper's chunks with freshly embedded ones.
    /// Returns the number of chunks written.
    pub async fn replace_chunks(
        &self,
        paper_id: Uuid,
        chunks: Vec<(i32, String, Vec<f32>)>,
    ) -> Result<usize> {
        let delete = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM chunks WHERE paper_id = $1",
            vec![paper_id.into()],
        );
        self.write_conn().execute(delete).await?;

        let written = chunks.len();

        for (index, content, embedding) in chunks {
            let embedding_str = format_vector(&embedding);

            let stmt = Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                INSERT INTO chunks (id, paper_id, chunk_index, content, embedding, created_at)
                VALUES ($1, $2, $3, $4, $5::vector, NOW())
                "#,
                vec![
                    Uuid::new_v4().into(),
                    paper_id.into(),
                    index.into(),
                    content.into(),
                    embedding_str.into(),
                ],
            );

            self.write_conn().execute(stmt).await?;
        }

        Ok(written)
    }
}
