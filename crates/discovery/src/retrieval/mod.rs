//! Bounded clearance-aware vector retrieval
//!
//! All scans walk chunks in (cosine distance asc, chunk id asc) order
//! under a hard scan budget, so a degenerate query can never read the
//! whole corpus. Clearance applies while rows stream: a hidden row
//! contributes its count and nothing else.

use async_trait::async_trait;
use expertscope_common::clearance::{level_rank, Clearance};
use expertscope_common::db::{ChunkScanRow, ContextScanRow, Repository};
use expertscope_common::errors::{AppError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Source of distance-ordered chunk batches
#[async_trait]
pub trait ChunkScanSource: Send + Sync {
    /// Batch of the global scan (no clearance filter)
    async fn scan_ranked(
        &self,
        query_vector: &[f32],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ChunkScanRow>>;

    /// Batch of the global scan with chunk text and paper identity
    async fn scan_context(
        &self,
        query_vector: &[f32],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ContextScanRow>>;

    /// Batch of the scan restricted to the given stored levels
    async fn scan_visible(
        &self,
        query_vector: &[f32],
        allowed_levels: &[&str],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ChunkScanRow>>;
}

#[async_trait]
impl ChunkScanSource for Repository {
    async fn scan_ranked(
        &self,
        query_vector: &[f32],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ChunkScanRow>> {
        self.scan_chunks_by_distance(query_vector, offset, limit).await
    }

    async fn scan_context(
        &self,
        query_vector: &[f32],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ContextScanRow>> {
        self.scan_context_chunks_by_distance(query_vector, offset, limit)
            .await
    }

    async fn scan_visible(
        &self,
        query_vector: &[f32],
        allowed_levels: &[&str],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ChunkScanRow>> {
        self.scan_visible_chunks_by_distance(query_vector, allowed_levels, offset, limit)
            .await
    }
}

/// One visible paper found by the ranked scan
#[derive(Debug, Clone, PartialEq)]
pub struct RankedHit {
    pub paper_id: Uuid,
    pub best_distance: f64,
    pub best_chunk_id: Uuid,
}

/// Outcome of a ranked-hit scan
#[derive(Debug, Clone, Default)]
pub struct RankedHits {
    /// Hits sorted by (best distance asc, paper id asc)
    pub hits: Vec<RankedHit>,

    /// Rows hidden by clearance during the scan
    pub redacted_count: usize,
}

/// A chunk the caller is cleared to read
#[derive(Debug, Clone)]
pub struct VisibleChunk {
    pub chunk_id: Uuid,
    pub paper_id: Uuid,
    pub paper_external_id: String,
    pub paper_title: String,
    pub content: String,
    pub distance: f64,
}

/// One position in the answer context, in retrieval order. A redacted
/// slot keeps its position so citation numbering stays stable, but
/// carries nothing from the hidden row.
#[derive(Debug, Clone)]
pub enum ContextSlot {
    Visible(VisibleChunk),
    Redacted,
}

/// Outcome of a top-chunk scan
#[derive(Debug, Clone, Default)]
pub struct ContextWindow {
    pub slots: Vec<ContextSlot>,
    pub redacted_count: usize,
}

/// Budgeted scanner over a chunk source
#[derive(Clone)]
pub struct ChunkRetriever {
    source: Arc<dyn ChunkScanSource>,
    scan_batch_size: usize,
    max_chunk_scan: usize,
}

impl ChunkRetriever {
    pub fn new(
        source: Arc<dyn ChunkScanSource>,
        scan_batch_size: usize,
        max_chunk_scan: usize,
    ) -> Result<Self> {
        if scan_batch_size == 0 {
            return Err(AppError::Configuration {
                message: "scan_batch_size must be greater than 0".to_string(),
            });
        }
        if max_chunk_scan == 0 {
            return Err(AppError::Configuration {
                message: "max_chunk_scan must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            source,
            scan_batch_size,
            max_chunk_scan,
        })
    }

    /// Scan for up to `target_unique` visible papers, tracking the best
    /// chunk per paper. Stops at the target, the scan budget, or the end
    /// of the corpus, whichever comes first.
    pub async fn collect_ranked_hits(
        &self,
        query_vector: &[f32],
        clearance: Clearance,
        target_unique: usize,
    ) -> Result<RankedHits> {
        let mut best_by_paper: HashMap<Uuid, (f64, Uuid)> = HashMap::new();
        let mut redacted_count = 0;
        let mut scanned = 0usize;

        while best_by_paper.len() < target_unique && scanned < self.max_chunk_scan {
            let take = self.scan_batch_size.min(self.max_chunk_scan - scanned);
            let batch = self
                .source
                .scan_ranked(query_vector, scanned as u64, take as u64)
                .await?;
            if batch.is_empty() {
                break;
            }

            scanned += batch.len();

            for row in batch {
                if level_rank(&row.security_level) > clearance.rank() {
                    redacted_count += 1;
                    continue;
                }

                match best_by_paper.get(&row.paper_id) {
                    Some((existing, _)) if row.distance >= *existing => {}
                    _ => {
                        best_by_paper.insert(row.paper_id, (row.distance, row.chunk_id));
                    }
                }
            }
        }

        let mut hits: Vec<RankedHit> = best_by_paper
            .into_iter()
            .map(|(paper_id, (best_distance, best_chunk_id))| RankedHit {
                paper_id,
                best_distance,
                best_chunk_id,
            })
            .collect();
        hits.sort_by(|a, b| {
            a.best_distance
                .total_cmp(&b.best_distance)
                .then(a.paper_id.cmp(&b.paper_id))
        });

        Ok(RankedHits {
            hits,
            redacted_count,
        })
    }

    /// Collect the first `top_k` scan rows in order for answer grounding.
    /// Redacted rows hold their slots.
    pub async fn retrieve_top_chunks(
        &self,
        query_vector: &[f32],
        clearance: Clearance,
        top_k: usize,
    ) -> Result<ContextWindow> {
        let mut window = ContextWindow::default();
        let mut scanned = 0usize;

        'scan: while window.slots.len() < top_k && scanned < self.max_chunk_scan {
            let take = self.scan_batch_size.min(self.max_chunk_scan - scanned);
            let batch = self
                .source
                .scan_context(query_vector, scanned as u64, take as u64)
                .await?;
            if batch.is_empty() {
                break;
            }

            scanned += batch.len();

            for row in batch {
                if level_rank(&row.security_level) > clearance.rank() {
                    window.redacted_count += 1;
                    window.slots.push(ContextSlot::Redacted);
                } else {
                    window.slots.push(ContextSlot::Visible(VisibleChunk {
                        chunk_id: row.chunk_id,
                        paper_id: row.paper_id,
                        paper_external_id: row.paper_external_id,
                        paper_title: row.paper_title,
                        content: row.content,
                        distance: row.distance,
                    }));
                }

                if window.slots.len() >= top_k {
                    break 'scan;
                }
            }
        }

        Ok(window)
    }

    /// Scan the level-filtered ordering for up to `target_unique` papers.
    /// Hidden rows never reach this scan, so nothing is counted.
    pub async fn collect_visible_hits(
        &self,
        query_vector: &[f32],
        clearance: Clearance,
        target_unique: usize,
    ) -> Result<Vec<RankedHit>> {
        let allowed = clearance.allowed_levels();
        let mut best_by_paper: HashMap<Uuid, (f64, Uuid)> = HashMap::new();
        let mut scanned = 0usize;

        while best_by_paper.len() < target_unique && scanned < self.max_chunk_scan {
            let take = self.scan_batch_size.min(self.max_chunk_scan - scanned);
            let batch = self
                .source
                .scan_visible(query_vector, allowed, scanned as u64, take as u64)
                .await?;
            if batch.is_empty() {
                break;
            }

            scanned += batch.len();

            for row in batch {
                match best_by_paper.get(&row.paper_id) {
                    Some((existing, _)) if row.distance >= *existing => {}
                    _ => {
                        best_by_paper.insert(row.paper_id, (row.distance, row.chunk_id));
                    }
                }
            }
        }

        let mut hits: Vec<RankedHit> = best_by_paper
            .into_iter()
            .map(|(paper_id, (best_distance, best_chunk_id))| RankedHit {
                paper_id,
                best_distance,
                best_chunk_id,
            })
            .collect();
        hits.sort_by(|a, b| {
            a.best_distance
                .total_cmp(&b.best_distance)
                .then(a.paper_id.cmp(&b.paper_id))
        });

        Ok(hits)
    }
}

/// Semantic score of a cosine distance
pub fn semantic_score(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Whitespace-normalize chunk text and cut it to a display snippet
pub fn build_snippet(text: &str, max_chars: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    if max_chars <= 3 {
        return normalized.chars().take(max_chars).collect();
    }
    let cut: String = normalized.chars().take(max_chars - 3).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        rows: Vec<ChunkScanRow>,
        context_rows: Vec<ContextScanRow>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(rows: Vec<ChunkScanRow>) -> Self {
            Self {
                rows,
                context_rows: Vec::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn with_context(context_rows: Vec<ContextScanRow>) -> Self {
            Self {
                rows: Vec::new(),
                context_rows,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn slice<T: Clone>(items: &[T], offset: u64, limit: u64) -> Vec<T> {
            items
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl ChunkScanSource for FakeSource {
        async fn scan_ranked(
            &self,
            _query_vector: &[f32],
            offset: u64,
            limit: u64,
        ) -> Result<Vec<ChunkScanRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::slice(&self.rows, offset, limit))
        }

        async fn scan_context(
            &self,
            _query_vector: &[f32],
            offset: u64,
            limit: u64,
        ) -> Result<Vec<ContextScanRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::slice(&self.context_rows, offset, limit))
        }

        async fn scan_visible(
            &self,
            _query_vector: &[f32],
            allowed_levels: &[&str],
            offset: u64,
            limit: u64,
        ) -> Result<Vec<ChunkScanRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let visible: Vec<ChunkScanRow> = self
                .rows
                .iter()
                .filter(|r| allowed_levels.contains(&r.security_level.as_str()))
                .cloned()
                .collect();
            Ok(Self::slice(&visible, offset, limit))
        }
    }

    fn row(chunk: u128, paper: u128, level: &str, distance: f64) -> ChunkScanRow {
        ChunkScanRow {
            chunk_id: Uuid::from_u128(chunk),
            paper_id: Uuid::from_u128(paper),
            security_level: level.to_string(),
            distance,
        }
    }

    fn context_row(chunk: u128, paper: u128, level: &str, distance: f64) -> ContextScanRow {
        ContextScanRow {
            chunk_id: Uuid::from_u128(chunk),
            paper_id: Uuid::from_u128(paper),
            paper_external_id: format!("W{}", paper),
            paper_title: format!("Paper {}", paper),
            security_level: level.to_string(),
            content: format!("Content of chunk {}.", chunk),
            distance,
        }
    }

    fn retriever(source: FakeSource, batch: usize, budget: usize) -> ChunkRetriever {
        ChunkRetriever::new(Arc::new(source), batch, budget).unwrap()
    }

    #[test]
    fn test_constructor_rejects_zero_knobs() {
        let source = Arc::new(FakeSource::new(vec![]));
        assert!(ChunkRetriever::new(source.clone(), 0, 10).is_err());
        assert!(ChunkRetriever::new(source, 10, 0).is_err());
    }

    #[tokio::test]
    async fn test_best_chunk_per_paper() {
        let source = FakeSource::new(vec![
            row(1, 100, "PUBLIC", 0.10),
            row(2, 100, "PUBLIC", 0.05),
            row(3, 200, "PUBLIC", 0.20),
            row(4, 100, "PUBLIC", 0.05),
        ]);
        let retriever = retriever(source, 10, 100);

        let result = retriever
            .collect_ranked_hits(&[0.0; 8], Clearance::Public, 10)
            .await
            .unwrap();

        assert_eq!(result.hits.len(), 2);
        // Paper 100 keeps chunk 2: equal distance from chunk 4 does not
        // replace the earlier winner
        assert_eq!(result.hits[0].paper_id, Uuid::from_u128(100));
        assert_eq!(result.hits[0].best_chunk_id, Uuid::from_u128(2));
        assert_eq!(result.hits[0].best_distance, 0.05);
        assert_eq!(result.hits[1].paper_id, Uuid::from_u128(200));
    }

    #[tokio::test]
    async fn test_redacted_rows_counted_without_leaking() {
        let source = FakeSource::new(vec![
            row(1, 100, "CONFIDENTIAL", 0.01),
            row(2, 200, "PUBLIC", 0.10),
            row(3, 300, "INTERNAL", 0.15),
            row(4, 400, "MYSTERY", 0.20),
        ]);
        let retriever = retriever(source, 10, 100);

        let result = retriever
            .collect_ranked_hits(&[0.0; 8], Clearance::Public, 10)
            .await
            .unwrap();

        // Unknown levels rank confidential, so three rows hide
        assert_eq!(result.redacted_count, 3);
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].paper_id, Uuid::from_u128(200));
    }

    #[tokio::test]
    async fn test_scan_budget_bounds_batches() {
        let rows: Vec<ChunkScanRow> = (0..50)
            .map(|i| row(i as u128 + 1, i as u128 + 1, "CONFIDENTIAL", 0.01 * i as f64))
            .collect();
        let source = FakeSource::new(rows);
        let retriever = ChunkRetriever::new(Arc::new(source), 3, 7).unwrap();

        let result = retriever
            .collect_ranked_hits(&[0.0; 8], Clearance::Public, 100)
            .await
            .unwrap();

        // Budget 7 at batch size 3 issues batches of 3, 3, 1 and stops
        assert_eq!(result.redacted_count, 7);
        assert!(result.hits.is_empty());
    }

    #[tokio::test]
    async fn test_scan_stops_on_empty_batch() {
        let source = FakeSource::new(vec![row(1, 100, "PUBLIC", 0.10)]);
        let retriever = retriever(source, 5, 1000);

        let result = retriever
            .collect_ranked_hits(&[0.0; 8], Clearance::Public, 50)
            .await
            .unwrap();

        assert_eq!(result.hits.len(), 1);
    }

    #[tokio::test]
    async fn test_scan_stops_at_target_unique() {
        let rows: Vec<ChunkScanRow> = (0..30)
            .map(|i| row(i as u128 + 1, i as u128 + 1, "PUBLIC", 0.01 * i as f64))
            .collect();
        let fake = FakeSource::new(rows);
        let retriever = ChunkRetriever::new(Arc::new(fake), 10, 1000).unwrap();

        let result = retriever
            .collect_ranked_hits(&[0.0; 8], Clearance::Public, 5)
            .await
            .unwrap();

        // One batch of 10 already satisfies 5 unique papers
        assert_eq!(result.hits.len(), 10);
    }

    #[tokio::test]
    async fn test_hits_sorted_by_distance_then_id() {
        let source = FakeSource::new(vec![
            row(1, 300, "PUBLIC", 0.10),
            row(2, 100, "PUBLIC", 0.10),
            row(3, 200, "PUBLIC", 0.05),
        ]);
        let retriever = retriever(source, 10, 100);

        let result = retriever
            .collect_ranked_hits(&[0.0; 8], Clearance::Public, 10)
            .await
            .unwrap();

        let order: Vec<Uuid> = result.hits.iter().map(|h| h.paper_id).collect();
        assert_eq!(
            order,
            vec![
                Uuid::from_u128(200),
                Uuid::from_u128(100),
                Uuid::from_u128(300)
            ]
        );
    }

    #[tokio::test]
    async fn test_context_window_keeps_redacted_slots() {
        let source = FakeSource::with_context(vec![
            context_row(1, 100, "PUBLIC", 0.05),
            context_row(2, 200, "CONFIDENTIAL", 0.10),
            context_row(3, 300, "PUBLIC", 0.15),
            context_row(4, 400, "PUBLIC", 0.20),
        ]);
        let retriever = retriever(source, 10, 100);

        let window = retriever
            .retrieve_top_chunks(&[0.0; 8], Clearance::Public, 3)
            .await
            .unwrap();

        assert_eq!(window.slots.len(), 3);
        assert_eq!(window.redacted_count, 1);

        assert!(matches!(window.slots[0], ContextSlot::Visible(_)));
        assert!(matches!(window.slots[1], ContextSlot::Redacted));
        match &window.slots[2] {
            ContextSlot::Visible(chunk) => {
                assert_eq!(chunk.paper_id, Uuid::from_u128(300));
                assert_eq!(chunk.content, "Content of chunk 3.");
            }
            ContextSlot::Redacted => panic!("expected visible slot"),
        }
    }

    #[tokio::test]
    async fn test_context_window_respects_budget() {
        let rows: Vec<ContextScanRow> = (0..20)
            .map(|i| context_row(i as u128 + 1, i as u128 + 1, "PUBLIC", 0.01 * i as f64))
            .collect();
        let source = FakeSource::with_context(rows);
        let retriever = ChunkRetriever::new(Arc::new(source), 4, 6).unwrap();

        let window = retriever
            .retrieve_top_chunks(&[0.0; 8], Clearance::Public, 50)
            .await
            .unwrap();

        assert_eq!(window.slots.len(), 6);
    }

    #[tokio::test]
    async fn test_visible_scan_never_sees_hidden_rows() {
        let source = FakeSource::new(vec![
            row(1, 100, "CONFIDENTIAL", 0.01),
            row(2, 200, "PUBLIC", 0.10),
            row(3, 300, "INTERNAL", 0.15),
        ]);
        let retriever = retriever(source, 10, 100);

        let hits = retriever
            .collect_visible_hits(&[0.0; 8], Clearance::Internal, 10)
            .await
            .unwrap();

        let papers: Vec<Uuid> = hits.iter().map(|h| h.paper_id).collect();
        assert_eq!(papers, vec![Uuid::from_u128(200), Uuid::from_u128(300)]);
    }

    #[test]
    fn test_semantic_score() {
        assert_eq!(semantic_score(0.0), 1.0);
        assert_eq!(semantic_score(1.0), 0.5);
        // Negative distances clamp to zero
        assert_eq!(semantic_score(-0.5), 1.0);
    }

    #[test]
    fn test_build_snippet() {
        assert_eq!(build_snippet("short  text", 220), "short text");
        assert_eq!(build_snippet("  spaced\n\nout \t words ", 220), "spaced out words");

        let long = "a".repeat(30);
        let snippet = build_snippet(&long, 10);
        assert_eq!(snippet, format!("{}...", "a".repeat(7)));

        assert_eq!(build_snippet("abcdef", 3), "abc");
        assert_eq!(build_snippet("", 220), "");
    }

    #[tokio::test]
    async fn test_batch_call_accounting() {
        let rows: Vec<ChunkScanRow> = (0..9)
            .map(|i| row(i as u128 + 1, 1, "PUBLIC", 0.01))
            .collect();
        let fake = FakeSource::new(rows);
        let calls_probe = Arc::new(fake);
        let retriever =
            ChunkRetriever::new(calls_probe.clone() as Arc<dyn ChunkScanSource>, 3, 9).unwrap();

        // Single paper never reaches target 2, so the loop drains the
        // budget: exactly ceil(9 / 3) = 3 batches
        let result = retriever
            .collect_ranked_hits(&[0.0; 8], Clearance::Public, 2)
            .await
            .unwrap();

        assert_eq!(result.hits.len(), 1);
        assert_eq!(calls_probe.calls(), 3);
    }
}
