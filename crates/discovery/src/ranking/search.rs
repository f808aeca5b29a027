//! Paper-level rank fusion for search results
//!
//! Blends the semantic distance signal with two graph signals computed
//! over the page's candidate set. Connectivity deliberately only looks
//! at the papers in the current candidate set, not the whole corpus;
//! the signal reads "how connected is this paper within this result",
//! which is what the ordering should reward.

use super::round4;
use crate::graph::PathHint;
use crate::retrieval::semantic_score;
use chrono::NaiveDate;
use expertscope_common::db::{PaperAuthorRow, PaperTopicRow};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use uuid::Uuid;

const SEMANTIC_WEIGHT: f64 = 0.60;
const AUTHORITY_WEIGHT: f64 = 0.25;
const CENTRALITY_WEIGHT: f64 = 0.15;

const SHARED_AUTHOR_WEIGHT: f64 = 1.2;
const SHARED_TOPIC_WEIGHT: f64 = 1.0;
const DIRECT_HIT_BONUS: f64 = 0.25;
const HOP_ONE_BONUS: f64 = 0.18;
const HOP_TWO_BONUS: f64 = 0.10;

/// matched_via label for papers found by the vector scan itself
pub const DIRECT_MATCH: &str = "direct semantic match";

/// One paper entering fusion, with its metadata already loaded
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub paper_id: Uuid,
    pub title: String,
    pub published_date: Option<NaiveDate>,
    /// Best chunk distance; absent for graph discoveries with no
    /// embedded chunk near the query
    pub best_distance: Option<f64>,
    /// How graph expansion reached this paper; None for direct hits
    pub hint: Option<PathHint>,
    pub authors: Vec<PaperAuthorRow>,
    pub topics: Vec<PaperTopicRow>,
    pub snippet: String,
}

impl SearchCandidate {
    fn hop_distance(&self) -> u8 {
        self.hint.as_ref().map(|h| h.hop_distance).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub semantic: f64,
    pub graph_authority: f64,
    pub graph_centrality: f64,
}

/// One row of the fused search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultRow {
    pub paper_id: Uuid,
    pub title: String,
    pub published_date: Option<String>,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub hop_distance: u8,
    pub matched_via: String,
    pub snippet: String,
    pub topics: Vec<String>,
    pub authors: Vec<String>,
}

struct Scored {
    candidate: SearchCandidate,
    semantic: f64,
    authority: f64,
    centrality: f64,
    score: f64,
}

/// Fuse the page's candidate set into ordered result rows.
///
/// Ordering: score desc, semantic desc, hop distance asc, best distance
/// asc with absent distances last, paper id desc. Scores are computed at
/// full precision and rounded to 4 places only for the payload.
pub fn fuse_candidates(candidates: Vec<SearchCandidate>) -> Vec<SearchResultRow> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let author_sets: Vec<HashSet<Uuid>> = candidates
        .iter()
        .map(|c| c.authors.iter().map(|a| a.author_id).collect())
        .collect();
    let topic_sets: Vec<HashSet<Uuid>> = candidates
        .iter()
        .map(|c| c.topics.iter().map(|t| t.topic_id).collect())
        .collect();

    let raw_authority: Vec<f64> = candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| {
            let mut shared_authors = 0usize;
            let mut shared_topics = 0usize;
            for j in 0..candidates.len() {
                if i == j {
                    continue;
                }
                if !author_sets[i].is_disjoint(&author_sets[j]) {
                    shared_authors += 1;
                }
                if !topic_sets[i].is_disjoint(&topic_sets[j]) {
                    shared_topics += 1;
                }
            }

            let hop_bonus = match candidate.hop_distance() {
                0 => DIRECT_HIT_BONUS,
                1 => HOP_ONE_BONUS,
                _ => HOP_TWO_BONUS,
            };

            SHARED_AUTHOR_WEIGHT * shared_authors as f64
                + SHARED_TOPIC_WEIGHT * shared_topics as f64
                + hop_bonus
        })
        .collect();
    let max_authority = raw_authority.iter().copied().fold(0.0_f64, f64::max);

    let centrality_means: Vec<f64> = candidates
        .iter()
        .map(|c| {
            if c.authors.is_empty() {
                return 0.0;
            }
            let total: f64 = c
                .authors
                .iter()
                .map(|a| a.centrality_score.unwrap_or(0.0))
                .sum();
            total / c.authors.len() as f64
        })
        .collect();
    let max_centrality = centrality_means.iter().copied().fold(0.0_f64, f64::max);

    let mut scored: Vec<Scored> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, candidate)| {
            let semantic = candidate
                .best_distance
                .map(semantic_score)
                .unwrap_or(0.0);
            let authority = if max_authority > 0.0 {
                raw_authority[i] / max_authority
            } else {
                0.0
            };
            let centrality = if max_centrality > 0.0 {
                centrality_means[i] / max_centrality
            } else {
                0.0
            };
            let score = SEMANTIC_WEIGHT * semantic
                + AUTHORITY_WEIGHT * authority
                + CENTRALITY_WEIGHT * centrality;

            Scored {
                candidate,
                semantic,
                authority,
                centrality,
                score,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.semantic.total_cmp(&a.semantic))
            .then(a.candidate.hop_distance().cmp(&b.candidate.hop_distance()))
            .then_with(
                || match (a.candidate.best_distance, b.candidate.best_distance) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                },
            )
            .then(b.candidate.paper_id.cmp(&a.candidate.paper_id))
    });

    scored
        .into_iter()
        .map(|entry| {
            let candidate = entry.candidate;
            let matched_via = match &candidate.hint {
                Some(hint) => hint.describe(candidate.paper_id),
                None => DIRECT_MATCH.to_string(),
            };
            let hop_distance = candidate.hop_distance();
            SearchResultRow {
                paper_id: candidate.paper_id,
                title: candidate.title,
                published_date: candidate.published_date.map(|d| d.to_string()),
                score: round4(entry.score),
                score_breakdown: ScoreBreakdown {
                    semantic: round4(entry.semantic),
                    graph_authority: round4(entry.authority),
                    graph_centrality: round4(entry.centrality),
                },
                hop_distance,
                matched_via,
                snippet: candidate.snippet,
                topics: candidate.topics.into_iter().map(|t| t.name).collect(),
                authors: candidate.authors.into_iter().map(|a| a.name).collect(),
            }
        })
        .collect()
}
