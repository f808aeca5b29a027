//! Author-level expert ranking
//!
//! Fans the paper-level match set out through authorship edges, then
//! scores each author with a pure function over immutable evidence
//! maps. Every signal is bounded to [0,1]; the blend weights are fixed.
//! Rows below the score floor are dropped, but a non-empty candidate
//! list never ranks to nothing: the floor falls back to the first few
//! sorted rows.

use super::{round4, round6};
use crate::query::OptimizedQuery;
use crate::retrieval::semantic_score;
use chrono::NaiveDate;
use expertscope_common::config::ExpertsConfig;
use expertscope_common::db::PaperAuthorRow;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

const SEMANTIC_WEIGHT: f64 = 0.58;
const PROXIMITY_WEIGHT: f64 = 0.24;
const AUTHORITY_WEIGHT: f64 = 0.12;
const RECENCY_WEIGHT: f64 = 0.06;

const ALIGNMENT_SHARE: f64 = 0.65;
const COVERAGE_SHARE: f64 = 0.35;
const DOMAIN_ALIGNMENT_BOOST: f64 = 1.25;

const RECENCY_WINDOW_DAYS: f64 = 1825.0;
const MIN_VOCAB_TOKEN_LEN: usize = 3;

/// Best chunk distance found for one paper
#[derive(Debug, Clone)]
pub struct PaperMatch {
    pub paper_id: Uuid,
    pub distance: f64,
}

/// Title and date of a matched paper
#[derive(Debug, Clone)]
pub struct PaperSummary {
    pub title: String,
    pub published_date: Option<NaiveDate>,
}

/// Immutable lookups the scorer runs over
#[derive(Debug, Clone, Default)]
pub struct ExpertEvidence {
    pub matches: Vec<PaperMatch>,
    pub papers: HashMap<Uuid, PaperSummary>,
    /// paper_id -> credited authors, ordered by author position
    pub authorships: HashMap<Uuid, Vec<PaperAuthorRow>>,
    /// paper_id -> topic names, ordered
    pub topics: HashMap<Uuid, Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpertScoreBreakdown {
    pub semantic_relevance: f64,
    pub graph_proximity: f64,
    pub query_alignment: f64,
    pub topic_coverage: f64,
    pub citation_authority: f64,
    pub recency_boost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpertPaperRef {
    pub title: String,
    pub published_date: Option<String>,
}

/// One ranked expert in the response payload
#[derive(Debug, Clone, Serialize)]
pub struct ExpertRow {
    pub author_id: Uuid,
    pub name: String,
    pub institution: Option<String>,
    pub score_breakdown: ExpertScoreBreakdown,
    pub top_topics: Vec<String>,
    pub top_papers: Vec<ExpertPaperRef>,
    pub why_ranked: String,
    /// Blended score, used for ordering and the floor filter only
    #[serde(skip)]
    pub score: f64,
}

struct Accumulator {
    author_id: Uuid,
    name: String,
    institution: Option<String>,
    centrality: Option<f64>,
    papers: Vec<ScoredPaper>,
    topic_counts: HashMap<String, usize>,
}

#[derive(Clone)]
struct ScoredPaper {
    paper_id: Uuid,
    title: String,
    published_date: Option<NaiveDate>,
    semantic: f64,
}

/// Rank every author credited on a matched paper.
///
/// Papers fan out in ascending paper-id order and authors accumulate in
/// first-seen order; the final sort is stable on that order, so equal
/// scores keep a deterministic ranking.
pub fn rank_experts(
    evidence: &ExpertEvidence,
    query: &OptimizedQuery,
    config: &ExpertsConfig,
    today: NaiveDate,
) -> Vec<ExpertRow> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut accumulators: HashMap<Uuid, Accumulator> = HashMap::new();

    let mut matches: Vec<&PaperMatch> = evidence.matches.iter().collect();
    matches.sort_by_key(|m| m.paper_id);

    for paper_match in matches {
        let Some(summary) = evidence.papers.get(&paper_match.paper_id) else {
            continue;
        };
        let semantic = semantic_score(paper_match.distance);
        let topic_names: &[String] = evidence
            .topics
            .get(&paper_match.paper_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let Some(authors) = evidence.authorships.get(&paper_match.paper_id) else {
            continue;
        };

        for link in authors {
            let accumulator = accumulators.entry(link.author_id).or_insert_with(|| {
                order.push(link.author_id);
                Accumulator {
                    author_id: link.author_id,
                    name: link.name.clone(),
                    institution: link.institution.clone(),
                    centrality: None,
                    papers: Vec::new(),
                    topic_counts: HashMap::new(),
                }
            });
            if link.centrality_score.is_some() {
                accumulator.centrality = link.centrality_score;
            }
            accumulator.papers.push(ScoredPaper {
                paper_id: paper_match.paper_id,
                title: summary.title.clone(),
                published_date: summary.published_date,
                semantic,
            });
            for name in topic_names {
                *accumulator.topic_counts.entry(name.clone()).or_insert(0) += 1;
            }
        }
    }

    if order.is_empty() {
        return Vec::new();
    }

    let max_centrality = accumulators
        .values()
        .filter_map(|a| a.centrality)
        .fold(0.0_f64, f64::max);

    let mut rows: Vec<ExpertRow> = order
        .iter()
        .filter_map(|author_id| accumulators.remove(author_id))
        .map(|accumulator| score_expert(accumulator, query, config, max_centrality, today))
        .collect();

    rows.sort_by(|a, b| b.score.total_cmp(&a.score));

    if rows.iter().any(|row| row.score >= config.min_score) {
        rows.retain(|row| row.score >= config.min_score);
    } else {
        rows.truncate(config.min_keep);
    }
    rows.truncate(config.top_experts);

    rows
}

fn score_expert(
    accumulator: Accumulator,
    query: &OptimizedQuery,
    config: &ExpertsConfig,
    max_centrality: f64,
    today: NaiveDate,
) -> ExpertRow {
    let mut papers = accumulator.papers;
    papers.sort_by(|a, b| {
        b.semantic
            .total_cmp(&a.semantic)
            .then(date_or_min(b.published_date).cmp(&date_or_min(a.published_date)))
            .then(b.paper_id.cmp(&a.paper_id))
    });
    let kept = &papers[..papers.len().min(config.top_papers)];

    let semantic_relevance = if kept.is_empty() {
        0.0
    } else {
        kept.iter().map(|p| p.semantic).sum::<f64>() / kept.len() as f64
    };

    let vocabulary = build_vocabulary(kept, &accumulator.topic_counts);
    let query_alignment = alignment(&vocabulary, query);
    let topic_coverage = if accumulator.topic_counts.is_empty() {
        0.0
    } else {
        (accumulator.topic_counts.len() as f64 / config.topic_diversity_target as f64).min(1.0)
    };
    let graph_proximity = ALIGNMENT_SHARE * query_alignment + COVERAGE_SHARE * topic_coverage;

    let citation_authority = if !config.enable_centrality {
        0.0
    } else {
        match accumulator.centrality {
            Some(value) if max_centrality > 0.0 => (value / max_centrality).clamp(0.0, 1.0),
            _ => 0.0,
        }
    };

    let recency_boost = recency(kept, today);

    let score = SEMANTIC_WEIGHT * semantic_relevance
        + PROXIMITY_WEIGHT * graph_proximity
        + AUTHORITY_WEIGHT * citation_authority
        + RECENCY_WEIGHT * recency_boost;

    let mut topic_list: Vec<(&String, &usize)> = accumulator.topic_counts.iter().collect();
    topic_list.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    let top_topics: Vec<String> = topic_list
        .into_iter()
        .take(config.top_topics)
        .map(|(name, _)| name.clone())
        .collect();

    let why_ranked = why_ranked(
        kept,
        &top_topics,
        semantic_relevance,
        recency_boost,
        citation_authority,
    );

    let top_papers = kept
        .iter()
        .map(|paper| ExpertPaperRef {
            title: paper.title.clone(),
            published_date: paper.published_date.map(|d| d.to_string()),
        })
        .collect();

    ExpertRow {
        author_id: accumulator.author_id,
        name: accumulator.name,
        institution: accumulator.institution,
        score_breakdown: ExpertScoreBreakdown {
            semantic_relevance: round4(semantic_relevance),
            graph_proximity: round4(graph_proximity),
            query_alignment: round4(query_alignment),
            topic_coverage: round4(topic_coverage),
            citation_authority: round4(citation_authority),
            recency_boost: round4(recency_boost),
        },
        top_topics,
        top_papers,
        why_ranked,
        score: round6(score),
    }
}

fn date_or_min(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or(NaiveDate::MIN)
}

fn build_vocabulary(
    kept: &[ScoredPaper],
    topic_counts: &HashMap<String, usize>,
) -> HashSet<String> {
    let mut vocabulary = HashSet::new();
    for paper in kept {
        collect_tokens(&paper.title, &mut vocabulary);
    }
    for name in topic_counts.keys() {
        collect_tokens(name, &mut vocabulary);
    }
    vocabulary
}

fn collect_tokens(text: &str, into: &mut HashSet<String>) {
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
    {
        if token.len() >= MIN_VOCAB_TOKEN_LEN {
            into.insert(token.to_string());
        }
    }
}

/// Share of expanded query terms present in the author's vocabulary,
/// boosted when a domain term shows up on both sides
fn alignment(vocabulary: &HashSet<String>, query: &OptimizedQuery) -> f64 {
    let overlap = query
        .expanded_terms
        .iter()
        .filter(|term| vocabulary.contains(term.as_str()))
        .count();
    let base = overlap as f64 / query.expanded_terms.len().max(1) as f64;

    let domain_on_both = query
        .domain_terms
        .iter()
        .any(|term| vocabulary.contains(term.as_str()));
    if domain_on_both {
        (base * DOMAIN_ALIGNMENT_BOOST).min(1.0)
    } else {
        base
    }
}

/// Semantic-weighted mean of a linear five-year decay; undated papers
/// contribute zero recency but still weigh into the denominator
fn recency(kept: &[ScoredPaper], today: NaiveDate) -> f64 {
    if kept.is_empty() {
        return 0.0;
    }

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for paper in kept {
        let recency = paper
            .published_date
            .map(|date| {
                let age_days = (today - date).num_days().max(0) as f64;
                (1.0 - age_days / RECENCY_WINDOW_DAYS).max(0.0)
            })
            .unwrap_or(0.0);
        numerator += recency * paper.semantic;
        denominator += paper.semantic;
    }

    if denominator <= 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn why_ranked(
    kept: &[ScoredPaper],
    top_topics: &[String],
    semantic_relevance: f64,
    recency_boost: f64,
    citation_authority: f64,
) -> String {
    let Some(lead) = kept.first() else {
        return "Ranked due to broad author relevance across matched papers.".to_string();
    };

    let semantic_label = if semantic_relevance >= 0.75 {
        "high semantic relevance"
    } else {
        "solid semantic relevance"
    };
    let recency_label = if recency_boost >= 0.50 {
        "recent publications"
    } else {
        "historical publications"
    };

    if top_topics.is_empty() {
        return format!(
            "Ranked for {} via '{}' and {}.",
            semantic_label, lead.title, recency_label
        );
    }

    let centrality_clause = if citation_authority >= 0.20 {
        " and graph centrality strength"
    } else {
        ""
    };
    let sample: Vec<&str> = top_topics.iter().take(2).map(String::as_str).collect();
    format!(
        "Ranked for {} via '{}', {}, and coverage of topics like {}{}.",
        semantic_label,
        lead.title,
        recency_label,
        sample.join(", "),
        centrality_clause
    )
}
