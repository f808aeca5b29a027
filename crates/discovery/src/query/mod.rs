//! Query optimization for telecom research discovery
//!
//! Normalizes free-text queries and expands them with a fixed domain
//! vocabulary so that retrieval text stays stable across phrasings.
//! Pure and deterministic; never fails.

use serde::{Deserialize, Serialize};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "does", "for", "from", "how", "i",
    "in", "into", "is", "it", "of", "on", "or", "our", "that", "the", "their", "this", "to",
    "using", "we", "what", "when", "where", "which", "who", "with",
];

const NOISE_TOKENS: &[&str] = &[
    "demo", "please", "thanks", "thank", "question", "answer", "show", "tell", "about",
];

const DOMAIN_KEYWORDS: &[&str] = &[
    "5g",
    "6g",
    "ran",
    "oran",
    "ric",
    "xapp",
    "xapps",
    "network",
    "networks",
    "slicing",
    "slice",
    "orchestration",
    "telecom",
    "telecommunications",
    "wireless",
    "radio",
    "edge",
    "mimo",
];

fn synonyms(term: &str) -> &'static [&'static str] {
    match term {
        "5g" => &["ran", "radio", "wireless"],
        "6g" => &["ran", "radio", "wireless"],
        "ran" => &["radio", "ric", "xapp"],
        "oran" => &["o", "ran", "ric", "xapp"],
        "ric" => &["xapp", "orchestration"],
        "xapp" => &["xapps", "ric"],
        "network" => &["telecom", "wireless"],
        "networks" => &["telecom", "wireless"],
        "slicing" => &["slice", "orchestration"],
        "slice" => &["slicing", "orchestration"],
        "orchestration" => &["automation", "scheduling"],
        "federated" => &["distributed", "learning"],
        "optimization" => &["optimisation", "scheduling"],
        "anomaly" => &["detection", "monitoring"],
        "telecom" => &["telecommunications", "network"],
        "radio" => &["ran", "wireless"],
        _ => &[],
    }
}

/// Optimized form of a raw query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedQuery {
    /// Trimmed raw input
    pub original_query: String,

    /// Base terms joined with spaces
    pub normalized_query: String,

    /// Expanded terms joined with spaces
    pub optimized_query: String,

    /// Content tokens after stopword and noise removal
    pub base_terms: Vec<String>,

    /// Base terms plus domain synonyms
    pub expanded_terms: Vec<String>,

    /// Base terms that are domain keywords
    pub domain_terms: Vec<String>,
}

impl OptimizedQuery {
    /// Text handed to the embedding backend: expanded terms when any
    /// survived, else the normalized form, else the raw query.
    pub fn retrieval_text(&self) -> &str {
        if !self.optimized_query.is_empty() {
            &self.optimized_query
        } else if !self.normalized_query.is_empty() {
            &self.normalized_query
        } else {
            &self.original_query
        }
    }
}

/// Deterministic query optimizer over the domain vocabulary
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryOptimizer;

impl QueryOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Optimize a raw query
    pub fn optimize(&self, raw: &str) -> OptimizedQuery {
        let original_query = raw.trim().to_string();
        let lowered = original_query.to_lowercase();
        let raw_tokens = tokenize(&lowered);

        let mut base_terms: Vec<&str> = raw_tokens
            .iter()
            .map(String::as_str)
            .filter(|t| is_content_token(t) && !STOPWORDS.contains(t) && !NOISE_TOKENS.contains(t))
            .collect();
        if base_terms.is_empty() {
            base_terms = raw_tokens
                .iter()
                .map(String::as_str)
                .filter(|t| is_content_token(t))
                .collect();
        }

        let base_terms = dedupe_preserve_order(base_terms);
        let domain_terms: Vec<&str> = base_terms
            .iter()
            .copied()
            .filter(|t| DOMAIN_KEYWORDS.contains(t))
            .collect();

        let mut expanded_terms: Vec<&str> = base_terms.clone();
        for term in &base_terms {
            for &synonym in synonyms(term) {
                if is_content_token(synonym) {
                    expanded_terms.push(synonym);
                }
            }
        }
        for domain_term in &domain_terms {
            for &synonym in synonyms(domain_term) {
                if is_content_token(synonym) {
                    expanded_terms.push(synonym);
                }
            }
        }

        let expanded_terms = dedupe_preserve_order(expanded_terms);
        let normalized_query = base_terms.join(" ");
        let optimized_query = expanded_terms.join(" ");

        OptimizedQuery {
            original_query,
            normalized_query,
            optimized_query,
            base_terms: base_terms.into_iter().map(str::to_string).collect(),
            expanded_terms: expanded_terms.into_iter().map(str::to_string).collect(),
            domain_terms: dedupe_preserve_order(domain_terms)
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Whether a lowercased token belongs to the domain vocabulary
pub(crate) fn is_domain_term(token: &str) -> bool {
    DOMAIN_KEYWORDS.contains(&token)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_content_token(token: &str) -> bool {
    token.len() >= 2 && !token.chars().all(|c| c.is_ascii_digit())
}

fn dedupe_preserve_order<'a>(values: Vec<&'a str>) -> Vec<&'a str> {
    let mut seen = std::collections::HashSet::new();
    values.into_iter().filter(|v| seen.insert(*v)).collect()
}
