//! Answer synthesis over retrieved context
//!
//! Provides:
//! - Citation building over the context window (redacted slots keep
//!   their number and expose nothing else)
//! - The LLM answer path with strict JSON parsing and one correction
//!   retry
//! - The deterministic extractive fallback that grounds an answer in
//!   the best retrieved sentences
//! - Payload normalization so every path yields the same shape
//!
//! Synthesis never fails a request: any LLM problem degrades to the
//! extractive path.

use crate::retrieval::{semantic_score, ContextSlot, ContextWindow, VisibleChunk};
use expertscope_common::errors::{AppError, Result};
use expertscope_common::llm::{ContextRecord, LlmClient, LlmError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

const CORRECTION_PROMPT: &str = "Your previous answer was invalid JSON. Return ONLY valid JSON \
with keys: answer, key_points, evidence_used, confidence, limitations.";

const NO_CONTEXT_ANSWER: &str = "Evidence is weak: no accessible chunks were found for this \
query at your current clearance level.";
const NO_CONTEXT_KEY_POINT: &str = "No accessible evidence could be retrieved.";
const NO_CONTEXT_LIMITATIONS: &str = "No accessible chunks were available, so the summary could \
not reference specific source passages.";

const DEFAULT_ANSWER: &str = "Evidence is weak. No concise answer was returned.";
const DEFAULT_KEY_POINT: &str = "No key points were returned.";
const DEFAULT_LIMITATIONS: &str = "Response quality depends on the retrieved chunk coverage and \
ranking quality.";
const BACKFILL_REASON: &str = "Retrieved as accessible supporting evidence.";

const EXTRACTIVE_REASON: &str = "Top similarity chunk selected for extractive grounding.";
const EXTRACTIVE_LIMITATIONS: &str = "Deterministic extractive mode was used, so output quality \
is bounded by retrieved chunk coverage.";
const GROUNDING_TAIL: &str = "This summary is grounded in the highest-similarity retrieved \
chunks.";
const LEAD_FALLBACK: &str = "The answer is grounded in the highest-similarity retrieved chunks.";
const LIMITED_PREFIX: &str = "Evidence is limited. ";

const SENTENCE_OVERLAP_WEIGHT: f64 = 0.2;
const MIN_TOKEN_LEN: usize = 3;
const LEAD_SNIPPET_CHARS: usize = 220;

/// One numbered source reference in the ask response
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub id: usize,
    pub paper_title: String,
    pub reference: String,
    pub chunk_id: Option<Uuid>,
    pub redacted: bool,
}

/// A visible chunk paired with its citation number
#[derive(Debug, Clone)]
pub struct CitedChunk {
    pub citation_id: usize,
    pub chunk: VisibleChunk,
}

/// One evidence row inside the answer payload
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EvidenceRef {
    pub source: String,
    pub reason: String,
}

/// Normalized answer, identical in shape across all synthesis paths
#[derive(Debug, Clone, Serialize)]
pub struct AnswerPayload {
    pub answer: String,
    pub key_points: Vec<String>,
    pub evidence_used: Vec<EvidenceRef>,
    pub confidence: String,
    pub limitations: String,
}

/// Which path produced the answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerMode {
    NoContext,
    Llm,
    Extractive,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerMode::NoContext => "no_context",
            AnswerMode::Llm => "llm",
            AnswerMode::Extractive => "extractive",
        }
    }
}

/// Number the context window: every slot gets a 1-based citation in
/// retrieval order, and hidden slots surface only their number.
pub fn build_citations(window: &ContextWindow) -> (Vec<Citation>, Vec<CitedChunk>) {
    let mut citations = Vec::with_capacity(window.slots.len());
    let mut visible = Vec::new();

    for (index, slot) in window.slots.iter().enumerate() {
        let id = index + 1;
        match slot {
            ContextSlot::Redacted => citations.push(Citation {
                id,
                paper_title: "[REDACTED]".to_string(),
                reference: format!("redacted:{}", id),
                chunk_id: None,
                redacted: true,
            }),
            ContextSlot::Visible(chunk) => {
                citations.push(Citation {
                    id,
                    paper_title: chunk.paper_title.clone(),
                    reference: chunk.paper_external_id.clone(),
                    chunk_id: Some(chunk.chunk_id),
                    redacted: false,
                });
                visible.push(CitedChunk {
                    citation_id: id,
                    chunk: chunk.clone(),
                });
            }
        }
    }

    (citations, visible)
}

enum LlmAttemptError {
    Client(LlmError),
    InvalidJson,
}

impl From<LlmError> for LlmAttemptError {
    fn from(error: LlmError) -> Self {
        LlmAttemptError::Client(error)
    }
}

impl LlmAttemptError {
    fn code(&self) -> &'static str {
        match self {
            LlmAttemptError::Client(error) => error.code(),
            LlmAttemptError::InvalidJson => "invalid_json",
        }
    }
}

/// Answer generator with an LLM front and a deterministic back
pub struct AnswerSynthesizer {
    llm: Option<LlmClient>,
    fallback_sentence_count: usize,
}

impl AnswerSynthesizer {
    pub fn new(llm: Option<LlmClient>, fallback_sentence_count: usize) -> Result<Self> {
        if fallback_sentence_count == 0 {
            return Err(AppError::Configuration {
                message: "fallback_sentence_count must be greater than 0".to_string(),
            });
        }
        Ok(Self {
            llm,
            fallback_sentence_count,
        })
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Produce an answer for the query over already-redacted context.
    /// Never fails: LLM problems degrade to the extractive path.
    pub async fn synthesize(&self, query: &str, context: &[CitedChunk]) -> (AnswerPayload, AnswerMode) {
        if context.is_empty() {
            return (no_context_payload(), AnswerMode::NoContext);
        }

        if let Some(client) = &self.llm {
            match self.llm_answer(client, query, context).await {
                Ok(payload) => return (payload, AnswerMode::Llm),
                Err(error) => {
                    tracing::warn!(
                        code = error.code(),
                        "LLM answer failed, using extractive fallback"
                    );
                }
            }
        }

        (self.extractive_answer(query, context), AnswerMode::Extractive)
    }

    async fn llm_answer(
        &self,
        client: &LlmClient,
        query: &str,
        context: &[CitedChunk],
    ) -> std::result::Result<AnswerPayload, LlmAttemptError> {
        let records: Vec<ContextRecord> = context
            .iter()
            .map(|cited| ContextRecord {
                citation_id: cited.citation_id.to_string(),
                source: cited.chunk.paper_external_id.clone(),
                paper_title: cited.chunk.paper_title.clone(),
                chunk_text: cited.chunk.content.clone(),
            })
            .collect();

        let raw = client.generate(query, &records, None).await?;
        if let Some(parsed) = parse_llm_json(&raw) {
            return Ok(normalize_answer_payload(parsed, context));
        }

        let corrected = client.generate(query, &records, Some(CORRECTION_PROMPT)).await?;
        match parse_llm_json(&corrected) {
            Some(parsed) => Ok(normalize_answer_payload(parsed, context)),
            None => Err(LlmAttemptError::InvalidJson),
        }
    }

    fn extractive_answer(&self, query: &str, context: &[CitedChunk]) -> AnswerPayload {
        let query_terms = tokenize(query);

        struct Candidate {
            score: f64,
            citation_id: usize,
            sentence_index: usize,
            text: String,
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        for cited in context {
            let chunk_relevance = semantic_score(cited.chunk.distance);
            for (sentence_index, sentence) in
                split_sentences(&cited.chunk.content).into_iter().enumerate()
            {
                let overlap = tokenize(&sentence).intersection(&query_terms).count();
                candidates.push(Candidate {
                    score: chunk_relevance + SENTENCE_OVERLAP_WEIGHT * overlap as f64,
                    citation_id: cited.citation_id,
                    sentence_index,
                    text: sentence.trim().to_string(),
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.citation_id.cmp(&b.citation_id))
                .then(a.sentence_index.cmp(&b.sentence_index))
                .then_with(|| a.text.cmp(&b.text))
        });

        let mut selected: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for candidate in candidates {
            if candidate.text.is_empty() || !seen.insert(candidate.text.clone()) {
                continue;
            }
            selected.push(format!("{} [{}]", candidate.text, candidate.citation_id));
            if selected.len() >= self.fallback_sentence_count {
                break;
            }
        }

        if selected.is_empty() {
            if let Some(first) = context.first() {
                let normalized = first
                    .chunk
                    .content
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                let snippet: String = normalized.chars().take(LEAD_SNIPPET_CHARS).collect();
                selected.push(format!("{} [{}]", snippet.trim_end(), first.citation_id));
            }
        }

        let marker = regex_lite::Regex::new(r"\s*\[\d+\]\s*$").unwrap();
        let lead = selected
            .first()
            .map(|sentence| {
                marker
                    .replace(sentence, "")
                    .trim()
                    .trim_end_matches(['.', '!', '?'])
                    .to_string()
            })
            .unwrap_or_default();
        let mut answer = if lead.is_empty() {
            LEAD_FALLBACK.to_string()
        } else {
            format!("{}. {}", lead, GROUNDING_TAIL)
        };
        if context.len() <= 1 {
            answer = format!("{}{}", LIMITED_PREFIX, answer);
        }

        let evidence_used = context
            .iter()
            .map(|cited| EvidenceRef {
                source: format!("[{}] {}", cited.citation_id, cited.chunk.paper_external_id),
                reason: EXTRACTIVE_REASON.to_string(),
            })
            .collect();

        AnswerPayload {
            answer,
            key_points: selected,
            evidence_used,
            confidence: if context.len() >= 2 { "medium" } else { "low" }.to_string(),
            limitations: EXTRACTIVE_LIMITATIONS.to_string(),
        }
    }
}

fn no_context_payload() -> AnswerPayload {
    AnswerPayload {
        answer: NO_CONTEXT_ANSWER.to_string(),
        key_points: vec![NO_CONTEXT_KEY_POINT.to_string()],
        evidence_used: Vec::new(),
        confidence: "low".to_string(),
        limitations: NO_CONTEXT_LIMITATIONS.to_string(),
    }
}

/// Parse an LLM reply as a JSON object: direct parse first, then the
/// outermost `{...}` block of the text. Anything that is not an object
/// is a parse failure.
fn parse_llm_json(raw: &str) -> Option<Map<String, Value>> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return None;
    }

    let parsed: Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(_) => {
            let start = candidate.find('{')?;
            let end = candidate.rfind('}')?;
            if end < start {
                return None;
            }
            serde_json::from_str(&candidate[start..=end]).ok()?
        }
    };

    match parsed {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Force any parsed LLM object into the answer shape, backfilling every
/// missing or malformed field with a safe default.
fn normalize_answer_payload(payload: Map<String, Value>, context: &[CitedChunk]) -> AnswerPayload {
    let answer = match payload.get("answer") {
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        _ => DEFAULT_ANSWER.to_string(),
    };

    let mut key_points: Vec<String> = match payload.get("key_points") {
        Some(Value::Array(items)) => items
            .iter()
            .map(value_to_text)
            .filter(|text| !text.is_empty())
            .collect(),
        _ => Vec::new(),
    };
    if key_points.is_empty() {
        key_points = vec![DEFAULT_KEY_POINT.to_string()];
    }

    let mut evidence_used: Vec<EvidenceRef> = Vec::new();
    if let Some(Value::Array(items)) = payload.get("evidence_used") {
        for item in items {
            let Value::Object(entry) = item else {
                continue;
            };
            let reason = entry.get("reason").map(value_to_text).unwrap_or_default();
            if reason.is_empty() {
                continue;
            }
            let source = entry.get("source").map(value_to_text).unwrap_or_default();
            evidence_used.push(EvidenceRef {
                source: if source.is_empty() {
                    "unknown source".to_string()
                } else {
                    source
                },
                reason,
            });
        }
    }
    if evidence_used.is_empty() {
        evidence_used = context
            .iter()
            .take(2)
            .map(|cited| EvidenceRef {
                source: format!("[{}] {}", cited.citation_id, cited.chunk.paper_external_id),
                reason: BACKFILL_REASON.to_string(),
            })
            .collect();
    }

    let confidence_raw = payload
        .get("confidence")
        .map(value_to_text)
        .unwrap_or_default()
        .to_lowercase();
    let confidence = match confidence_raw.as_str() {
        "high" | "medium" | "low" => confidence_raw,
        _ => "medium".to_string(),
    };

    let limitations = match payload.get("limitations") {
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        _ => DEFAULT_LIMITATIONS.to_string(),
    };

    AnswerPayload {
        answer,
        key_points,
        evidence_used,
        confidence,
        limitations,
    }
}

/// Split whitespace-normalized text after `.`, `!` or `?` followed by
/// whitespace; the terminator stays with its sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = normalized.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|next| next.is_whitespace()) {
            while chars.peek().is_some_and(|next| next.is_whitespace()) {
                chars.next();
            }
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }

    sentences
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(id: u128, paper: u128, content: &str, distance: f64) -> VisibleChunk {
        VisibleChunk {
            chunk_id: Uuid::from_u128(id),
            paper_id: Uuid::from_u128(paper),
            paper_external_id: format!("W{}", paper),
            paper_title: format!("Paper {}", paper),
            content: content.to_string(),
            distance,
        }
    }

    fn cited(citation_id: usize, chunk: VisibleChunk) -> CitedChunk {
        CitedChunk { citation_id, chunk }
    }

    fn synthesizer(fallback_sentences: usize) -> AnswerSynthesizer {
        AnswerSynthesizer::new(None, fallback_sentences).unwrap()
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_constructor_rejects_zero_sentence_count() {
        assert!(AnswerSynthesizer::new(None, 0).is_err());
    }

    #[test]
    fn test_citations_number_slots_in_order() {
        let window = ContextWindow {
            slots: vec![
                ContextSlot::Visible(chunk(1, 100, "First chunk.", 0.1)),
                ContextSlot::Redacted,
                ContextSlot::Visible(chunk(2, 200, "Third chunk.", 0.2)),
            ],
            redacted_count: 1,
        };

        let (citations, visible) = build_citations(&window);

        assert_eq!(citations.len(), 3);
        assert_eq!(citations[0].id, 1);
        assert_eq!(citations[0].reference, "W100");
        assert!(!citations[0].redacted);

        assert_eq!(citations[1].id, 2);
        assert_eq!(citations[1].paper_title, "[REDACTED]");
        assert_eq!(citations[1].reference, "redacted:2");
        assert_eq!(citations[1].chunk_id, None);
        assert!(citations[1].redacted);

        // Visible context keeps the original numbering
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].citation_id, 1);
        assert_eq!(visible[1].citation_id, 3);
    }

    #[tokio::test]
    async fn test_no_context_payload_skips_llm() {
        let (payload, mode) = synthesizer(3).synthesize("anything", &[]).await;

        assert_eq!(mode, AnswerMode::NoContext);
        assert_eq!(payload.answer, NO_CONTEXT_ANSWER);
        assert_eq!(payload.key_points, vec![NO_CONTEXT_KEY_POINT.to_string()]);
        assert!(payload.evidence_used.is_empty());
        assert_eq!(payload.confidence, "low");
    }

    #[tokio::test]
    async fn test_extractive_answer_selects_overlapping_sentences() {
        let context = vec![
            cited(
                1,
                chunk(
                    1,
                    100,
                    "Network slicing enables isolation. Unrelated filler trails here.",
                    0.0,
                ),
            ),
            cited(2, chunk(2, 200, "Slicing policy controls the network core.", 0.5)),
        ];

        let (payload, mode) = synthesizer(2).synthesize("network slicing", &context).await;

        assert_eq!(mode, AnswerMode::Extractive);
        // Two query-term overlaps on the first sentence dominate
        assert_eq!(
            payload.key_points[0],
            "Network slicing enables isolation. [1]"
        );
        assert_eq!(payload.key_points.len(), 2);
        assert_eq!(
            payload.answer,
            format!("Network slicing enables isolation. {}", GROUNDING_TAIL)
        );
        assert_eq!(payload.confidence, "medium");
        assert_eq!(
            payload.evidence_used[0],
            EvidenceRef {
                source: "[1] W100".to_string(),
                reason: EXTRACTIVE_REASON.to_string(),
            }
        );
        assert_eq!(payload.limitations, EXTRACTIVE_LIMITATIONS);
    }

    #[tokio::test]
    async fn test_single_source_gets_limited_prefix_and_low_confidence() {
        let context = vec![cited(1, chunk(1, 100, "Only one sentence here.", 0.1))];

        let (payload, _) = synthesizer(3).synthesize("query", &context).await;

        assert!(payload.answer.starts_with(LIMITED_PREFIX));
        assert_eq!(payload.confidence, "low");
    }

    #[tokio::test]
    async fn test_duplicate_sentences_deduplicated() {
        let context = vec![
            cited(1, chunk(1, 100, "Same sentence everywhere.", 0.0)),
            cited(2, chunk(2, 200, "Same sentence everywhere.", 0.0)),
            cited(3, chunk(3, 300, "A different closer.", 0.0)),
        ];

        let (payload, _) = synthesizer(5).synthesize("query", &context).await;

        // The duplicate keeps only its first citation
        assert_eq!(
            payload.key_points,
            vec![
                "Same sentence everywhere. [1]".to_string(),
                "A different closer. [3]".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_sentences_ranked_before_truncation() {
        let context = vec![
            cited(1, chunk(1, 100, "Far noise one. Far noise two.", 2.0)),
            cited(2, chunk(2, 200, "Close evidence wins.", 0.0)),
        ];

        let (payload, _) = synthesizer(1).synthesize("query", &context).await;

        assert_eq!(payload.key_points, vec!["Close evidence wins. [2]".to_string()]);
    }

    #[tokio::test]
    async fn test_no_terminator_keeps_whole_chunk_as_one_sentence() {
        let long_word = "x".repeat(400);
        let context = vec![cited(1, chunk(1, 100, &long_word, 0.0))];

        let (payload, _) = synthesizer(3).synthesize("query", &context).await;

        let expected = format!("{} [1]", "x".repeat(400));
        assert_eq!(payload.key_points, vec![expected]);
    }

    #[tokio::test]
    async fn test_empty_content_falls_back_to_grounding_lead() {
        let context = vec![cited(1, chunk(1, 100, "   ", 0.0))];

        let (payload, _) = synthesizer(3).synthesize("query", &context).await;

        assert_eq!(payload.answer, format!("{}{}", LIMITED_PREFIX, LEAD_FALLBACK));
    }

    #[test]
    fn test_parse_llm_json_direct_and_embedded() {
        assert!(parse_llm_json("").is_none());
        assert!(parse_llm_json("not json at all").is_none());
        assert!(parse_llm_json("[1, 2, 3]").is_none());

        let direct = parse_llm_json(r#"{"answer": "yes"}"#).unwrap();
        assert_eq!(direct.get("answer"), Some(&json!("yes")));

        let embedded = parse_llm_json("Sure! Here it is: {\"answer\": \"ok\"} hope that helps")
            .unwrap();
        assert_eq!(embedded.get("answer"), Some(&json!("ok")));

        assert!(parse_llm_json("prefix } { suffix").is_none());
    }

    #[test]
    fn test_normalize_fills_all_defaults() {
        let context = vec![
            cited(1, chunk(1, 100, "text", 0.1)),
            cited(2, chunk(2, 200, "text", 0.2)),
            cited(3, chunk(3, 300, "text", 0.3)),
        ];

        let payload = normalize_answer_payload(object(json!({})), &context);

        assert_eq!(payload.answer, DEFAULT_ANSWER);
        assert_eq!(payload.key_points, vec![DEFAULT_KEY_POINT.to_string()]);
        // Backfill uses only the first two citations
        assert_eq!(
            payload.evidence_used,
            vec![
                EvidenceRef {
                    source: "[1] W100".to_string(),
                    reason: BACKFILL_REASON.to_string(),
                },
                EvidenceRef {
                    source: "[2] W200".to_string(),
                    reason: BACKFILL_REASON.to_string(),
                },
            ]
        );
        assert_eq!(payload.confidence, "medium");
        assert_eq!(payload.limitations, DEFAULT_LIMITATIONS);
    }

    #[test]
    fn test_normalize_keeps_valid_fields() {
        let parsed = object(json!({
            "answer": "  Slicing isolates tenants.  ",
            "key_points": ["First point", "", 42],
            "evidence_used": [
                {"source": "W1", "reason": "cited"},
                {"source": "", "reason": "also cited"},
                {"source": "W3", "reason": ""},
                "not an object"
            ],
            "confidence": "HIGH",
            "limitations": "Sparse corpus."
        }));

        let payload = normalize_answer_payload(parsed, &[]);

        assert_eq!(payload.answer, "Slicing isolates tenants.");
        assert_eq!(payload.key_points, vec!["First point".to_string(), "42".to_string()]);
        assert_eq!(
            payload.evidence_used,
            vec![
                EvidenceRef {
                    source: "W1".to_string(),
                    reason: "cited".to_string(),
                },
                EvidenceRef {
                    source: "unknown source".to_string(),
                    reason: "also cited".to_string(),
                },
            ]
        );
        assert_eq!(payload.confidence, "high");
        assert_eq!(payload.limitations, "Sparse corpus.");
    }

    #[test]
    fn test_normalize_rejects_unknown_confidence() {
        let payload = normalize_answer_payload(object(json!({"confidence": "certain"})), &[]);
        assert_eq!(payload.confidence, "medium");
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One sentence. Two sentences! Three? Four"),
            vec!["One sentence.", "Two sentences!", "Three?", "Four"]
        );
        assert_eq!(split_sentences("No terminator at all"), vec!["No terminator at all"]);
        // A terminator with no following whitespace does not split
        assert_eq!(split_sentences("v1.2 release"), vec!["v1.2 release"]);
        assert_eq!(
            split_sentences("  spaced \n out.  next  "),
            vec!["spaced out.", "next"]
        );
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_tokenize_drops_short_tokens() {
        let tokens = tokenize("A 5G RAN slice, or two!");
        assert!(tokens.contains("ran"));
        assert!(tokens.contains("slice"));
        assert!(tokens.contains("two"));
        assert!(!tokens.contains("5g"));
        assert!(!tokens.contains("a"));
        assert!(!tokens.contains("or"));
    }
}
