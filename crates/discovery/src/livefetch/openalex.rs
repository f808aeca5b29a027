//! OpenAlex works client
//!
//! Fetches work metadata from the OpenAlex API and normalizes the raw
//! payloads into the import records the read-through consumes. The
//! abstract arrives as an inverted index and is rebuilt into text here.

use async_trait::async_trait;
use chrono::NaiveDate;
use expertscope_common::config::LiveFetchConfig;
use expertscope_common::errors::{AppError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const USER_AGENT: &str = "expertscope/0.1";
const WORK_SELECT_FIELDS: &str =
    "id,display_name,publication_date,abstract_inverted_index,authorships,concepts";
const MAX_TOPICS_PER_WORK: usize = 8;
const MAX_ABSTRACT_POSITION: i64 = 50_000;

/// A normalized work ready for import
#[derive(Debug, Clone)]
pub struct WorkRecord {
    pub external_id: String,
    pub title: String,
    pub abstract_text: String,
    pub published_date: Option<NaiveDate>,
    pub authors: Vec<AuthorRecord>,
    pub topics: Vec<TopicRecord>,
}

#[derive(Debug, Clone)]
pub struct AuthorRecord {
    pub external_id: String,
    pub name: String,
    pub institution: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TopicRecord {
    pub external_id: String,
    pub name: String,
}

/// External works API used by the read-through backfill
#[async_trait]
pub trait WorkSource: Send + Sync {
    async fn fetch_works(&self, query: &str, limit: usize) -> Result<Vec<WorkRecord>>;
}

#[derive(Deserialize)]
struct WorksPage {
    #[serde(default)]
    results: Vec<RawWork>,
}

#[derive(Deserialize)]
struct RawWork {
    id: Option<String>,
    display_name: Option<String>,
    publication_date: Option<String>,
    // BTreeMap keeps position conflicts deterministic
    abstract_inverted_index: Option<BTreeMap<String, Vec<i64>>>,
    #[serde(default)]
    authorships: Vec<RawAuthorship>,
    #[serde(default)]
    concepts: Vec<RawConcept>,
}

#[derive(Deserialize)]
struct RawAuthorship {
    author: Option<RawAuthor>,
    #[serde(default)]
    institutions: Vec<RawInstitution>,
}

#[derive(Deserialize)]
struct RawAuthor {
    id: Option<String>,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct RawInstitution {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct RawConcept {
    id: Option<String>,
    display_name: Option<String>,
}

/// OpenAlex-backed work source
pub struct OpenAlexSource {
    client: reqwest::Client,
    base_url: String,
    mailto: String,
}

impl OpenAlexSource {
    /// Build the source when a contact address is configured; the API
    /// asks for one on every request.
    pub fn from_config(config: &LiveFetchConfig) -> Result<Option<Self>> {
        let Some(mailto) = config
            .mailto
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
        else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Some(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            mailto: mailto.to_string(),
        }))
    }
}

#[async_trait]
impl WorkSource for OpenAlexSource {
    async fn fetch_works(&self, query: &str, limit: usize) -> Result<Vec<WorkRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let url = format!("{}/works", self.base_url);
        let params = [
            ("search", query.to_string()),
            ("per-page", limit.to_string()),
            ("select", WORK_SELECT_FIELDS.to_string()),
            ("mailto", self.mailto.clone()),
        ];
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .query(&params)
            .send()
            .await
            .map_err(|e| AppError::LiveFetchError {
                message: format!("Works request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LiveFetchError {
                message: format!("Works API error {}: {}", status, body),
            });
        }

        let page: WorksPage = response.json().await.map_err(|e| AppError::LiveFetchError {
            message: format!("Failed to parse works payload: {}", e),
        })?;

        Ok(page
            .results
            .into_iter()
            .filter_map(normalize_work)
            .take(limit)
            .collect())
    }
}

/// Turn a raw work into an import record; works without an id are
/// dropped.
fn normalize_work(raw: RawWork) -> Option<WorkRecord> {
    let external_id = non_empty(raw.id)?;
    let title = non_empty(raw.display_name).unwrap_or_else(|| "Untitled".to_string());
    let abstract_text = raw
        .abstract_inverted_index
        .map(|index| decode_abstract(&index))
        .unwrap_or_default();
    let published_date = raw
        .publication_date
        .as_deref()
        .and_then(|value| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok());

    let authors = raw
        .authorships
        .into_iter()
        .filter_map(|authorship| {
            let author = authorship.author?;
            let external_id = non_empty(author.id)?;
            let institution = authorship
                .institutions
                .into_iter()
                .next()
                .and_then(|inst| non_empty(inst.display_name));
            Some(AuthorRecord {
                external_id,
                name: non_empty(author.display_name).unwrap_or_else(|| "Unknown".to_string()),
                institution,
            })
        })
        .collect();

    let topics = raw
        .concepts
        .into_iter()
        .filter_map(|concept| {
            Some(TopicRecord {
                external_id: non_empty(concept.id)?,
                name: non_empty(concept.display_name)?,
            })
        })
        .take(MAX_TOPICS_PER_WORK)
        .collect();

    Some(WorkRecord {
        external_id,
        title,
        abstract_text,
        published_date,
        authors,
        topics,
    })
}

/// Rebuild abstract text from the inverted token index. Each position
/// keeps the first token claiming it; out-of-range positions are
/// ignored.
fn decode_abstract(index: &BTreeMap<String, Vec<i64>>) -> String {
    let mut token_by_position: BTreeMap<i64, &str> = BTreeMap::new();
    for (token, positions) in index {
        for &position in positions {
            if (0..MAX_ABSTRACT_POSITION).contains(&position) {
                token_by_position.entry(position).or_insert(token);
            }
        }
    }

    token_by_position
        .values()
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_work(value: serde_json::Value) -> RawWork {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_abstract_orders_by_position() {
        let mut index = BTreeMap::new();
        index.insert("slicing".to_string(), vec![1]);
        index.insert("Network".to_string(), vec![0]);
        index.insert("isolates".to_string(), vec![2]);
        index.insert("tenants".to_string(), vec![3]);

        assert_eq!(decode_abstract(&index), "Network slicing isolates tenants");
    }

    #[test]
    fn test_decode_abstract_ignores_bad_positions() {
        let mut index = BTreeMap::new();
        index.insert("kept".to_string(), vec![0]);
        index.insert("negative".to_string(), vec![-1]);
        index.insert("huge".to_string(), vec![90_000]);

        assert_eq!(decode_abstract(&index), "kept");
    }

    #[test]
    fn test_decode_abstract_first_token_wins_per_position() {
        let mut index = BTreeMap::new();
        index.insert("alpha".to_string(), vec![0]);
        index.insert("beta".to_string(), vec![0]);

        assert_eq!(decode_abstract(&index), "alpha");
    }

    #[test]
    fn test_normalize_requires_work_id() {
        assert!(normalize_work(raw_work(json!({"display_name": "No id"}))).is_none());
        assert!(normalize_work(raw_work(json!({"id": "   "}))).is_none());
    }

    #[test]
    fn test_normalize_applies_defaults() {
        let work = normalize_work(raw_work(json!({
            "id": "https://openalex.org/W1",
            "publication_date": "not-a-date",
        })))
        .unwrap();

        assert_eq!(work.external_id, "https://openalex.org/W1");
        assert_eq!(work.title, "Untitled");
        assert_eq!(work.abstract_text, "");
        assert_eq!(work.published_date, None);
        assert!(work.authors.is_empty());
        assert!(work.topics.is_empty());
    }

    #[test]
    fn test_normalize_extracts_authors_and_topics() {
        let work = normalize_work(raw_work(json!({
            "id": "W2",
            "display_name": "RAN scheduling",
            "publication_date": "2024-03-15",
            "authorships": [
                {
                    "author": {"id": "A1", "display_name": "Ada Example"},
                    "institutions": [{"display_name": "Example Labs"}]
                },
                {
                    "author": {"id": "A2"},
                    "institutions": []
                },
                {"author": {"display_name": "No id, dropped"}},
                {}
            ],
            "concepts": [
                {"id": "C1", "display_name": "Scheduling"},
                {"id": "C2"},
                {"display_name": "No id"}
            ]
        })))
        .unwrap();

        assert_eq!(
            work.published_date,
            Some(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        );
        assert_eq!(work.authors.len(), 2);
        assert_eq!(work.authors[0].name, "Ada Example");
        assert_eq!(work.authors[0].institution, Some("Example Labs".to_string()));
        assert_eq!(work.authors[1].name, "Unknown");
        assert_eq!(work.authors[1].institution, None);

        assert_eq!(work.topics.len(), 1);
        assert_eq!(work.topics[0].external_id, "C1");
    }

    #[test]
    fn test_normalize_caps_topics() {
        let concepts: Vec<_> = (0..12)
            .map(|i| json!({"id": format!("C{i}"), "display_name": format!("Topic {i}")}))
            .collect();
        let work = normalize_work(raw_work(json!({"id": "W3", "concepts": concepts}))).unwrap();

        assert_eq!(work.topics.len(), MAX_TOPICS_PER_WORK);
    }
}
