//! Search endpoint handler

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use expertscope_common::{auth::CallerContext, errors::Result};
use expertscope_discovery::search::{SearchParams, SearchResponse};

/// Search request parameters
#[derive(Debug, Deserialize, Validate)]
pub struct SearchQueryParams {
    /// Free-text query
    #[validate(length(min = 1, message = "query cannot be empty."))]
    pub query: String,

    /// PUBLIC, INTERNAL or CONFIDENTIAL; the session role decides when absent
    pub clearance: Option<String>,

    /// 1-based page number
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "page must be greater than zero."))]
    pub page: u64,
}

fn default_page() -> u64 {
    1
}

/// Clearance-filtered semantic search over the paper corpus
pub async fn search(
    State(state): State<AppState>,
    caller: CallerContext,
    Query(params): Query<SearchQueryParams>,
) -> Result<Json<SearchResponse>> {
    params.validate().map_err(super::bad_request)?;

    let request = SearchParams {
        query: params.query,
        clearance: params.clearance,
        page: params.page,
    };
    let response = state.search.search(&request, &caller).await?;

    tracing::info!(
        request_id = %caller.request_id,
        query = %request.query,
        clearance = %response.clearance,
        page = request.page,
        results = response.results.len(),
        redacted = response.redacted_count,
        "Search completed"
    );

    Ok(Json(response))
}
