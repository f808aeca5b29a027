//! Grounded question answering endpoint handler

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use expertscope_common::{auth::CallerContext, errors::Result};
use expertscope_discovery::ask::{AskParams, AskResponse};

/// Ask request parameters
#[derive(Debug, Deserialize, Validate)]
pub struct AskQueryParams {
    /// Free-text question
    #[validate(length(min = 1, message = "query cannot be empty."))]
    pub query: String,

    /// PUBLIC, INTERNAL or CONFIDENTIAL; the session role decides when absent
    pub clearance: Option<String>,
}

/// Cited answer over chunks visible at the caller's clearance
pub async fn ask(
    State(state): State<AppState>,
    caller: CallerContext,
    Query(params): Query<AskQueryParams>,
) -> Result<Json<AskResponse>> {
    params.validate().map_err(super::bad_request)?;

    let request = AskParams {
        query: params.query,
        clearance: params.clearance,
    };
    let response = state.ask.ask(&request, &caller).await?;

    tracing::info!(
        request_id = %caller.request_id,
        query = %request.query,
        confidence = %response.answer_payload.confidence,
        citations = response.citations.len(),
        experts = response.recommended_experts.len(),
        redacted = response.redacted_count,
        "Ask completed"
    );

    Ok(Json(response))
}
