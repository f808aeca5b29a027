//! Expert discovery endpoint handler

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use expertscope_common::{auth::CallerContext, errors::Result};
use expertscope_discovery::experts::{ExpertsParams, ExpertsResponse};

/// Expert search request parameters
#[derive(Debug, Deserialize, Validate)]
pub struct ExpertsQueryParams {
    /// Free-text query
    #[validate(length(min = 1, message = "query cannot be empty."))]
    pub query: String,

    /// PUBLIC, INTERNAL or CONFIDENTIAL; the session role decides when absent
    pub clearance: Option<String>,
}

/// Ranked researchers credited on papers visible at the caller's clearance
pub async fn experts(
    State(state): State<AppState>,
    caller: CallerContext,
    Query(params): Query<ExpertsQueryParams>,
) -> Result<Json<ExpertsResponse>> {
    params.validate().map_err(super::bad_request)?;

    let request = ExpertsParams {
        query: params.query,
        clearance: params.clearance,
    };
    let response = state.experts.experts(&request, &caller).await?;

    tracing::info!(
        request_id = %caller.request_id,
        query = %request.query,
        clearance = %response.clearance,
        experts = response.experts.len(),
        "Expert search completed"
    );

    Ok(Json(response))
}
