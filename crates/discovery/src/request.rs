//! Request validation shared by the discovery pipelines
//!
//! Every pipeline rejects a request before touching storage, so a
//! rejected request leaves no audit row and no fetch run behind.

use expertscope_common::errors::{AppError, Result};

/// Longest accepted query, in characters
pub const MAX_QUERY_LENGTH: usize = 2000;

/// Trim a raw query and reject blank or oversize input
pub fn clean_query(raw: &str) -> Result<String> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(AppError::Validation {
            message: "query cannot be empty.".to_string(),
            field: Some("query".to_string()),
        });
    }

    let length = query.chars().count();
    if length > MAX_QUERY_LENGTH {
        return Err(AppError::QueryTooLong {
            length,
            limit: MAX_QUERY_LENGTH,
        });
    }

    Ok(query.to_string())
}
