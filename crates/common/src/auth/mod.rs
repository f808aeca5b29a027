//! Caller context extraction
//!
//! Provides:
//! - Session role and client id extraction from request headers
//! - Effective clearance resolution for a request

use crate::clearance::{self, Clearance};
use crate::errors::{AppError, Result};
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Extracted caller context available to handlers
#[derive(Debug, Clone)]
pub struct CallerContext {
    /// Session role carried on the request, if any
    pub session_role: Option<String>,

    /// Client identifier for audit attribution
    pub client_id: Option<String>,

    /// Request ID for tracing
    pub request_id: String,
}

impl CallerContext {
    /// Resolve the effective clearance: an explicit query parameter wins,
    /// otherwise the session role decides, defaulting to PUBLIC.
    pub fn resolve_clearance(&self, requested: Option<&str>) -> Result<Clearance> {
        clearance::resolve(requested, self.session_role.as_deref())
    }

    /// Audit attribution: the client header when present, else the
    /// normalized session role name.
    pub fn audit_client_id(&self) -> String {
        match &self.client_id {
            Some(id) => id.clone(),
            None => clearance::normalize_role(self.session_role.as_deref())
                .as_str()
                .to_string(),
        }
    }

    /// The role string recorded in audit rows when the caller did not
    /// request an explicit clearance.
    pub fn audit_user_role(&self, requested: Option<&str>, resolved: Clearance) -> String {
        requested
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .or_else(|| self.session_role.clone())
            .unwrap_or_else(|| resolved.as_str().to_string())
    }
}

fn header_string(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Axum extractor for CallerContext
impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        // Extract request ID
        let request_id = header_string(parts, "x-request-id")
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let session_role = header_string(parts, "x-user-role");
        let client_id = header_string(parts, "x-client-id");

        Ok(CallerContext {
            session_role,
            client_id,
            request_id,
        })
    }
}
