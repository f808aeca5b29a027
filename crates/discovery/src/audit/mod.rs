//! Best-effort audit logging
//!
//! Every pipeline request lands one row in `search_audits`. An audit
//! failure is logged and counted, never retried, and never turns into a
//! request failure.

use async_trait::async_trait;
use expertscope_common::db::models::SearchAudit;
use expertscope_common::db::Repository;
use expertscope_common::errors::Result;
use expertscope_common::metrics;
use std::sync::Arc;

/// Sink the recorder writes rows through
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn insert_search_audit(
        &self,
        endpoint: &str,
        query: &str,
        clearance: &str,
        user_role: &str,
        redacted_count: i32,
        client_id: Option<String>,
    ) -> Result<SearchAudit>;
}

#[async_trait]
impl AuditSink for Repository {
    async fn insert_search_audit(
        &self,
        endpoint: &str,
        query: &str,
        clearance: &str,
        user_role: &str,
        redacted_count: i32,
        client_id: Option<String>,
    ) -> Result<SearchAudit> {
        Repository::insert_search_audit(
            self,
            endpoint,
            query,
            clearance,
            user_role,
            redacted_count,
            client_id,
        )
        .await
    }
}

/// One audit row, assembled by a pipeline after its query work is done
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub endpoint: &'static str,
    pub query: String,
    pub clearance: String,
    pub user_role: String,
    pub redacted_count: i32,
    pub client_id: Option<String>,
}

/// Best-effort recorder shared by the three pipelines
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Write one row, swallowing failures after logging them
    pub async fn record(&self, record: AuditRecord) {
        if let Err(error) = self
            .sink
            .insert_search_audit(
                record.endpoint,
                &record.query,
                &record.clearance,
                &record.user_role,
                record.redacted_count,
                record.client_id,
            )
            .await
        {
            tracing::error!(
                endpoint = record.endpoint,
                error = %error,
                "Failed to persist audit row"
            );
            metrics::record_audit_failure(record.endpoint);
        }
    }
}
