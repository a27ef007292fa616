//! Audit recorder.
//!
//! Appends one record per completed query or ingestion. Query text passes
//! through the recorder's [`Redactor`] before it is stored. Write failures
//! are logged and swallowed: an audit outage never fails a user request.

use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use tenant_rag_core::models::{AuditAction, AuditFilter, AuditRecord};
use tenant_rag_core::store::Store;

use crate::pii::Redactor;

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn Store>,
    redactor: Redactor,
}

/// Fields of one audit entry, before id and timestamp are assigned.
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    pub user_id: &'a str,
    pub tenant_id: &'a str,
    pub role: &'a str,
    pub action: AuditAction,
    pub query_text: &'a str,
    pub chunk_ids: Vec<String>,
    pub confidence: f32,
}

impl AuditRecorder {
    /// A recorder that stores query text as given.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_redactor(store, Redactor::disabled())
    }

    pub fn with_redactor(store: Arc<dyn Store>, redactor: Redactor) -> Self {
        Self { store, redactor }
    }

    /// Append an entry. Returns `false` if the write failed.
    pub async fn record(&self, entry: AuditEntry<'_>) -> bool {
        let record = AuditRecord {
            id: Uuid::new_v4().to_string(),
            user_id: entry.user_id.to_string(),
            tenant_id: entry.tenant_id.to_string(),
            role: entry.role.to_string(),
            action: entry.action,
            query_text: self.redactor.redact(entry.query_text).into_owned(),
            chunk_ids: entry.chunk_ids,
            confidence: entry.confidence,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        match self.store.append_audit(&record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    tenant_id = %record.tenant_id,
                    user_id = %record.user_id,
                    action = record.action.as_str(),
                    error = %e,
                    "failed to write audit record"
                );
                false
            }
        }
    }

    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        self.store.query_audit(filter).await
    }
}
