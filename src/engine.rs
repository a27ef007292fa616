//! The local retrieval-and-answering service.
//!
//! [`Engine`] owns the store, the embedding and generative providers, and
//! the ranking parameters. It validates requests, runs ingestion, runs the
//! ranking pipeline from [`tenant_rag_core::rank`], and produces local
//! answers. It does not write query audit records; the caller does that
//! once a full response exists (see [`crate::hybrid`]).

use std::sync::Arc;

use anyhow::Result;

use tenant_rag_core::models::{AuditAction, AuditFilter, AuditRecord, Role};
use tenant_rag_core::prompt::Answer;
use tenant_rag_core::rank::{self, RankingParams, RankingTrace, RetrievalRequest, RetrievalResult};
use tenant_rag_core::store::Store;

use crate::answer::Answerer;
use crate::audit::{AuditEntry, AuditRecorder};
use crate::config::Config;
use crate::db;
use crate::embedding::Embedder;
use crate::error::{EngineError, EngineResult};
use crate::identity::Claims;
use crate::ingest::{ingest_document, IngestOutcome, IngestRequest};
use crate::migrate;
use crate::pii::Redactor;
use crate::sqlite_store::SqliteStore;

/// Who is asking: user, tenant, and role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub tenant_id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: &str, tenant_id: &str, role: &str) -> EngineResult<Self> {
        let user_id = user_id.trim();
        let tenant_id = tenant_id.trim();
        if user_id.is_empty() {
            return Err(EngineError::validation("user id must not be empty"));
        }
        if tenant_id.is_empty() {
            return Err(EngineError::validation("tenant id must not be empty"));
        }
        let role = Role::parse(role).map_err(|e| EngineError::validation(e.to_string()))?;
        Ok(Self {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            role,
        })
    }

    pub fn from_claims(claims: &Claims) -> EngineResult<Self> {
        Self::new(&claims.sub, &claims.tenant_id, &claims.role)
    }
}

/// Retrieval plus the answer built from it.
#[derive(Debug, Clone)]
pub struct LocalAnswer {
    pub retrieval: RetrievalResult,
    pub trace: RankingTrace,
    pub answer: Answer,
}

pub struct Engine {
    store: Arc<dyn Store>,
    embedder: Embedder,
    answerer: Answerer,
    params: RankingParams,
    max_chars: usize,
    audit: AuditRecorder,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Embedder,
        answerer: Answerer,
        params: RankingParams,
        max_chars: usize,
    ) -> Self {
        Self {
            audit: AuditRecorder::new(store.clone()),
            store,
            embedder,
            answerer,
            params,
            max_chars,
        }
    }

    /// Redact audit query text with `redactor`.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.audit = AuditRecorder::with_redactor(self.store.clone(), redactor);
        self
    }

    /// Open the SQLite store (applying migrations) and build providers from config.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let engine = Self::new(
            store,
            Embedder::from_config(&config.embedding)?,
            Answerer::from_config(&config.llm)?,
            config.retrieval.params(),
            config.chunking.max_chars,
        );
        Ok(engine.with_redactor(Redactor::from_config(&config.pii)?))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn answerer(&self) -> &Answerer {
        &self.answerer
    }

    pub fn params(&self) -> &RankingParams {
        &self.params
    }

    pub async fn register_tenant(&self, tenant_id: &str) -> EngineResult<bool> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(EngineError::validation("tenant id must not be empty"));
        }
        Ok(self.store.register_tenant(tenant_id).await?)
    }

    /// Ingest a document and record an `ingest` audit entry for `actor`.
    pub async fn ingest(&self, actor: &Principal, req: &IngestRequest) -> EngineResult<IngestOutcome> {
        let outcome = ingest_document(self.store.as_ref(), &self.embedder, self.max_chars, req).await?;
        self.audit
            .record(AuditEntry {
                user_id: &actor.user_id,
                tenant_id: &outcome.tenant_id,
                role: actor.role.as_str(),
                action: AuditAction::Ingest,
                query_text: &outcome.doc_id,
                chunk_ids: outcome.chunk_ids.clone(),
                confidence: 0.0,
            })
            .await;
        Ok(outcome)
    }

    /// Delete every chunk of one document. Returns the number removed.
    pub async fn purge(&self, tenant_id: &str, doc_id: &str) -> EngineResult<usize> {
        if doc_id.trim().is_empty() {
            return Err(EngineError::validation("doc_id must not be empty"));
        }
        self.ensure_tenant(tenant_id).await?;
        let removed = self.store.purge_document(tenant_id, doc_id.trim()).await?;
        tracing::info!(tenant_id, doc_id, removed, "document purged");
        Ok(removed)
    }

    /// Reject malformed queries before any retrieval work.
    pub async fn validate_query(
        &self,
        principal: &Principal,
        query: &str,
        top_k: Option<usize>,
    ) -> EngineResult<usize> {
        if query.trim().is_empty() {
            return Err(EngineError::validation("query must not be empty"));
        }
        let top_k = top_k.unwrap_or(self.params.top_k);
        if top_k == 0 {
            return Err(EngineError::validation("top_k must be >= 1"));
        }
        self.ensure_tenant(&principal.tenant_id).await?;
        Ok(top_k)
    }

    async fn ensure_tenant(&self, tenant_id: &str) -> EngineResult<()> {
        if !self.store.tenant_exists(tenant_id).await? {
            return Err(EngineError::UnknownTenant(tenant_id.to_string()));
        }
        Ok(())
    }

    /// Run the ranking pipeline for `principal`.
    pub async fn retrieve(
        &self,
        principal: &Principal,
        query: &str,
        top_k: Option<usize>,
    ) -> EngineResult<(RetrievalResult, RankingTrace)> {
        let top_k = self.validate_query(principal, query, top_k).await?;
        let query_vec = self.embedder.embed(query).await;
        let req = RetrievalRequest {
            tenant_id: &principal.tenant_id,
            role: &principal.role,
            query,
            query_vec: &query_vec.vector,
            top_k,
        };
        let (result, trace) = rank::retrieve(self.store.as_ref(), &req, &self.params).await?;
        tracing::debug!(
            tenant_id = %principal.tenant_id,
            role = %principal.role,
            fetched = trace.fetched,
            visible = trace.visible,
            type_hint = trace.type_hint_applied,
            identity_hint = trace.identity_hint_applied,
            dominant_doc = ?trace.dominant_doc,
            selected = result.chunks.len(),
            backfilled = trace.backfilled,
            confidence = result.confidence,
            "retrieval complete"
        );
        Ok((result, trace))
    }

    /// Retrieve and answer locally. Writes no audit record.
    pub async fn answer_locally(
        &self,
        principal: &Principal,
        query: &str,
        top_k: Option<usize>,
    ) -> EngineResult<LocalAnswer> {
        let (retrieval, trace) = self.retrieve(principal, query, top_k).await?;
        let answer = self.answerer.answer(query, &retrieval.chunks).await;
        Ok(LocalAnswer {
            retrieval,
            trace,
            answer,
        })
    }

    pub async fn audit_log(&self, filter: &AuditFilter) -> EngineResult<Vec<AuditRecord>> {
        Ok(self.audit.query(filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenant_rag_core::store::memory::InMemoryStore;

    fn engine() -> Engine {
        Engine::new(
            Arc::new(InMemoryStore::new()),
            Embedder::disabled(64),
            Answerer::disabled(),
            RankingParams::default(),
            800,
        )
    }

    #[test]
    fn test_principal_validation() {
        assert!(Principal::new("u1", "acme", "HR").is_ok());
        assert!(Principal::new("", "acme", "hr").is_err());
        assert!(Principal::new("u1", " ", "hr").is_err());
        assert!(Principal::new("u1", "acme", "").is_err());
    }

    #[tokio::test]
    async fn test_unknown_tenant_distinct_from_empty() {
        let engine = engine();
        let p = Principal::new("u1", "ghost", "hr").unwrap();
        let err = engine.retrieve(&p, "anything", None).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownTenant(_)));

        engine.register_tenant("ghost").await.unwrap();
        let (result, _) = engine.retrieve(&p, "anything", None).await.unwrap();
        assert!(result.chunks.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_empty_query_and_zero_top_k_rejected() {
        let engine = engine();
        engine.register_tenant("acme").await.unwrap();
        let p = Principal::new("u1", "acme", "hr").unwrap();
        assert!(matches!(
            engine.retrieve(&p, "   ", None).await.unwrap_err(),
            EngineError::Validation(_)
        ));
        assert!(matches!(
            engine.retrieve(&p, "leave", Some(0)).await.unwrap_err(),
            EngineError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_ingest_writes_audit_and_purge_removes() {
        let engine = engine();
        let admin = Principal::new("root", "acme", "admin").unwrap();
        let req = IngestRequest {
            tenant_id: "acme".to_string(),
            doc_id: "handbook".to_string(),
            text: "Office opens at nine.".to_string(),
            allowed_roles: vec!["employee".to_string()],
            confidentiality: Default::default(),
            pii_flags: Vec::new(),
        };
        engine.ingest(&admin, &req).await.unwrap();

        let log = engine.audit_log(&AuditFilter::for_tenant("acme")).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, AuditAction::Ingest);
        assert_eq!(log[0].query_text, "handbook");

        assert_eq!(engine.purge("acme", "handbook").await.unwrap(), 1);
        assert!(matches!(
            engine.purge("nobody", "handbook").await.unwrap_err(),
            EngineError::UnknownTenant(_)
        ));
    }
}
