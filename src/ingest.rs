//! Ingestion pipeline.
//!
//! Validates a document, chunks it on paragraph boundaries, embeds every
//! chunk, and appends the chunks to the store tagged with the document's
//! access metadata. Re-ingesting a `doc_id` appends; replacement is an
//! explicit purge followed by a new ingestion.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tenant_rag_core::chunk::chunk_text;
use tenant_rag_core::models::{parse_roles, Chunk, Confidentiality};
use tenant_rag_core::store::Store;

use crate::embedding::Embedder;
use crate::error::{EngineError, EngineResult};

/// A document to ingest.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub tenant_id: String,
    pub doc_id: String,
    pub text: String,
    pub allowed_roles: Vec<String>,
    #[serde(default)]
    pub confidentiality: Confidentiality,
    #[serde(default)]
    pub pii_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub tenant_id: String,
    pub doc_id: String,
    pub chunks_created: usize,
    pub chunk_ids: Vec<String>,
    /// Paragraphs longer than the chunk size, stored whole.
    pub oversized_paragraphs: usize,
    pub embedding_model: String,
    /// True when any chunk was embedded with the fallback.
    pub degraded: bool,
}

/// Run the ingestion pipeline for one document.
///
/// All validation happens before any chunking or embedding work.
pub async fn ingest_document<S: Store + ?Sized>(
    store: &S,
    embedder: &Embedder,
    max_chars: usize,
    req: &IngestRequest,
) -> EngineResult<IngestOutcome> {
    let tenant_id = req.tenant_id.trim();
    let doc_id = req.doc_id.trim();
    if tenant_id.is_empty() {
        return Err(EngineError::validation("tenant_id must not be empty"));
    }
    if doc_id.is_empty() {
        return Err(EngineError::validation("doc_id must not be empty"));
    }
    if req.text.trim().is_empty() {
        return Err(EngineError::validation("text must not be empty"));
    }
    let allowed_roles =
        parse_roles(&req.allowed_roles).map_err(|e| EngineError::validation(e.to_string()))?;
    let pii_flags: Vec<String> = req
        .pii_flags
        .iter()
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .collect();

    let drafts = chunk_text(&req.text, max_chars);
    let oversized = drafts.iter().filter(|d| d.oversized).count();
    if oversized > 0 {
        tracing::warn!(
            tenant_id,
            doc_id,
            oversized,
            max_chars,
            "paragraphs exceed chunk size and were kept whole"
        );
    }

    let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await;
    let degraded = embeddings.iter().any(|e| e.degraded);
    let embedding_model = embeddings
        .first()
        .map(|e| e.model.clone())
        .unwrap_or_default();

    let created_at = chrono::Utc::now().timestamp_millis();
    let chunks: Vec<Chunk> = drafts
        .into_iter()
        .zip(embeddings)
        .map(|(draft, embedding)| Chunk {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            doc_id: doc_id.to_string(),
            chunk_index: draft.chunk_index,
            text: draft.text,
            hash: draft.hash,
            embedding: embedding.vector,
            allowed_roles: allowed_roles.clone(),
            confidentiality: req.confidentiality,
            pii_flags: pii_flags.clone(),
            created_at,
        })
        .collect();

    store.register_tenant(tenant_id).await?;
    store.insert_chunks(&chunks).await?;

    tracing::info!(
        tenant_id,
        doc_id,
        chunks = chunks.len(),
        model = %embedding_model,
        degraded,
        "document ingested"
    );

    Ok(IngestOutcome {
        tenant_id: tenant_id.to_string(),
        doc_id: doc_id.to_string(),
        chunks_created: chunks.len(),
        chunk_ids: chunks.into_iter().map(|c| c.id).collect(),
        oversized_paragraphs: oversized,
        embedding_model,
        degraded,
    })
}
