//! Storage abstraction for tenant-rag.
//!
//! The [`Store`] trait defines every storage operation the ingestion,
//! retrieval, and audit paths need, so the ranking engine can run against
//! SQLite in the app crate or [`memory::InMemoryStore`] in tests.
//!
//! All reads are tenant-scoped: no method returns rows belonging to a
//! tenant other than the one passed in.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AuditFilter, AuditRecord, Chunk};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`register_tenant`](Store::register_tenant) | Create a tenant if absent |
/// | [`tenant_exists`](Store::tenant_exists) | Check tenant registration |
/// | [`insert_chunks`](Store::insert_chunks) | Append chunks (never replaces) |
/// | [`recent_chunks`](Store::recent_chunks) | Most recent chunks for a tenant |
/// | [`count_document_chunks`](Store::count_document_chunks) | Chunks stored for one document |
/// | [`purge_document`](Store::purge_document) | Delete all chunks of one document |
/// | [`append_audit`](Store::append_audit) | Append an audit record |
/// | [`query_audit`](Store::query_audit) | Filtered audit read, newest first |
#[async_trait]
pub trait Store: Send + Sync {
    /// Register a tenant. Returns `true` if it did not exist before.
    async fn register_tenant(&self, tenant_id: &str) -> Result<bool>;

    async fn tenant_exists(&self, tenant_id: &str) -> Result<bool>;

    /// Append chunks. Existing chunks of the same document are kept.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Up to `limit` chunks of `tenant_id`, most recently inserted first.
    async fn recent_chunks(&self, tenant_id: &str, limit: usize) -> Result<Vec<Chunk>>;

    async fn count_document_chunks(&self, tenant_id: &str, doc_id: &str) -> Result<usize>;

    /// Delete every chunk of `(tenant_id, doc_id)`. Returns the number removed.
    async fn purge_document(&self, tenant_id: &str, doc_id: &str) -> Result<usize>;

    async fn append_audit(&self, record: &AuditRecord) -> Result<()>;

    async fn query_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>>;
}
