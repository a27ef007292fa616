//! In-memory [`Store`] implementation for tests and WASM targets.
//!
//! Chunks and audit records are kept in insertion order in `Vec`s behind
//! `std::sync::RwLock`; recency is position in the vector.

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{AuditFilter, AuditRecord, Chunk};

use super::Store;

/// In-memory store for testing and WASM environments.
#[derive(Default)]
pub struct InMemoryStore {
    tenants: RwLock<HashSet<String>>,
    chunks: RwLock<Vec<Chunk>>,
    audit: RwLock<Vec<AuditRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn register_tenant(&self, tenant_id: &str) -> Result<bool> {
        Ok(write(&self.tenants)?.insert(tenant_id.to_string()))
    }

    async fn tenant_exists(&self, tenant_id: &str) -> Result<bool> {
        Ok(read(&self.tenants)?.contains(tenant_id))
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        write(&self.chunks)?.extend_from_slice(chunks);
        Ok(())
    }

    async fn recent_chunks(&self, tenant_id: &str, limit: usize) -> Result<Vec<Chunk>> {
        let stored = read(&self.chunks)?;
        Ok(stored
            .iter()
            .rev()
            .filter(|c| c.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_document_chunks(&self, tenant_id: &str, doc_id: &str) -> Result<usize> {
        let stored = read(&self.chunks)?;
        Ok(stored
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.doc_id == doc_id)
            .count())
    }

    async fn purge_document(&self, tenant_id: &str, doc_id: &str) -> Result<usize> {
        let mut stored = write(&self.chunks)?;
        let before = stored.len();
        stored.retain(|c| !(c.tenant_id == tenant_id && c.doc_id == doc_id));
        Ok(before - stored.len())
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        write(&self.audit)?.push(record.clone());
        Ok(())
    }

    async fn query_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        let stored = read(&self.audit)?;
        Ok(stored
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(filter.limit)
            .cloned()
            .collect())
    }
}
