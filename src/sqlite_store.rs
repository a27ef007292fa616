//! SQLite-backed [`Store`] implementation.
//!
//! Embeddings are stored as little-endian f32 BLOBs; role sets, PII flags,
//! and audit chunk ids are stored as JSON text. Candidate recency is the
//! `seq` column (insertion order).

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use tenant_rag_core::embedding::{blob_to_vec, vec_to_blob};
use tenant_rag_core::models::{AuditFilter, AuditRecord, Chunk, Role};
use tenant_rag_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let roles_json: String = row.try_get("allowed_roles")?;
    let allowed_roles: BTreeSet<Role> =
        serde_json::from_str(&roles_json).context("corrupt allowed_roles column")?;
    let pii_json: String = row.try_get("pii_flags")?;
    let confidentiality: String = row.try_get("confidentiality")?;
    let blob: Vec<u8> = row.try_get("embedding")?;

    Ok(Chunk {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        doc_id: row.try_get("doc_id")?,
        chunk_index: row.try_get("chunk_index")?,
        text: row.try_get("text")?,
        hash: row.try_get("hash")?,
        embedding: blob_to_vec(&blob),
        allowed_roles,
        confidentiality: confidentiality.parse()?,
        pii_flags: serde_json::from_str(&pii_json).context("corrupt pii_flags column")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_audit(row: &SqliteRow) -> Result<AuditRecord> {
    let action: String = row.try_get("action")?;
    let chunk_ids: String = row.try_get("chunk_ids")?;
    let confidence: f64 = row.try_get("confidence")?;
    Ok(AuditRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        tenant_id: row.try_get("tenant_id")?,
        role: row.try_get("role")?,
        action: action.parse()?,
        query_text: row.try_get("query_text")?,
        chunk_ids: serde_json::from_str(&chunk_ids).context("corrupt chunk_ids column")?,
        confidence: confidence as f32,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn register_tenant(&self, tenant_id: &str) -> Result<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO tenants (id, created_at) VALUES (?, ?)")
            .bind(tenant_id)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn tenant_exists(&self, tenant_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM tenants WHERE id = ?")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            let roles = serde_json::to_string(&chunk.allowed_roles)?;
            let pii = serde_json::to_string(&chunk.pii_flags)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, tenant_id, doc_id, chunk_index, text, hash,
                                    embedding, allowed_roles, confidentiality, pii_flags, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.tenant_id)
            .bind(&chunk.doc_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(roles)
            .bind(chunk.confidentiality.as_str())
            .bind(pii)
            .bind(chunk.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn recent_chunks(&self, tenant_id: &str, limit: usize) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, doc_id, chunk_index, text, hash, embedding,
                   allowed_roles, confidentiality, pii_flags, created_at
            FROM chunks
            WHERE tenant_id = ?
            ORDER BY seq DESC
            LIMIT ?
            "#,
        )
        .bind(tenant_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn count_document_chunks(&self, tenant_id: &str, doc_id: &str) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE tenant_id = ? AND doc_id = ?")
                .bind(tenant_id)
                .bind(doc_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    async fn purge_document(&self, tenant_id: &str, doc_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE tenant_id = ? AND doc_id = ?")
            .bind(tenant_id)
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, user_id, tenant_id, role, action, query_text,
                                   chunk_ids, confidence, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.tenant_id)
        .bind(&record.role)
        .bind(record.action.as_str())
        .bind(&record.query_text)
        .bind(serde_json::to_string(&record.chunk_ids)?)
        .bind(f64::from(record.confidence))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, tenant_id, role, action, query_text, chunk_ids,
                   confidence, created_at
            FROM audit_log
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR user_id = ?2)
              AND (?3 IS NULL OR action = ?3)
              AND (?4 IS NULL OR created_at >= ?4)
              AND (?5 IS NULL OR created_at < ?5)
            ORDER BY seq DESC
            LIMIT ?6
            "#,
        )
        .bind(&filter.tenant_id)
        .bind(filter.user_id.as_deref())
        .bind(filter.action.map(|a| a.as_str()))
        .bind(filter.since)
        .bind(filter.until)
        .bind(filter.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_audit).collect()
    }
}
