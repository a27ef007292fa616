//! CLI command implementations.
//!
//! Each `run_*` function backs one `trag` subcommand: it opens the engine
//! from config, performs the operation, and prints human-readable output
//! (or JSON when asked).

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

use tenant_rag_core::models::{AuditAction, AuditFilter, Confidentiality, Role};

use crate::config::Config;
use crate::engine::{Engine, Principal};
use crate::hybrid::{HybridOrchestrator, RemoteClient};
use crate::identity::IdentityKey;
use crate::ingest::IngestRequest;

/// Identity used for audit records written by CLI ingestion.
const CLI_USER: &str = "cli";

pub async fn run_tenant_add(config: &Config, tenant_id: &str) -> Result<()> {
    let engine = Engine::open(config).await?;
    if engine.register_tenant(tenant_id).await? {
        println!("Tenant '{}' registered.", tenant_id.trim());
    } else {
        println!("Tenant '{}' already exists.", tenant_id.trim());
    }
    Ok(())
}

pub struct IngestArgs<'a> {
    pub file: &'a Path,
    pub tenant: &'a str,
    pub doc_id: Option<&'a str>,
    pub roles: Vec<String>,
    pub confidentiality: &'a str,
    pub pii_flags: Vec<String>,
}

pub async fn run_ingest(config: &Config, args: IngestArgs<'_>) -> Result<()> {
    let text = std::fs::read_to_string(args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let doc_id = match args.doc_id {
        Some(id) => id.to_string(),
        None => args
            .file
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .context("cannot derive a doc id from the file name; pass --doc-id")?,
    };
    let confidentiality: Confidentiality = args.confidentiality.parse()?;

    let engine = Engine::open(config).await?;
    let actor = Principal::new(CLI_USER, args.tenant, "admin")?;
    let outcome = engine
        .ingest(
            &actor,
            &IngestRequest {
                tenant_id: args.tenant.to_string(),
                doc_id,
                text,
                allowed_roles: args.roles,
                confidentiality,
                pii_flags: args.pii_flags,
            },
        )
        .await?;

    println!(
        "Ingested '{}' into tenant '{}': {} chunk(s), embedding model {}{}",
        outcome.doc_id,
        outcome.tenant_id,
        outcome.chunks_created,
        outcome.embedding_model,
        if outcome.degraded { " (fallback)" } else { "" }
    );
    if outcome.oversized_paragraphs > 0 {
        println!(
            "  note: {} paragraph(s) exceeded the chunk size and were stored whole",
            outcome.oversized_paragraphs
        );
    }
    Ok(())
}

pub async fn run_purge(config: &Config, tenant: &str, doc_id: &str) -> Result<()> {
    let engine = Engine::open(config).await?;
    let removed = engine.purge(tenant, doc_id).await?;
    println!("Removed {} chunk(s) of '{}' from tenant '{}'.", removed, doc_id, tenant);
    Ok(())
}

pub struct QueryArgs<'a> {
    pub query: &'a str,
    pub tenant: &'a str,
    pub role: &'a str,
    pub user: &'a str,
    pub top_k: Option<usize>,
    pub json: bool,
    pub explain: bool,
}

pub async fn run_query(config: &Config, args: QueryArgs<'_>) -> Result<()> {
    let engine = Arc::new(Engine::open(config).await?);
    let principal = Principal::new(args.user, args.tenant, args.role)?;

    if args.explain {
        let (_, trace) = engine.retrieve(&principal, args.query, args.top_k).await?;
        eprintln!("{}", serde_json::to_string_pretty(&trace)?);
    }

    let identity = IdentityKey::from_config(&config.identity).ok();
    let remote = RemoteClient::from_config(&config.remote, identity);
    let orchestrator = HybridOrchestrator::new(engine, remote);
    let outcome = orchestrator.query(&principal, args.query, args.top_k).await?;
    let reason = outcome.fallback_reason();
    let response = outcome.into_response();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.answer);
    println!();
    println!(
        "confidence: {:.2} ({:?}) | source: {:?} | model: {}",
        response.confidence, response.confidence_tier, response.source, response.model
    );
    if let Some(reason) = reason {
        println!("local fallback reason: {:?}", reason);
    }
    for (i, p) in response.provenance.iter().enumerate() {
        println!(
            "  {}. {} [{}] score={:.3} chunk={}",
            i + 1,
            p.doc_id,
            p.confidentiality,
            p.score,
            p.chunk_id
        );
    }
    if !response.fallback_options.is_empty() {
        println!("options: {}", response.fallback_options.join(", "));
    }
    Ok(())
}

pub struct AuditArgs<'a> {
    pub tenant: &'a str,
    pub user: Option<String>,
    pub action: Option<&'a str>,
    pub since: Option<&'a str>,
    pub until: Option<&'a str>,
    pub limit: usize,
}

pub async fn run_audit(config: &Config, args: AuditArgs<'_>) -> Result<()> {
    let engine = Engine::open(config).await?;
    let mut filter = AuditFilter::for_tenant(args.tenant);
    filter.user_id = args.user;
    filter.action = args.action.map(str::parse::<AuditAction>).transpose()?;
    filter.since = args.since.map(|d| day_start_millis(d, 0)).transpose()?;
    filter.until = args.until.map(|d| day_start_millis(d, 1)).transpose()?;
    filter.limit = args.limit;

    let records = engine.audit_log(&filter).await?;
    if records.is_empty() {
        println!("No audit records.");
        return Ok(());
    }
    for r in records {
        let ts = chrono::DateTime::from_timestamp_millis(r.created_at)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_else(|| r.created_at.to_string());
        println!(
            "{}  {:<6} {:<12} {:<8} conf={:.2} chunks={}  {}",
            ts,
            r.action.as_str(),
            r.user_id,
            r.role,
            r.confidence,
            r.chunk_ids.len(),
            r.query_text
        );
    }
    Ok(())
}

/// Unix millis at 00:00 UTC of `date` plus `offset_days`.
fn day_start_millis(date: &str, offset_days: i64) -> Result<i64> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", date))?;
    let Some(start) = day.and_hms_opt(0, 0, 0) else {
        bail!("invalid date '{}'", date);
    };
    Ok(start.and_utc().timestamp_millis() + offset_days * 86_400_000)
}

pub fn run_token(config: &Config, user: &str, tenant: &str, role: &str) -> Result<()> {
    let key = IdentityKey::from_config(&config.identity)?;
    let role = Role::parse(role)?;
    println!("{}", key.mint(user, tenant, &role)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_start_millis() {
        assert_eq!(day_start_millis("1970-01-02", 0).unwrap(), 86_400_000);
        assert_eq!(day_start_millis("1970-01-01", 1).unwrap(), 86_400_000);
        assert!(day_start_millis("yesterday", 0).is_err());
    }
}
