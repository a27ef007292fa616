//! Core data models shared by the store, ranking engine, and application.
//!
//! Every stored fragment of a document is a [`Chunk`] that carries the
//! document's access metadata verbatim. There is no separate document
//! row: a document is the set of chunks sharing `(tenant_id, doc_id)`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// A normalized role identifier (`employee`, `hr`, `ceo`, `admin`, ...).
///
/// Roles are opaque to the engine. Parsing trims and lowercases the input
/// and rejects empty strings and embedded whitespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Role(String);

impl Role {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            bail!("role must not be empty");
        }
        if normalized.chars().any(char::is_whitespace) {
            bail!("role '{}' must not contain whitespace", normalized);
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Role {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Role::parse(&value)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.0
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Role::parse(s)
    }
}

/// Parse a list of raw role names into a normalized set.
///
/// Fails if the list is empty or any entry is invalid.
pub fn parse_roles<S: AsRef<str>>(raw: &[S]) -> Result<BTreeSet<Role>> {
    let mut roles = BTreeSet::new();
    for r in raw {
        roles.insert(Role::parse(r.as_ref())?);
    }
    if roles.is_empty() {
        bail!("at least one allowed role is required");
    }
    Ok(roles)
}

/// Confidentiality classification of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidentiality {
    Public,
    #[default]
    Internal,
    Confidential,
    Restricted,
}

impl Confidentiality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidentiality::Public => "public",
            Confidentiality::Internal => "internal",
            Confidentiality::Confidential => "confidential",
            Confidentiality::Restricted => "restricted",
        }
    }
}

impl fmt::Display for Confidentiality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidentiality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Confidentiality::Public),
            "internal" => Ok(Confidentiality::Internal),
            "confidential" => Ok(Confidentiality::Confidential),
            "restricted" => Ok(Confidentiality::Restricted),
            other => bail!(
                "unknown confidentiality level '{}': expected public, internal, confidential, or restricted",
                other
            ),
        }
    }
}

/// An embedded, access-tagged fragment of a document.
///
/// Chunks are immutable once stored. `allowed_roles` is copied from the
/// owning document at creation time and never widened afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// UUID v4.
    pub id: String,
    pub tenant_id: String,
    pub doc_id: String,
    /// Zero-based position within the ingestion call that produced it.
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 hex digest of `text`.
    pub hash: String,
    pub embedding: Vec<f32>,
    pub allowed_roles: BTreeSet<Role>,
    pub confidentiality: Confidentiality,
    pub pii_flags: Vec<String>,
    /// Unix milliseconds.
    pub created_at: i64,
}

impl Chunk {
    /// Whether a caller holding `role` may see this chunk.
    pub fn visible_to(&self, role: &Role) -> bool {
        self.allowed_roles.contains(role)
    }
}

/// Kind of action an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Query,
    Ingest,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Query => "query",
            AuditAction::Ingest => "ingest",
        }
    }
}

impl FromStr for AuditAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "query" => Ok(AuditAction::Query),
            "ingest" => Ok(AuditAction::Ingest),
            other => bail!("unknown audit action '{}'", other),
        }
    }
}

/// One append-only audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub role: String,
    pub action: AuditAction,
    /// Query text for `query` records, the document id for `ingest` records.
    pub query_text: String,
    pub chunk_ids: Vec<String>,
    pub confidence: f32,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// Read-side filter over the audit log. Results are newest first.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub action: Option<AuditAction>,
    /// Inclusive lower bound, Unix milliseconds.
    pub since: Option<i64>,
    /// Exclusive upper bound, Unix milliseconds.
    pub until: Option<i64>,
    pub limit: usize,
}

impl AuditFilter {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: None,
            action: None,
            since: None,
            until: None,
            limit: 100,
        }
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        record.tenant_id == self.tenant_id
            && self.user_id.as_deref().map_or(true, |u| record.user_id == u)
            && self.action.map_or(true, |a| record.action == a)
            && self.since.map_or(true, |s| record.created_at >= s)
            && self.until.map_or(true, |u| record.created_at < u)
    }
}
