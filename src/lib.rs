//! # tenant-rag
//!
//! A tenant-isolated, role-aware retrieval and answering engine for HR
//! knowledge bases.
//!
//! Documents are chunked on paragraph boundaries, embedded, and stored per
//! tenant with the roles allowed to read them. Queries are filtered by
//! tenant and role *before* ranking, ranked with lexical and document
//! hints plus Maximal Marginal Relevance, and answered by a remote
//! tool-augmented service when one is reachable or by the local pipeline
//! otherwise. Every completed query leaves an audit record.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────┐
//! │  Ingest  │──▶│ Chunk+Embed │──▶│  SQLite   │
//! └──────────┘   └─────────────┘   └────┬─────┘
//!                                       │
//!                ┌──────────────────────┤
//!                ▼                      ▼
//!          ┌───────────┐          ┌──────────┐
//!          │  Remote   │──fail──▶ │  Local   │
//!          │ answering │          │ rank+LLM │
//!          └───────────┘          └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`embedding`] | Embedding providers with deterministic fallback |
//! | [`answer`] | Generative answering with degraded mode |
//! | [`ingest`] | Ingestion pipeline |
//! | [`engine`] | Validation, retrieval, and local answers |
//! | [`hybrid`] | Remote-first orchestration with local fallback |
//! | [`identity`] | HS256 identity tokens |
//! | [`audit`] | Audit recorder |
//! | [`pii`] | PII redaction for audit records |
//! | [`server`] | HTTP API |
//! | [`error`] | Engine error taxonomy |
//! | [`logging`] | Tracing subscriber setup |
//! | [`retry`] | JSON POST with backoff for providers |
//! | [`commands`] | CLI command implementations |
//!
//! Pure logic (models, chunking, ranking, prompt assembly) lives in the
//! `tenant-rag-core` crate.

pub mod answer;
pub mod audit;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod hybrid;
pub mod identity;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod pii;
pub mod retry;
pub mod server;
pub mod sqlite_store;
