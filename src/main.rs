//! # tenant-rag CLI (`trag`)
//!
//! The `trag` binary manages tenants, ingests HR documents, answers
//! queries through the hybrid pipeline, reads the audit log, mints
//! identity tokens, and starts the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! trag --config ./config/trag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `trag init` | Create the SQLite database and run schema migrations |
//! | `trag tenant add <id>` | Register a tenant |
//! | `trag ingest <file>` | Chunk, embed, and store one document |
//! | `trag purge` | Delete every chunk of one document |
//! | `trag query "<text>"` | Answer a query as a tenant/role |
//! | `trag audit` | List audit records of a tenant |
//! | `trag token` | Mint an identity token for the HTTP API |
//! | `trag serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! trag init
//! trag tenant add acme
//! trag ingest ./docs/leave_policy.txt --tenant acme --roles employee,hr
//! trag query "how many days of medical leave" --tenant acme --role employee
//! trag audit --tenant acme --action query --since 2026-01-01
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tenant_rag::commands::{self, AuditArgs, IngestArgs, QueryArgs};
use tenant_rag::{config, logging, migrate, server};

/// tenant-rag: tenant-isolated, role-aware retrieval and answering for HR
/// knowledge bases.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/trag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "trag",
    about = "tenant-rag: tenant-isolated, role-aware retrieval and answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/trag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the tenant, chunk, and audit
    /// tables. Safe to run repeatedly.
    Init,

    /// Manage tenants.
    Tenant {
        #[command(subcommand)]
        action: TenantAction,
    },

    /// Ingest a plain-text document.
    ///
    /// Paragraphs are packed into chunks, embedded, and stored with the
    /// roles allowed to read them. The tenant is registered if needed.
    Ingest {
        /// Path to a UTF-8 text file.
        file: PathBuf,

        #[arg(long)]
        tenant: String,

        /// Document id. Defaults to the file stem.
        #[arg(long)]
        doc_id: Option<String>,

        /// Roles allowed to read the document, comma-separated.
        #[arg(long, value_delimiter = ',', required = true)]
        roles: Vec<String>,

        /// public, internal, confidential, or restricted.
        #[arg(long, default_value = "internal")]
        confidentiality: String,

        /// PII marker attached to every chunk. Repeatable.
        #[arg(long = "pii-flag")]
        pii_flags: Vec<String>,
    },

    /// Delete every chunk of one document.
    Purge {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        doc_id: String,
    },

    /// Answer a query as a tenant and role.
    ///
    /// Tries the remote answering service first when `[remote].url` is set,
    /// then the local pipeline. Writes one audit record.
    Query {
        query: String,

        #[arg(long)]
        tenant: String,

        #[arg(long)]
        role: String,

        #[arg(long, default_value = "cli")]
        user: String,

        /// Number of chunks to select. Defaults to `[retrieval].top_k`.
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,

        /// Print the ranking trace to stderr.
        #[arg(long)]
        explain: bool,
    },

    /// List audit records of a tenant, newest first.
    Audit {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        user: Option<String>,

        /// `query` or `ingest`.
        #[arg(long)]
        action: Option<String>,

        /// Only records on or after this date (YYYY-MM-DD, UTC).
        #[arg(long)]
        since: Option<String>,

        /// Only records on or before this date (YYYY-MM-DD, UTC).
        #[arg(long)]
        until: Option<String>,

        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Mint an identity token for the HTTP API.
    ///
    /// Signs with the secret in the environment variable named by
    /// `[identity].secret_env`.
    Token {
        #[arg(long)]
        user: String,

        #[arg(long)]
        tenant: String,

        #[arg(long)]
        role: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum TenantAction {
    /// Register a tenant id.
    Add { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Tenant { action } => match action {
            TenantAction::Add { id } => {
                commands::run_tenant_add(&cfg, &id).await?;
            }
        },
        Commands::Ingest {
            file,
            tenant,
            doc_id,
            roles,
            confidentiality,
            pii_flags,
        } => {
            commands::run_ingest(
                &cfg,
                IngestArgs {
                    file: &file,
                    tenant: &tenant,
                    doc_id: doc_id.as_deref(),
                    roles,
                    confidentiality: &confidentiality,
                    pii_flags,
                },
            )
            .await?;
        }
        Commands::Purge { tenant, doc_id } => {
            commands::run_purge(&cfg, &tenant, &doc_id).await?;
        }
        Commands::Query {
            query,
            tenant,
            role,
            user,
            top_k,
            json,
            explain,
        } => {
            commands::run_query(
                &cfg,
                QueryArgs {
                    query: &query,
                    tenant: &tenant,
                    role: &role,
                    user: &user,
                    top_k,
                    json,
                    explain,
                },
            )
            .await?;
        }
        Commands::Audit {
            tenant,
            user,
            action,
            since,
            until,
            limit,
        } => {
            commands::run_audit(
                &cfg,
                AuditArgs {
                    tenant: &tenant,
                    user,
                    action: action.as_deref(),
                    since: since.as_deref(),
                    until: until.as_deref(),
                    limit,
                },
            )
            .await?;
        }
        Commands::Token { user, tenant, role } => {
            commands::run_token(&cfg, &user, &tenant, &role)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
