//! Error taxonomy at the engine boundary.
//!
//! Internal plumbing uses `anyhow`; callers of [`crate::engine::Engine`]
//! and [`crate::hybrid::HybridOrchestrator`] get an [`EngineError`] they
//! can classify. Storage failures keep their detail for logging only.

pub type EngineResult<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed input, rejected before any retrieval work.
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),
    #[error("storage error: {0}")]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
