//! Hybrid remote/local orchestration.
//!
//! A query first goes to the remote tool-augmented answering service,
//! authenticated with a freshly minted identity token. Any failure there
//! (not configured, transport error, timeout, non-2xx status, or a
//! malformed payload) falls through to the local pipeline in
//! [`crate::engine`]. Both stages produce the same [`HybridResponse`];
//! only `source` and the content differ.
//!
//! The outcome is explicit: [`HybridOutcome::Remote`] or
//! [`HybridOutcome::Local`] with the [`FallbackReason`] that sent the
//! query there.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tenant_rag_core::models::{AuditAction, Confidentiality};
use tenant_rag_core::rank::RetrievalResult;

use crate::audit::AuditEntry;
use crate::config::RemoteConfig;
use crate::engine::{Engine, LocalAnswer, Principal};
use crate::error::EngineResult;
use crate::identity::IdentityKey;

/// Offered to the caller when confidence is below this value.
pub const FALLBACK_OPTIONS_THRESHOLD: f32 = 0.2;
pub const FALLBACK_OPTIONS: [&str; 3] = ["DB check", "Escalate to HR", "Rephrase"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Remote,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= 0.7 {
            ConfidenceTier::High
        } else if confidence >= 0.4 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

/// Where an answer came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub doc_id: String,
    #[serde(default)]
    pub chunk_id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub confidentiality: Confidentiality,
}

/// Uniform response of both stages. Every field is always present.
#[derive(Debug, Clone, Serialize)]
pub struct HybridResponse {
    pub query_id: String,
    pub answer: String,
    pub confidence: f32,
    pub confidence_tier: ConfidenceTier,
    pub provenance: Vec<Provenance>,
    pub chunks_used: usize,
    pub tool_calls: Vec<serde_json::Value>,
    pub tool_results: Vec<serde_json::Value>,
    pub fallback_options: Vec<String>,
    pub model: String,
    pub degraded: bool,
    pub source: Source,
}

/// Why the local stage answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum FallbackReason {
    NotConfigured,
    Timeout,
    Transport,
    Status(u16),
    Malformed,
}

#[derive(Debug, Clone)]
pub enum HybridOutcome {
    Remote(HybridResponse),
    Local {
        response: HybridResponse,
        reason: FallbackReason,
    },
}

impl HybridOutcome {
    pub fn response(&self) -> &HybridResponse {
        match self {
            HybridOutcome::Remote(response) => response,
            HybridOutcome::Local { response, .. } => response,
        }
    }

    pub fn into_response(self) -> HybridResponse {
        match self {
            HybridOutcome::Remote(response) => response,
            HybridOutcome::Local { response, .. } => response,
        }
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            HybridOutcome::Remote(_) => None,
            HybridOutcome::Local { reason, .. } => Some(*reason),
        }
    }
}

/// Payload sent to the remote answering service.
#[derive(Debug, Serialize)]
struct RemoteRequest<'a> {
    query: &'a str,
    tenant_id: &'a str,
    role: &'a str,
    top_k: usize,
}

/// Payload expected back. `answer` and `confidence` are required.
#[derive(Debug, Deserialize)]
struct RemoteAnswer {
    answer: String,
    confidence: f32,
    #[serde(default)]
    provenance: Vec<Provenance>,
    #[serde(default)]
    tool_calls: Vec<serde_json::Value>,
    #[serde(default)]
    tool_results: Vec<serde_json::Value>,
    #[serde(default)]
    model: Option<String>,
}

/// HTTP client for the remote answering service.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    url: String,
    timeout: Duration,
    key: IdentityKey,
    client: reqwest::Client,
}

impl RemoteClient {
    pub fn new(url: impl Into<String>, timeout: Duration, key: IdentityKey) -> Self {
        Self {
            url: url.into(),
            timeout,
            key,
            client: reqwest::Client::new(),
        }
    }

    /// Build from config. Returns `None` when no URL is configured or no
    /// signing key is available.
    pub fn from_config(config: &RemoteConfig, key: Option<IdentityKey>) -> Option<Self> {
        let url = config.url.as_ref()?;
        let Some(key) = key else {
            tracing::warn!(url = %url, "remote.url is set but no identity secret is available; remote stage disabled");
            return None;
        };
        Some(Self::new(url.clone(), Duration::from_millis(config.timeout_ms), key))
    }

    async fn ask(
        &self,
        principal: &Principal,
        query: &str,
        top_k: usize,
    ) -> Result<RemoteAnswer, FallbackReason> {
        let token = self
            .key
            .mint(&principal.user_id, &principal.tenant_id, &principal.role)
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to mint identity token");
                FallbackReason::NotConfigured
            })?;
        let body = RemoteRequest {
            query,
            tenant_id: &principal.tenant_id,
            role: principal.role.as_str(),
            top_k,
        };

        let call = async {
            let response = self
                .client
                .post(&self.url)
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        FallbackReason::Timeout
                    } else {
                        FallbackReason::Transport
                    }
                })?;
            let status = response.status();
            if !status.is_success() {
                return Err(FallbackReason::Status(status.as_u16()));
            }
            let bytes = response.bytes().await.map_err(|_| FallbackReason::Transport)?;
            serde_json::from_slice::<RemoteAnswer>(&bytes).map_err(|_| FallbackReason::Malformed)
        };

        let answer = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| FallbackReason::Timeout)??;
        if !answer.confidence.is_finite() || !(0.0..=1.0).contains(&answer.confidence) {
            return Err(FallbackReason::Malformed);
        }
        Ok(answer)
    }
}

/// Two-stage query pipeline: remote first, local second.
pub struct HybridOrchestrator {
    engine: Arc<Engine>,
    remote: Option<RemoteClient>,
}

impl HybridOrchestrator {
    pub fn new(engine: Arc<Engine>, remote: Option<RemoteClient>) -> Self {
        Self { engine, remote }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote.is_some()
    }

    /// Answer a query. Malformed input is rejected before either stage
    /// runs. The audit record is written after the response is complete.
    pub async fn query(
        &self,
        principal: &Principal,
        query: &str,
        top_k: Option<usize>,
    ) -> EngineResult<HybridOutcome> {
        let top_k = self.engine.validate_query(principal, query, top_k).await?;
        let query_id = Uuid::new_v4().to_string();

        let reason = match &self.remote {
            None => FallbackReason::NotConfigured,
            Some(remote) => match remote.ask(principal, query, top_k).await {
                Ok(answer) => {
                    let response = remote_response(query_id, answer);
                    self.record(principal, query, &response).await;
                    return Ok(HybridOutcome::Remote(response));
                }
                Err(reason) => {
                    tracing::warn!(
                        tenant_id = %principal.tenant_id,
                        ?reason,
                        "remote answering failed; using local pipeline"
                    );
                    reason
                }
            },
        };

        let local = self.engine.answer_locally(principal, query, Some(top_k)).await?;
        let response = local_response(query_id, local);
        self.record(principal, query, &response).await;
        Ok(HybridOutcome::Local { response, reason })
    }

    async fn record(&self, principal: &Principal, query: &str, response: &HybridResponse) {
        self.engine
            .audit()
            .record(AuditEntry {
                user_id: &principal.user_id,
                tenant_id: &principal.tenant_id,
                role: principal.role.as_str(),
                action: AuditAction::Query,
                query_text: query,
                chunk_ids: response
                    .provenance
                    .iter()
                    .map(|p| p.chunk_id.clone())
                    .filter(|id| !id.is_empty())
                    .collect(),
                confidence: response.confidence,
            })
            .await;
    }
}

fn fallback_options(confidence: f32) -> Vec<String> {
    if confidence < FALLBACK_OPTIONS_THRESHOLD {
        FALLBACK_OPTIONS.iter().map(|s| s.to_string()).collect()
    } else {
        Vec::new()
    }
}

fn provenance_of(retrieval: &RetrievalResult) -> Vec<Provenance> {
    retrieval
        .chunks
        .iter()
        .map(|s| Provenance {
            doc_id: s.chunk.doc_id.clone(),
            chunk_id: s.chunk.id.clone(),
            score: s.score,
            confidentiality: s.chunk.confidentiality,
        })
        .collect()
}

fn local_response(query_id: String, local: LocalAnswer) -> HybridResponse {
    let confidence = local.retrieval.confidence;
    HybridResponse {
        query_id,
        answer: local.answer.text,
        confidence,
        confidence_tier: ConfidenceTier::from_confidence(confidence),
        provenance: provenance_of(&local.retrieval),
        chunks_used: local.retrieval.chunks.len(),
        tool_calls: Vec::new(),
        tool_results: Vec::new(),
        fallback_options: fallback_options(confidence),
        model: local.answer.model,
        degraded: local.answer.degraded,
        source: Source::Local,
    }
}

fn remote_response(query_id: String, remote: RemoteAnswer) -> HybridResponse {
    HybridResponse {
        query_id,
        chunks_used: remote.provenance.len(),
        confidence_tier: ConfidenceTier::from_confidence(remote.confidence),
        fallback_options: fallback_options(remote.confidence),
        answer: remote.answer,
        confidence: remote.confidence,
        provenance: remote.provenance,
        tool_calls: remote.tool_calls,
        tool_results: remote.tool_results,
        model: remote.model.unwrap_or_else(|| "remote".to_string()),
        degraded: false,
        source: Source::Remote,
    }
}
