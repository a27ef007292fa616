//! Embedding providers.
//!
//! [`Embedder`] turns text into vectors. It delegates to a configured
//! provider and otherwise falls back to the deterministic SHA-256 vector
//! from [`tenant_rag_core::embedding::hash_embedding`].
//!
//! # Providers
//!
//! | `embedding.provider` | Endpoint |
//! |----------------------|----------|
//! | `"disabled"` | none, fallback only |
//! | `"openai"` | `POST {url}/v1/embeddings` with `OPENAI_API_KEY` |
//! | `"ollama"` | `POST {url}/api/embed` |
//!
//! Provider failures never reach the caller. A failed or timed-out call is
//! logged and the text is embedded with the fallback instead; the returned
//! [`Embedding`] records which path produced it.

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

use tenant_rag_core::embedding::{hash_embedding, FALLBACK_MODEL};

use crate::config::EmbeddingConfig;
use crate::retry;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// A vector plus the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
    /// True when the fallback produced this vector.
    pub degraded: bool,
}

#[derive(Debug, Clone)]
enum Backend {
    Disabled,
    OpenAi {
        api_key: String,
        model: String,
        url: String,
    },
    Ollama {
        model: String,
        url: String,
    },
}

/// Text-to-vector service with a deterministic fallback.
#[derive(Debug, Clone)]
pub struct Embedder {
    backend: Backend,
    client: reqwest::Client,
    fallback_dims: usize,
    max_retries: u32,
}

impl Embedder {
    /// Build from config. The OpenAI key is read from the environment here,
    /// once; a missing key is a configuration error.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let model = || {
            config
                .model
                .clone()
                .ok_or_else(|| anyhow!("embedding.model required for provider '{}'", config.provider))
        };
        let backend = match config.provider.as_str() {
            "disabled" => Backend::Disabled,
            "openai" => Backend::OpenAi {
                api_key: std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("OPENAI_API_KEY not set"))?,
                model: model()?,
                url: trim_url(config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL)),
            },
            "ollama" => Backend::Ollama {
                model: model()?,
                url: trim_url(config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL)),
            },
            other => bail!("Unknown embedding provider: '{}'", other),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            backend,
            client,
            fallback_dims: config.fallback_dims,
            max_retries: config.max_retries,
        })
    }

    /// An embedder that only uses the fallback.
    pub fn disabled(fallback_dims: usize) -> Self {
        Self {
            backend: Backend::Disabled,
            client: reqwest::Client::new(),
            fallback_dims,
            max_retries: 0,
        }
    }

    /// `disabled`, `openai`, or `ollama`.
    pub fn mode(&self) -> &'static str {
        match self.backend {
            Backend::Disabled => "disabled",
            Backend::OpenAi { .. } => "openai",
            Backend::Ollama { .. } => "ollama",
        }
    }

    pub fn fallback(&self, text: &str) -> Embedding {
        Embedding {
            vector: hash_embedding(text, self.fallback_dims),
            model: FALLBACK_MODEL.to_string(),
            degraded: true,
        }
    }

    /// Embed one text. Never fails.
    pub async fn embed(&self, text: &str) -> Embedding {
        let mut batch = self.embed_batch(&[text.to_string()]).await;
        batch.pop().unwrap_or_else(|| self.fallback(text))
    }

    /// Embed a batch in input order. Never fails; on any provider error the
    /// whole batch uses the fallback.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Embedding> {
        if texts.is_empty() {
            return Vec::new();
        }
        let delegated = match &self.backend {
            Backend::Disabled => None,
            Backend::OpenAi {
                api_key,
                model,
                url,
            } => Some(self.call_openai(api_key, model, url, texts).await.map(|v| (v, model))),
            Backend::Ollama { model, url } => {
                Some(self.call_ollama(model, url, texts).await.map(|v| (v, model)))
            }
        };

        match delegated {
            Some(Ok((vectors, model))) if vectors.len() == texts.len() => vectors
                .into_iter()
                .map(|vector| Embedding {
                    vector,
                    model: model.clone(),
                    degraded: false,
                })
                .collect(),
            Some(Ok((vectors, _))) => {
                tracing::warn!(
                    expected = texts.len(),
                    got = vectors.len(),
                    "embedding provider returned wrong batch size; using fallback"
                );
                texts.iter().map(|t| self.fallback(t)).collect()
            }
            Some(Err(e)) => {
                tracing::warn!(provider = self.mode(), error = %e, "embedding provider failed; using fallback");
                texts.iter().map(|t| self.fallback(t)).collect()
            }
            None => texts.iter().map(|t| self.fallback(t)).collect(),
        }
    }

    async fn call_openai(
        &self,
        api_key: &str,
        model: &str,
        url: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": model, "input": texts });
        let json = retry::post_json(
            &self.client,
            &format!("{}/v1/embeddings", url),
            Some(api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }

    async fn call_ollama(&self, model: &str, url: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": model, "input": texts });
        let json = retry::post_json(
            &self.client,
            &format!("{}/api/embed", url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn trim_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn json_to_vec(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Extract `data[].embedding`, ordered by `index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let vector = item
            .get("embedding")
            .and_then(json_to_vec)
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(|e| json_to_vec(e).ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_uses_fallback() {
        let embedder = Embedder::disabled(64);
        let a = embedder.embed("sick leave").await;
        let b = embedder.embed("sick leave").await;
        assert_eq!(a, b);
        assert!(a.degraded);
        assert_eq!(a.model, FALLBACK_MODEL);
        assert_eq!(a.vector.len(), 64);
    }

    #[tokio::test]
    async fn test_unreachable_provider_falls_back() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("nomic-embed-text".to_string()),
            url: Some("http://127.0.0.1:1".to_string()),
            fallback_dims: 32,
            max_retries: 0,
            timeout_secs: 2,
        };
        let embedder = Embedder::from_config(&config).unwrap();
        assert_eq!(embedder.mode(), "ollama");
        let got = embedder.embed_batch(&["a".to_string(), "b".to_string()]).await;
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|e| e.degraded));
        assert_eq!(got[0].vector, hash_embedding("a", 32));
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs[0], vec![1.0, 0.0]);
    }

    #[test]
    fn test_parse_ollama_rejects_garbage() {
        assert!(parse_ollama_response(&serde_json::json!({"embeddings": "nope"})).is_err());
        let ok = parse_ollama_response(&serde_json::json!({"embeddings": [[0.1, 0.2]]})).unwrap();
        assert_eq!(ok.len(), 1);
    }
}
