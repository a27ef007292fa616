//! Generative answering.
//!
//! [`Answerer`] assembles the prompt from the selected chunks and sends it
//! to the configured chat model. Without a model, or when the model call
//! fails, it returns the degraded raw-context answer from
//! [`tenant_rag_core::prompt::degraded_answer`].

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

use tenant_rag_core::prompt::{build_prompt, degraded_answer, Answer, Prompt};
use tenant_rag_core::rank::ScoredChunk;

use crate::config::LlmConfig;
use crate::retry;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
enum Backend {
    Disabled,
    OpenAi { api_key: String, url: String },
    Ollama { url: String },
}

#[derive(Debug, Clone)]
pub struct Answerer {
    backend: Backend,
    model: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl Answerer {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let backend = match config.provider.as_str() {
            "disabled" => Backend::Disabled,
            "openai" => Backend::OpenAi {
                api_key: std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("OPENAI_API_KEY not set"))?,
                url: config
                    .url
                    .as_deref()
                    .unwrap_or(OPENAI_DEFAULT_URL)
                    .trim_end_matches('/')
                    .to_string(),
            },
            "ollama" => Backend::Ollama {
                url: config
                    .url
                    .as_deref()
                    .unwrap_or(OLLAMA_DEFAULT_URL)
                    .trim_end_matches('/')
                    .to_string(),
            },
            other => bail!("Unknown llm provider: '{}'", other),
        };
        let model = match backend {
            Backend::Disabled => String::new(),
            _ => config
                .model
                .clone()
                .ok_or_else(|| anyhow!("llm.model required for provider '{}'", config.provider))?,
        };

        Ok(Self {
            backend,
            model,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }

    pub fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
            model: String::new(),
            temperature: 0.0,
            max_retries: 0,
            client: reqwest::Client::new(),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self.backend {
            Backend::Disabled => "disabled",
            Backend::OpenAi { .. } => "openai",
            Backend::Ollama { .. } => "ollama",
        }
    }

    /// Answer `query` from `chunks`. Never fails.
    pub async fn answer(&self, query: &str, chunks: &[ScoredChunk]) -> Answer {
        let prompt = build_prompt(query, chunks);
        let result = match &self.backend {
            Backend::Disabled => return degraded_answer(&prompt),
            Backend::OpenAi { api_key, url } => self.call_openai(api_key, url, &prompt).await,
            Backend::Ollama { url } => self.call_ollama(url, &prompt).await,
        };

        match result {
            Ok((text, model)) => Answer {
                text,
                model,
                degraded: false,
            },
            Err(e) => {
                tracing::warn!(provider = self.mode(), error = %e, "generative model failed; returning raw context");
                degraded_answer(&prompt)
            }
        }
    }

    fn messages(prompt: &Prompt) -> serde_json::Value {
        serde_json::json!([
            { "role": "system", "content": prompt.system },
            { "role": "user", "content": prompt.user_message() },
        ])
    }

    async fn call_openai(&self, api_key: &str, url: &str, prompt: &Prompt) -> Result<(String, String)> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": Self::messages(prompt),
            "temperature": self.temperature,
        });
        let json = retry::post_json(
            &self.client,
            &format!("{}/v1/chat/completions", url),
            Some(api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))?;
        let model = json
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(&self.model);
        Ok((text.trim().to_string(), model.to_string()))
    }

    async fn call_ollama(&self, url: &str, prompt: &Prompt) -> Result<(String, String)> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": Self::messages(prompt),
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let json = retry::post_json(
            &self.client,
            &format!("{}/api/chat", url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;

        let text = json
            .pointer("/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))?;
        Ok((text.trim().to_string(), self.model.clone()))
    }
}
