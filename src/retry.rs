//! JSON-over-HTTP calls with exponential backoff.
//!
//! Shared by the embedding and generative-model providers.
//!
//! Retry strategy:
//! - HTTP 429 or 5xx → retry with backoff 1s, 2s, 4s, ... (capped at 32s)
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error or timeout → retry

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

/// POST `body` to `url` and return the parsed JSON response.
///
/// Makes at most `max_retries + 1` attempts. `label` names the provider in
/// error messages.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(provider = label, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} request failed: {}", label, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", label)))
}
