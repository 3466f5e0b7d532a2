use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use litmon_core::config::OracleConfig;

use crate::error::{RankError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_RETRIES: u32 = 3;

/// The single seam between ranking and the language model. Tests substitute
/// a canned implementation; production uses [`HttpOracle`].
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Messages-API client. The key is read from the environment variable the
/// config names; the key itself never appears in configuration.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    api_key: String,
}

impl HttpOracle {
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| RankError::MissingApiKey(config.api_key_env.clone()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
        })
    }

    #[cfg(test)]
    fn for_tests(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: "test-model".to_string(),
            max_tokens: 256,
            api_key: "test-key".to_string(),
        }
    }
}

#[async_trait]
impl ScoringOracle for HttpOracle {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut attempt = 0u32;
        loop {
            let response = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            // 429 and 529 are transient overload; back off and retry.
            if (status.as_u16() == 429 || status.as_u16() == 529) && attempt < MAX_RETRIES {
                attempt += 1;
                let wait = Duration::from_secs(2u64.pow(attempt));
                warn!(status = status.as_u16(), attempt, "oracle overloaded, backing off");
                tokio::time::sleep(wait).await;
                continue;
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(RankError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let payload: Value = response.json().await?;
            let text = payload["content"]
                .as_array()
                .and_then(|blocks| blocks.first())
                .and_then(|block| block["text"].as_str())
                .ok_or(RankError::EmptyCompletion)?;
            debug!(chars = text.len(), "oracle completion received");
            return Ok(text.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn extracts_first_content_block() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_body(r#"{"content":[{"type":"text","text":"{\"relevance_score\":0.9}"}]}"#)
            .create_async()
            .await;

        let oracle = HttpOracle::for_tests(&server.url());
        let text = oracle.complete("system", "prompt").await.unwrap();
        assert_eq!(text, r#"{"relevance_score":0.9}"#);
    }

    #[tokio::test]
    async fn api_error_carries_status_and_body() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/messages")
            .with_status(400)
            .with_body(r#"{"error":{"message":"bad request"}}"#)
            .create_async()
            .await;

        let oracle = HttpOracle::for_tests(&server.url());
        let err = oracle.complete("system", "prompt").await.unwrap_err();
        match err {
            RankError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("bad request"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_content_is_empty_completion() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/messages")
            .with_body(r#"{"content":[]}"#)
            .create_async()
            .await;

        let oracle = HttpOracle::for_tests(&server.url());
        let err = oracle.complete("system", "prompt").await.unwrap_err();
        assert!(matches!(err, RankError::EmptyCompletion));
    }
}
