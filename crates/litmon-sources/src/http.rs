use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{Result, SourceError};

/// HTTP client with a minimum inter-request interval and bounded retries.
///
/// Each adapter owns its own instance, so per-source rate limiter state is
/// never shared across sources. A 429 response waits 2, 3, 5 seconds
/// (2^attempt + 1) before retrying; transport errors back off exponentially.
/// Both stop at `max_retries` and surface a source-scoped error.
pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    max_retries: u32,
}

impl RateLimitedClient {
    pub fn new(min_interval: Duration, max_retries: u32, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
            max_retries,
        }
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.get_with_query::<[(&str, &str); 0]>(url, []).await
    }

    pub async fn get_with_query<Q>(&self, url: &str, query: Q) -> Result<String>
    where
        Q: IntoIterator + Clone,
        Q::Item: serde::Serialize,
    {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            let pairs: Vec<Q::Item> = query.clone().into_iter().collect();
            let resp = self.client.get(url).query(&pairs).send().await;
            match resp {
                Ok(r) if r.status() == 429 => {
                    if attempt >= self.max_retries {
                        return Err(SourceError::RateLimit(url.to_string(), attempt));
                    }
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(2u64.pow(attempt) + 1);
                    debug!(url, wait, "rate limited, backing off");
                    sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    return Err(SourceError::Api(
                        url.to_string(),
                        format!("HTTP {status}: {body}"),
                    ));
                }
                Ok(r) => return r.text().await.map_err(SourceError::Http),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(SourceError::Http(e));
                    }
                    let backoff = 2u64.pow(attempt);
                    debug!(url, backoff, "transport error, retrying");
                    sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.get(url).await?;
        serde_json::from_str(&text).map_err(|e| SourceError::Parse(e.to_string()))
    }

    pub async fn get_json_with_query<T, Q>(&self, url: &str, query: Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: IntoIterator + Clone,
        Q::Item: serde::Serialize,
    {
        let text = self.get_with_query(url, query).await?;
        serde_json::from_str(&text).map_err(|e| SourceError::Parse(e.to_string()))
    }
}
