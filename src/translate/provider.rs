//! HTTP translation provider client.
//! Connection pooling via reqwest, simple token-bucket rate limiting,
//! bounded retry. Speaks the REST translate API: one POST per text,
//! target language in the query string.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{TranslateError, Translator};
use crate::config::ProviderConfig;
use crate::language::Language;

pub struct HttpTranslator {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    /// Simple token-bucket: tracks the next allowed request time.
    next_allowed: Arc<tokio::sync::Mutex<Instant>>,
    min_interval: Duration,
}

impl HttpTranslator {
    pub fn new(config: &ProviderConfig) -> Result<Self, TranslateError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| TranslateError::Api("translator API key not configured".into()))?;

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TranslateError::Api(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            endpoint: config.endpoint.clone(),
            next_allowed: Arc::new(tokio::sync::Mutex::new(Instant::now())),
            min_interval: config.min_interval,
        })
    }

    /// Wait until the rate limiter allows a request.
    async fn rate_limit_wait(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep(*next - now).await;
        }
        *next = Instant::now() + self.min_interval;
    }

    /// Provider wire tags. Chinese is served in the traditional script.
    fn wire_tag(language: Language) -> &'static str {
        match language {
            Language::Zh => "zh-Hant",
            Language::Es => "es",
            Language::En => "en",
        }
    }

    /// Send request with retry logic.
    /// 429: Retry-After or 1s/2s/4s (max 3).
    /// 5xx: exponential backoff (max 2).
    /// Timeout: immediate retry once.
    async fn send_with_retry(
        &self,
        url: &str,
        body: &serde_json::Value,
        cancel_token: &CancellationToken,
    ) -> Result<reqwest::Response, TranslateError> {
        let mut attempt: u32 = 0;
        let max_429_retries: u32 = 3;
        let max_5xx_retries: u32 = 2;
        let mut timeout_retried = false;

        loop {
            if cancel_token.is_cancelled() {
                return Err(TranslateError::Cancelled);
            }

            let result = self
                .http
                .post(url)
                .header("Ocp-Apim-Subscription-Key", &self.api_key)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(resp);
                }
                Ok(resp) if resp.status().as_u16() == 429 => {
                    if attempt >= max_429_retries {
                        return Err(TranslateError::RateLimited { retry_after_ms: 0 });
                    }
                    let wait = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| Duration::from_secs(1 << attempt));
                    warn!(attempt, wait_ms = wait.as_millis() as u64, "429 rate limited, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel_token.cancelled() => return Err(TranslateError::Cancelled),
                    }
                    attempt += 1;
                }
                Ok(resp) if resp.status().is_server_error() => {
                    if attempt >= max_5xx_retries {
                        return Err(TranslateError::Api(format!(
                            "server error: {}",
                            resp.status()
                        )));
                    }
                    let wait = Duration::from_millis(500 * (1 << attempt));
                    warn!(
                        attempt,
                        status = resp.status().as_u16(),
                        wait_ms = wait.as_millis() as u64,
                        "5xx error, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel_token.cancelled() => return Err(TranslateError::Cancelled),
                    }
                    attempt += 1;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body_text = resp.text().await.unwrap_or_default();
                    return Err(TranslateError::Api(format!(
                        "unexpected status {}: {}",
                        status,
                        body_text.chars().take(200).collect::<String>()
                    )));
                }
                Err(e) if e.is_timeout() => {
                    if timeout_retried {
                        return Err(TranslateError::Timeout);
                    }
                    warn!("request timeout, retrying once");
                    timeout_retried = true;
                }
                Err(e) => {
                    return Err(TranslateError::Api(e.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
        cancel: &CancellationToken,
    ) -> Result<String, TranslateError> {
        self.rate_limit_wait().await;

        if cancel.is_cancelled() {
            return Err(TranslateError::Cancelled);
        }

        let url = format!(
            "{}/translate?api-version=3.0&from={}&to={}",
            self.endpoint,
            Self::wire_tag(source),
            Self::wire_tag(target),
        );
        let body = serde_json::json!([{ "text": text }]);

        let response = self.send_with_retry(&url, &body, cancel).await?;

        let rows: Vec<TranslateRow> = tokio::select! {
            parsed = response.json() => parsed.map_err(|e| TranslateError::Api(e.to_string()))?,
            _ = cancel.cancelled() => return Err(TranslateError::Cancelled),
        };

        rows.first()
            .and_then(|row| row.translations.first())
            .map(|t| t.text.clone())
            .ok_or_else(|| TranslateError::Api("empty translation response".into()))
    }
}

// --- Provider response types ---

#[derive(Deserialize)]
struct TranslateRow {
    translations: Vec<TranslatedText>,
}

#[derive(Deserialize)]
struct TranslatedText {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_map_chinese_to_traditional() {
        assert_eq!(HttpTranslator::wire_tag(Language::Zh), "zh-Hant");
        assert_eq!(HttpTranslator::wire_tag(Language::En), "en");
        assert_eq!(HttpTranslator::wire_tag(Language::Es), "es");
    }

    #[test]
    fn missing_key_is_an_error() {
        let cfg = ProviderConfig::default();
        assert!(HttpTranslator::new(&cfg).is_err());
    }
}
