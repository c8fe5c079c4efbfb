//! HTTP implementation of the risk and briefing client
//!
//! Talks JSON to the risk service's `/predict_risk`, `/generate_briefing` and
//! `/get_sop` endpoints, retrying transient failures with exponential backoff.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    BriefingRequest, BriefingResponse, RiskClient, RiskError, RiskRequest, RiskResponse, SopRequest, SopResponse,
};
use crate::config::RiskConfig;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Parse a `retry-after` header given in whole seconds
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Risk service client over HTTP
pub struct HttpRiskClient {
    base_url: String,
    http: Client,
    timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
}

impl HttpRiskClient {
    /// Create a new client from configuration
    pub fn from_config(config: &RiskConfig) -> Result<Self, RiskError> {
        debug!(?config, "from_config: called");
        let timeout = config.timeout();
        let http = Client::builder().timeout(timeout).build().map_err(RiskError::Network)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            timeout,
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        })
    }

    /// Exponential backoff before retry `attempt` (1-based)
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(2u32.pow(exp))
    }

    /// POST a JSON body and decode the JSON response, retrying transient errors
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, RiskError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "post_json: called");

        let mut last_error = None;
        let mut server_hint: Option<Duration> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // A server retry-after wins over our backoff, bounded by the request timeout
                let backoff = match server_hint.take() {
                    Some(hint) => self.backoff_for(attempt).max(hint.min(self.timeout)),
                    None => self.backoff_for(attempt),
                };
                warn!(
                    %url,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "post_json: retrying after transient error"
                );
                tokio::time::sleep(backoff).await;
            }

            let response = match self.http.post(url.clone()).json(body).send().await {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    debug!(attempt, "post_json: request timed out");
                    last_error = Some(RiskError::Timeout(self.timeout));
                    continue;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "post_json: network error");
                    last_error = Some(RiskError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if is_retryable_status(status) && attempt < self.max_retries {
                if status == 429 {
                    server_hint = retry_after(response.headers());
                }
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "post_json: retryable error");
                last_error = Some(RiskError::ApiError { status, message: text });
                continue;
            }

            if status == 429 {
                debug!("post_json: rate limited (429)");
                return Err(RiskError::RateLimited {
                    retry_after: retry_after(response.headers()).unwrap_or(Duration::from_secs(60)),
                });
            }

            if !response.status().is_success() {
                debug!(%status, "post_json: API error");
                let text = response.text().await.unwrap_or_default();
                return Err(RiskError::ApiError { status, message: text });
            }

            debug!("post_json: success");
            let bytes = response.bytes().await?;
            return serde_json::from_slice(&bytes).map_err(RiskError::Json);
        }

        Err(last_error.unwrap_or_else(|| RiskError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

#[async_trait]
impl RiskClient for HttpRiskClient {
    async fn assess(&self, request: RiskRequest) -> Result<RiskResponse, RiskError> {
        debug!(lat = request.lat, lon = request.lon, vulnerability = %request.vulnerability_status, "assess: called");
        self.post_json("/predict_risk", &request).await
    }

    async fn generate_briefing(&self, request: BriefingRequest) -> Result<String, RiskError> {
        debug!(id = %request.id, "generate_briefing: called");
        let response: BriefingResponse = self.post_json("/generate_briefing", &request).await?;
        if response.briefing.trim().is_empty() {
            debug!("generate_briefing: empty briefing");
            return Err(RiskError::InvalidResponse("Empty briefing".to_string()));
        }
        Ok(response.briefing)
    }

    async fn standard_procedure(&self, request: SopRequest) -> Result<String, RiskError> {
        debug!(query = %request.query, language = %request.language, "standard_procedure: called");
        if request.query.trim().is_empty() {
            debug!("standard_procedure: empty query rejected");
            return Err(RiskError::InvalidRequest("SOP query is empty".to_string()));
        }
        let response: SopResponse = self.post_json("/get_sop", &request).await?;
        Ok(response.sop)
    }
}
