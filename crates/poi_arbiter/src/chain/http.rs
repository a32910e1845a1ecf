//! HTTP client shared by every remote capability: GraphQL datasets, JSON-RPC ledger, indexer status.
//!
//! Requests are spaced by a minimum interval. Retries are opt-in (`max_retries = 0` by default):
//! a failed call surfaces to the caller for that unit of work only.

use crate::chain::cache::CacheError;
use crate::chain::normalize::NormalizeError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

const TIMEOUT_SECS: u64 = 30;
const RATE_LIMIT_MS: u64 = 0;
const MAX_RETRIES: u32 = 0;
const RETRY_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 60_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpConfig {
    pub timeout_secs: u64,
    /// Minimum spacing between outbound requests.
    pub rate_limit_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: TIMEOUT_SECS,
            rate_limit_ms: RATE_LIMIT_MS,
            max_retries: MAX_RETRIES,
            retry_backoff_ms: RETRY_BACKOFF_MS,
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
    #[error("normalize: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("api error: status {0} body {1}")]
    Api(u16, String),
    #[error("graphql: {0}")]
    GraphQl(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("missing: {0}")]
    Missing(String),
    #[error("divergent POI for {key}: first saw {first}, now {now}")]
    Divergent {
        key: String,
        first: String,
        now: String,
    },
}

impl FetchError {
    pub(crate) fn malformed(what: &str, e: impl std::fmt::Display) -> Self {
        FetchError::Malformed(format!("{}: {}", what, e))
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<serde_json::Value>,
    errors: Option<Vec<GraphQlErrorEntry>>,
}

#[derive(Deserialize)]
struct GraphQlErrorEntry {
    message: Option<String>,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Rate-limited JSON-over-HTTP client.
pub struct HttpClient {
    config: HttpConfig,
    client: reqwest::Client,
    last_request: Mutex<Option<OffsetDateTime>>,
    rpc_id: AtomicU64,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            config,
            client,
            last_request: Mutex::new(None),
            rpc_id: AtomicU64::new(1),
        })
    }

    /// Claim the next send slot and return how long to wait for it. Slots are
    /// reserved under the lock, so concurrent callers queue up `rate_limit_ms` apart.
    fn reserve_slot(&self, now: OffsetDateTime) -> Duration {
        let spacing = time::Duration::milliseconds(self.config.rate_limit_ms as i64);
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let slot = match *last {
            Some(prev) if prev + spacing > now => prev + spacing,
            _ => now,
        };
        *last = Some(slot);
        let wait_ms = (slot - now).whole_milliseconds().max(0);
        Duration::from_millis(u64::try_from(wait_ms).unwrap_or(u64::MAX))
    }

    async fn rate_limit(&self) {
        if self.config.rate_limit_ms == 0 {
            return;
        }
        let wait = self.reserve_slot(OffsetDateTime::now_utc());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .config
            .retry_backoff_ms
            .saturating_mul(factor)
            .min(MAX_BACKOFF_MS);
        Duration::from_millis(ms)
    }

    /// POST a JSON body; returns the raw response text of a 2xx reply.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<String, FetchError> {
        self.rate_limit().await;

        let mut last_err = None;
        for attempt in 0..=self.config.max_retries {
            match self.client.post(url).json(body).send().await {
                Ok(r) => {
                    let status = r.status();
                    match r.text().await {
                        Ok(text) if status.is_success() => return Ok(text),
                        Ok(text) => last_err = Some(FetchError::Api(status.as_u16(), text)),
                        Err(e) => last_err = Some(FetchError::Request(e)),
                    }
                }
                Err(e) => last_err = Some(FetchError::Request(e)),
            }
            if attempt < self.config.max_retries {
                let wait = self.backoff(attempt);
                warn!(attempt, ms = wait.as_millis() as u64, %url, "retry after error");
                tokio::time::sleep(wait).await;
            }
        }
        Err(last_err.unwrap_or(FetchError::Api(0, "unknown".to_string())))
    }

    /// Run a GraphQL query and return its `data` object. A non-empty `errors` array is an error.
    pub async fn graphql(
        &self,
        url: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, FetchError> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        let text = self.post_json(url, &body).await?;
        let parsed: GraphQlResponse =
            serde_json::from_str(&text).map_err(|e| FetchError::malformed("graphql body", e))?;
        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            let message = errors
                .into_iter()
                .map(|e| e.message.unwrap_or_else(|| "GraphQL error".to_string()))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FetchError::GraphQl(message));
        }
        debug!(%url, "graphql ok");
        parsed
            .data
            .ok_or_else(|| FetchError::Malformed("graphql response without data".to_string()))
    }

    /// Call a JSON-RPC 2.0 method and return its `result` (which may be JSON null).
    pub async fn json_rpc(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, FetchError> {
        let id = self.rpc_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let text = self.post_json(url, &body).await?;
        let parsed: RpcResponse =
            serde_json::from_str(&text).map_err(|e| FetchError::malformed("rpc body", e))?;
        if let Some(err) = parsed.error {
            return Err(FetchError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        debug!(%method, "rpc ok");
        Ok(parsed.result.unwrap_or(serde_json::Value::Null))
    }
}

/// Deserialize the `data.<field>` member of a GraphQL response.
pub(crate) fn take_field<T: serde::de::DeserializeOwned>(
    mut data: serde_json::Value,
    field: &str,
) -> Result<T, FetchError> {
    let value = data
        .get_mut(field)
        .map(serde_json::Value::take)
        .unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).map_err(|e| FetchError::malformed(field, e))
}
