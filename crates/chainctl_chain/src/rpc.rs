use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use chainctl_core::{ChainError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: serde_json::Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    /// Converts the envelope into its result, mapping a node-side error to
    /// [`ChainError::Rpc`].
    pub fn into_result<T: DeserializeOwned>(self, method: &str) -> Result<T> {
        if let Some(err) = self.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let value = self.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value).map_err(|e| ChainError::Rpc {
            code: -32700,
            message: format!("unexpected {method} result: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Minimal JSON-RPC client over HTTP.
///
/// Connection failures and timeouts become
/// [`ChainError::NodeUnavailable`]. No retries are performed here.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| ChainError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: http_url(&url.into()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, id);
        debug!(url = %self.url, method, id, "rpc request");

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;
        if !response.status().is_success() {
            return Err(ChainError::NodeUnavailable(format!(
                "{} returned HTTP {}",
                self.url,
                response.status()
            )));
        }
        let envelope: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(e))?;
        envelope.into_result(method)
    }

    fn unavailable(&self, err: reqwest::Error) -> ChainError {
        if err.is_decode() {
            return ChainError::Rpc {
                code: -32700,
                message: format!("{} sent a malformed response: {err}", self.url),
            };
        }
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection refused".to_string()
        } else {
            err.to_string()
        };
        ChainError::NodeUnavailable(format!("{} ({reason})", self.url))
    }
}

/// Node endpoints are often configured as websocket URLs; JSON-RPC calls go
/// over the matching http scheme.
fn http_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}

// ---------------------------------------------------------------------------
// Quantity helpers
// ---------------------------------------------------------------------------

/// Parses a `0x`-prefixed hex quantity.
pub fn parse_quantity(text: &str) -> Result<u128> {
    let body = text.strip_prefix("0x").unwrap_or(text);
    if body.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(body, 16).map_err(|e| ChainError::Rpc {
        code: -32700,
        message: format!("invalid quantity {text}: {e}"),
    })
}

/// Formats a value as a minimal `0x` hex quantity.
pub fn to_quantity(value: u128) -> String {
    format!("{value:#x}")
}
