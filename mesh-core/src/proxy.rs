//! Tool proxy: calls a resolved dependency's MCP endpoint over HTTP.
//!
//! A `ToolProxy` is the thing an injected dependency slot (see
//! `crate::injector`) actually points at. Constructing one is cheap — the
//! underlying `reqwest::Client` is shared process-wide — so proxies can be
//! replaced on every topology change without connection-pool churn.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock, Weak};
use std::time::Duration;

use async_stream::try_stream;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::is_tracing_enabled;

/// Header carrying the propagated trace/correlation ID (spec.md §6's
/// "core defines the header name and value format"). The value is whatever
/// ID the caller's wrapper is already carrying for this invocation.
pub const TRACE_ID_HEADER: &str = "x-mesh-trace-id";

/// Errors a proxy call can produce, grouped the way a caller needs to decide
/// whether retrying makes sense.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Connection refused, timed out, or otherwise never reached the peer.
    #[error("transport error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// Reached the peer but it didn't speak valid MCP JSON-RPC.
    #[error("protocol error calling {endpoint}: {message}")]
    Protocol { endpoint: String, message: String },
    /// The peer returned a well-formed JSON-RPC error object.
    #[error("{endpoint} returned application error {code}: {message}")]
    Application { endpoint: String, code: i64, message: String },
}

impl ProxyError {
    /// Whether retrying the same call might succeed (transport errors
    /// usually are transient; protocol/application errors are not).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProxyError::Transport { .. })
    }
}

/// Per-proxy behavior knobs.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub headers: HashMap<String, String>,
    pub streaming: bool,
    /// Session-affinity cookie/header value, if the target requires sticky
    /// routing across calls from the same consumer.
    pub session_token: Option<String>,
    /// Trace ID propagated from the caller's wrapper, sent as
    /// [`TRACE_ID_HEADER`] when distributed tracing is enabled.
    pub trace_id: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            base_backoff: Duration::from_millis(200),
            headers: HashMap::new(),
            streaming: false,
            session_token: None,
            trace_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: JsonRpcParams<'a>,
}

#[derive(Debug, Serialize)]
struct JsonRpcParams<'a> {
    name: &'a str,
    arguments: Value,
}

/// A callable handle to one resolved dependency's MCP tool.
#[derive(Debug)]
pub struct ToolProxy {
    client: reqwest::Client,
    endpoint: String,
    function_name: String,
    config: ProxyConfig,
}

impl ToolProxy {
    pub fn new(endpoint: impl Into<String>, function_name: impl Into<String>, config: ProxyConfig) -> Self {
        Self { client: shared_http_client(), endpoint: endpoint.into(), function_name: function_name.into(), config }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Invoke the target tool via an MCP `tools/call` JSON-RPC request,
    /// retrying transport failures up to `config.max_retries` times with
    /// exponential backoff.
    pub async fn call(&self, arguments: Value) -> Result<Value, ProxyError> {
        let mut attempt = 0;
        loop {
            match self.call_once(arguments.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let backoff = self.config.base_backoff * 2u32.saturating_pow(attempt);
                    warn!(endpoint = %self.endpoint, attempt, ?backoff, "proxy call failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once(&self, arguments: Value) -> Result<Value, ProxyError> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "tools/call",
            params: JsonRpcParams { name: &self.function_name, arguments },
        };

        trace!(endpoint = %self.endpoint, function = %self.function_name, "calling dependency");

        let mut request = self.client.post(&self.endpoint).timeout(self.config.timeout).json(&body);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }
        if let Some(token) = &self.config.session_token {
            request = request.header("Cookie", format!("mesh_session={token}"));
        }
        if is_tracing_enabled() {
            if let Some(trace_id) = &self.config.trace_id {
                request = request.header(TRACE_ID_HEADER, trace_id);
            }
        }

        let response = request.send().await.map_err(|source| ProxyError::Transport { endpoint: self.endpoint.clone(), source })?;

        let payload: Value = response
            .json()
            .await
            .map_err(|source| ProxyError::Transport { endpoint: self.endpoint.clone(), source })?;

        if let Some(error) = payload.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown error").to_string();
            return Err(ProxyError::Application { endpoint: self.endpoint.clone(), code, message });
        }

        payload
            .get("result")
            .cloned()
            .ok_or_else(|| ProxyError::Protocol { endpoint: self.endpoint.clone(), message: "response had neither result nor error".to_string() })
    }

    /// Stream a `tools/call` response as newline-delimited `text/event-stream`
    /// chunks, for dependencies whose config negotiates streaming.
    pub fn call_streaming(self: Arc<Self>, arguments: Value) -> impl Stream<Item = Result<Bytes, ProxyError>> {
        try_stream! {
            let body = JsonRpcRequest {
                jsonrpc: "2.0",
                id: 1,
                method: "tools/call",
                params: JsonRpcParams { name: &self.function_name, arguments },
            };

            let mut request = self
                .client
                .post(&self.endpoint)
                .timeout(self.config.timeout)
                .header("Accept", "text/event-stream")
                .json(&body);
            for (key, value) in &self.config.headers {
                request = request.header(key, value);
            }
            if is_tracing_enabled() {
                if let Some(trace_id) = &self.config.trace_id {
                    request = request.header(TRACE_ID_HEADER, trace_id);
                }
            }

            let mut response = request
                .send()
                .await
                .map_err(|source| ProxyError::Transport { endpoint: self.endpoint.clone(), source })?;

            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|source| ProxyError::Transport { endpoint: self.endpoint.clone(), source })?
            {
                yield chunk;
            }
        }
    }
}

/// Process-wide pooled HTTP client (one socket pool for every proxy, per
/// the "HTTP client connection pools are process-wide" invariant).
static HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

fn shared_http_client() -> reqwest::Client {
    HTTP_CLIENT
        .get_or_init(|| reqwest::Client::builder().build().expect("failed to build shared HTTP client"))
        .clone()
}

/// Process-wide weak cache of live proxies, keyed by `(endpoint,
/// function_name)`, so repeated resolutions of the same target reuse one
/// `ToolProxy` instead of constructing duplicates.
type ProxyCacheKey = (String, String);
type ProxyCacheMap = HashMap<ProxyCacheKey, Weak<ToolProxy>>;

static PROXY_CACHE: OnceLock<RwLock<ProxyCacheMap>> = OnceLock::new();

fn proxy_cache() -> &'static RwLock<ProxyCacheMap> {
    PROXY_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Get or create a shared `ToolProxy` for `(endpoint, function_name)`.
pub fn get_or_create_proxy(endpoint: &str, function_name: &str, config: ProxyConfig) -> Arc<ToolProxy> {
    let key = (endpoint.to_string(), function_name.to_string());

    if let Some(existing) = proxy_cache().read().unwrap().get(&key).and_then(Weak::upgrade) {
        return existing;
    }

    let mut cache = proxy_cache().write().unwrap();
    if let Some(existing) = cache.get(&key).and_then(Weak::upgrade) {
        return existing;
    }

    let proxy = Arc::new(ToolProxy::new(endpoint, function_name, config));
    cache.insert(key, Arc::downgrade(&proxy));
    debug!(endpoint, function_name, "created new tool proxy");
    proxy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_error_retryable_only_for_transport() {
        let app_err = ProxyError::Application { endpoint: "x".into(), code: -1, message: "boom".into() };
        assert!(!app_err.is_retryable());
        let proto_err = ProxyError::Protocol { endpoint: "x".into(), message: "bad".into() };
        assert!(!proto_err.is_retryable());
    }

    #[test]
    fn get_or_create_proxy_reuses_live_instance() {
        let a = get_or_create_proxy("http://localhost:9001", "get_date", ProxyConfig::default());
        let b = get_or_create_proxy("http://localhost:9001", "get_date", ProxyConfig::default());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn get_or_create_proxy_distinguishes_by_key() {
        let a = get_or_create_proxy("http://localhost:9001", "get_date", ProxyConfig::default());
        let b = get_or_create_proxy("http://localhost:9002", "get_date", ProxyConfig::default());
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn call_against_unreachable_endpoint_is_a_transport_error() {
        let proxy = ToolProxy::new("http://127.0.0.1:1", "noop", ProxyConfig { max_retries: 0, ..Default::default() });
        let err = proxy.call(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ProxyError::Transport { .. }));
    }

    // Held across awaits deliberately: this test runs on the default
    // single-threaded tokio::test runtime, so the lock only needs to keep
    // other *test functions* from mutating the env var concurrently.
    #[allow(clippy::await_holding_lock)]
    #[tokio::test]
    async fn call_injects_trace_header_only_when_tracing_enabled() {
        use crate::config::tests::TEST_ENV_LOCK;
        let _lock = TEST_ENV_LOCK.lock().unwrap();
        std::env::remove_var("MCP_MESH_DISTRIBUTED_TRACING_ENABLED");

        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": "ok"}).to_string();

        let with_header = server
            .mock("POST", "/rpc")
            .match_header(TRACE_ID_HEADER, "trace-123")
            .with_status(200)
            .with_body(&body)
            .create_async()
            .await;

        std::env::set_var("MCP_MESH_DISTRIBUTED_TRACING_ENABLED", "true");
        let proxy = ToolProxy::new(
            server.url() + "/rpc",
            "get_date",
            ProxyConfig { trace_id: Some("trace-123".to_string()), ..Default::default() },
        );
        proxy.call(serde_json::json!({})).await.unwrap();
        with_header.assert_async().await;

        let without_header = server
            .mock("POST", "/rpc")
            .match_header(TRACE_ID_HEADER, mockito::Matcher::Missing)
            .with_status(200)
            .with_body(&body)
            .create_async()
            .await;

        std::env::set_var("MCP_MESH_DISTRIBUTED_TRACING_ENABLED", "false");
        proxy.call(serde_json::json!({})).await.unwrap();
        without_header.assert_async().await;

        std::env::remove_var("MCP_MESH_DISTRIBUTED_TRACING_ENABLED");
    }
}
