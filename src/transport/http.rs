//! JSON-RPC over HTTP POST
//!
//! Used plainly for capability probes and discovery calls, and with the MCP
//! Streamable HTTP handshake (`initialize` + `notifications/initialized`,
//! `MCP-Session-Id` tracking, `DELETE` on close) for forwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::Transport;
use crate::protocol::{
    InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION,
    RequestId,
};
use crate::{Error, Result};

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_HEADER: &str = "mcp-protocol-version";

/// HTTP transport for JSON-RPC endpoints
pub struct HttpTransport {
    /// HTTP client
    client: Client,
    /// Endpoint URL
    url: String,
    /// Custom headers
    headers: HashMap<String, String>,
    /// Session ID assigned by an MCP server
    session_id: RwLock<Option<String>>,
    /// Request ID counter
    request_id: AtomicU64,
    /// Per-request timeout
    timeout: Duration,
}

impl HttpTransport {
    /// Create a new HTTP transport with a per-request timeout
    pub fn new(url: &str, headers: HashMap<String, String>, timeout: Duration) -> Result<Arc<Self>> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Arc::new(Self {
            client,
            url: url.to_string(),
            headers,
            session_id: RwLock::new(None),
            request_id: AtomicU64::new(1),
            timeout,
        }))
    }

    /// Endpoint URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Perform the MCP handshake
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let request = JsonRpcRequest::new(
            RequestId::Number(0),
            "initialize",
            Some(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
        );

        let result: InitializeResult = self.send_request(&request).await?.into_typed()?;

        self.notify("notifications/initialized", None).await?;
        debug!(url = %self.url, protocol = %result.protocol_version, "MCP session initialized");

        Ok(result)
    }

    fn base_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        // Some servers answer POSTs with a single-event SSE stream
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        headers.insert(
            HeaderName::from_static(PROTOCOL_HEADER),
            HeaderValue::from_static(PROTOCOL_VERSION),
        );

        if let Some(session_id) = self.session_id.read().as_deref()
            && let Ok(value) = HeaderValue::from_str(session_id)
        {
            headers.insert(HeaderName::from_static(SESSION_HEADER), value);
        }

        for (key, value) in &self.headers {
            if let (Ok(k), Ok(v)) = (key.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
                headers.insert(k, v);
            }
        }

        headers
    }

    fn map_send_error(&self, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(self.timeout)
        } else {
            Error::Transport(format!("Request to {} failed: {e}", self.url))
        }
    }

    fn remember_session(&self, response: &Response) {
        if self.session_id.read().is_some() {
            return;
        }
        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            debug!(session_id = %id, url = %self.url, "Stored session ID from response");
            *self.session_id.write() = Some(id.to_string());
        }
    }

    async fn send_request(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        let response = self
            .client
            .post(&self.url)
            .headers(self.base_headers())
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        self.remember_session(&response);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("HTTP {status}: {body}")));
        }

        let is_sse = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));

        let text = response.text().await.map_err(|e| self.map_send_error(&e))?;

        if is_sse {
            parse_sse_response(&text)
        } else {
            serde_json::from_str(&text)
                .map_err(|e| Error::Protocol(format!("Failed to parse response: {e}")))
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(i64::try_from(self.request_id.fetch_add(1, Ordering::Relaxed)).unwrap_or(i64::MAX))
    }
}

/// Extract the JSON-RPC response from an SSE body (first `data:` line)
fn parse_sse_response(body: &str) -> Result<JsonRpcResponse> {
    body.lines()
        .find_map(|line| line.strip_prefix("data:"))
        .ok_or_else(|| Error::Protocol("No data in SSE response".to_string()))
        .and_then(|data| {
            serde_json::from_str(data.trim())
                .map_err(|e| Error::Protocol(format!("Failed to parse SSE data: {e}")))
        })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let request = JsonRpcRequest::new(self.next_id(), method, params);
        self.send_request(&request).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);

        let response = self
            .client
            .post(&self.url)
            .headers(self.base_headers())
            .json(&notification)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %self.url, "Notification failed");
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let session_id = self.session_id.write().take();
        if let Some(id) = session_id {
            // Best effort; servers without session support answer 405
            if let Err(e) = self
                .client
                .delete(&self.url)
                .header(SESSION_HEADER, id)
                .send()
                .await
            {
                debug!(url = %self.url, error = %e, "Session termination failed");
            }
        }

        Ok(())
    }
}
