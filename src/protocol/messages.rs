//! JSON-RPC message types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Content, Info, Resource, ResourceContents, Tool};
use crate::{Error, Result};

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC notification (no id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Result (on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Create an error response from a crate error
    #[must_use]
    pub fn from_error(id: Option<RequestId>, error: &Error) -> Self {
        Self::error(id, error.to_rpc_code(), error.to_string())
    }

    /// Unwrap the result, turning a JSON-RPC error into [`Error::JsonRpc`]
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(Error::JsonRpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }

    /// Unwrap and deserialize the result
    pub fn into_typed<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.into_result()?)?)
    }
}

/// JSON-RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Request ID (string or number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String ID
    String(String),
    /// Numeric ID
    Number(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

// ============================================================================
// Initialize
// ============================================================================

/// Initialize result (only the fields the proxy reads)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol version
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities
    #[serde(default)]
    pub capabilities: Value,
    /// Server info
    #[serde(rename = "serverInfo", default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<Info>,
}

// ============================================================================
// Tools
// ============================================================================

/// Tools list result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// List of tools
    pub tools: Vec<Tool>,
    /// Next cursor for pagination
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Tools call request params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCallParams {
    /// Tool name
    pub name: String,
    /// Tool arguments
    #[serde(default)]
    pub arguments: Value,
}

/// Tools call result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsCallResult {
    /// Content items
    pub content: Vec<Content>,
    /// Whether result is an error
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolsCallResult {
    /// Successful single-text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
        }
    }

    /// Error-flagged single-text result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
        }
    }

    /// Concatenated text of all text blocks
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Resources list result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesListResult {
    /// List of resources
    pub resources: Vec<Resource>,
    /// Next cursor for pagination
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Resources read request params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesReadParams {
    /// URI of the resource to read
    pub uri: String,
}

/// Resources read result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesReadResult {
    /// Resource contents
    pub contents: Vec<ResourceContents>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest::new(RequestId::Number(1), "tools/list", None);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}));
    }

    #[test]
    fn test_into_result_maps_rpc_error() {
        let response = JsonRpcResponse::error(Some(RequestId::Number(1)), -32601, "nope");
        match response.into_result() {
            Err(Error::JsonRpc { code, message, .. }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_into_typed() {
        let response = JsonRpcResponse::success(
            RequestId::Number(1),
            json!({"content": [{"type": "text", "text": "hi"}], "isError": false}),
        );
        let result: ToolsCallResult = response.into_typed().unwrap();
        assert_eq!(result.joined_text(), "hi");
    }

    #[test]
    fn test_call_result_error_flag() {
        let value = serde_json::to_value(ToolsCallResult::error("boom")).unwrap();
        assert_eq!(value["isError"], true);
        assert_eq!(value["content"][0]["text"], "boom");
    }

    #[test]
    fn test_request_params_wire_shape() {
        let call = serde_json::to_value(ToolsCallParams {
            name: "echo".into(),
            arguments: json!({"text": "hi"}),
        })
        .unwrap();
        assert_eq!(call, json!({"name": "echo", "arguments": {"text": "hi"}}));

        let read = serde_json::to_value(ResourcesReadParams {
            uri: "mem://greeting".into(),
        })
        .unwrap();
        assert_eq!(read, json!({"uri": "mem://greeting"}));
    }
}
