//! Forward resolvers

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{ForwardResolver, McpSession, Tool};
use crate::protocol::{self, ResourceContents, ToolsCallResult};
use crate::types::{
    ForwardReference, InputSchema, REMOTE_RESOURCE_TYPE, REMOTE_TOOL_TYPE, ResourceReference,
    ToolReference,
};
use crate::{Error, Result};

/// Resolver for a forward backed by a remote MCP server.
///
/// Every operation opens its own session. Tool calls through one resolver are
/// serialized by `call_lock`.
pub struct McpForwardResolver {
    forward: ForwardReference,
    timeout: Duration,
    call_lock: Arc<Mutex<()>>,
}

impl McpForwardResolver {
    /// Create a resolver for `forward`
    #[must_use]
    pub fn new(forward: ForwardReference, timeout: Duration) -> Self {
        Self {
            forward,
            timeout,
            call_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The forward this resolver proxies
    #[must_use]
    pub fn forward(&self) -> &ForwardReference {
        &self.forward
    }

    fn unavailable(&self, e: &Error) -> Error {
        Error::ServiceUnavailable(format!(
            "Forward '{}' at {} is unavailable: {e}",
            self.forward.key(),
            self.forward.address
        ))
    }

    fn to_tool_reference(&self, tool: protocol::Tool) -> ToolReference {
        ToolReference {
            id: None,
            uri: self.forward.address.clone(),
            description: tool.description.unwrap_or_default(),
            input_schema: InputSchema::from_json_schema(&tool.input_schema),
            name: tool.name,
            tool_type: REMOTE_TOOL_TYPE.to_string(),
            namespace: self.forward.namespace.clone(),
            labels: self.forward.labels.clone(),
        }
    }

    fn to_resource_reference(&self, resource: protocol::Resource) -> ResourceReference {
        ResourceReference {
            id: None,
            location: resource.uri,
            resource_type: REMOTE_RESOURCE_TYPE.to_string(),
            name: resource.name,
            description: resource.description.unwrap_or_default(),
            mime_type: resource.mime_type,
            namespace: self.forward.namespace.clone(),
            labels: self.forward.labels.clone(),
        }
    }
}

#[async_trait]
impl ForwardResolver for McpForwardResolver {
    async fn list_resources(&self) -> Result<Vec<ResourceReference>> {
        let session = McpSession::open(&self.forward.address, self.timeout)
            .await
            .map_err(|e| self.unavailable(&e))?;
        let listed = session.list_resources().await;
        session.close().await;

        let resources = listed.map_err(|e| self.unavailable(&e))?;
        debug!(forward = %self.forward.key(), count = resources.len(), "Listed forward resources");
        Ok(resources
            .into_iter()
            .map(|r| self.to_resource_reference(r))
            .collect())
    }

    async fn list_tools(&self) -> Result<Vec<ToolReference>> {
        let session = McpSession::open(&self.forward.address, self.timeout)
            .await
            .map_err(|e| self.unavailable(&e))?;
        let listed = session.list_tools().await;
        session.close().await;

        let tools = listed.map_err(|e| self.unavailable(&e))?;
        debug!(forward = %self.forward.key(), count = tools.len(), "Listed forward tools");
        Ok(tools.into_iter().map(|t| self.to_tool_reference(t)).collect())
    }

    async fn read(
        &self,
        _arguments: &Map<String, Value>,
        resource: &ResourceReference,
    ) -> Result<Vec<ResourceContents>> {
        let session = McpSession::open(&self.forward.address, self.timeout)
            .await
            .map_err(|e| self.unavailable(&e))?;
        let read = session.read_resource(&resource.location).await;
        session.close().await;

        let contents = read.map_err(|e| self.unavailable(&e))?;
        Ok(contents
            .first()
            .map(|first| {
                ResourceContents::text(
                    resource.location.clone(),
                    resource.mime_type.clone(),
                    first.as_text(),
                )
            })
            .into_iter()
            .collect())
    }

    fn resolve(&self, _tool: &ToolReference) -> Arc<dyn Tool> {
        Arc::new(McpForwardTool {
            address: self.forward.address.clone(),
            timeout: self.timeout,
            call_lock: Arc::clone(&self.call_lock),
        })
    }
}

struct McpForwardTool {
    address: String,
    timeout: Duration,
    call_lock: Arc<Mutex<()>>,
}

impl McpForwardTool {
    async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolsCallResult> {
        let session = McpSession::open(&self.address, self.timeout).await?;
        let result = session.call_tool(name, arguments).await;
        session.close().await;
        result
    }
}

#[async_trait]
impl Tool for McpForwardTool {
    async fn call(&self, arguments: Map<String, Value>, tool: &ToolReference) -> ToolsCallResult {
        let _guard = self.call_lock.lock().await;

        match self.invoke(&tool.name, Value::Object(arguments)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %tool.name, address = %self.address, error = %e, "Forwarded tool call failed");
                ToolsCallResult::error(format!("Tool '{}' failed: {e}", tool.name))
            }
        }
    }
}

/// Resolver used when forwards are disabled
#[derive(Debug, Default)]
pub struct NoopForwardResolver;

const DISABLED: &str = "Forwards are disabled";

#[async_trait]
impl ForwardResolver for NoopForwardResolver {
    async fn list_resources(&self) -> Result<Vec<ResourceReference>> {
        Ok(Vec::new())
    }

    async fn list_tools(&self) -> Result<Vec<ToolReference>> {
        Ok(Vec::new())
    }

    async fn read(
        &self,
        _arguments: &Map<String, Value>,
        _resource: &ResourceReference,
    ) -> Result<Vec<ResourceContents>> {
        Err(Error::ServiceUnavailable(DISABLED.to_string()))
    }

    fn resolve(&self, _tool: &ToolReference) -> Arc<dyn Tool> {
        Arc::new(DisabledTool)
    }
}

struct DisabledTool;

#[async_trait]
impl Tool for DisabledTool {
    async fn call(&self, _arguments: Map<String, Value>, _tool: &ToolReference) -> ToolsCallResult {
        ToolsCallResult::error(DISABLED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Labels;
    use serde_json::json;

    fn tool_ref(name: &str) -> ToolReference {
        ToolReference {
            id: None,
            name: name.to_string(),
            description: String::new(),
            uri: String::new(),
            tool_type: REMOTE_TOOL_TYPE.to_string(),
            namespace: None,
            labels: Labels::new(),
            input_schema: InputSchema::default(),
        }
    }

    fn unreachable() -> McpForwardResolver {
        McpForwardResolver::new(
            ForwardReference::new("dead", "http://127.0.0.1:1/mcp"),
            Duration::from_millis(500),
        )
    }

    #[test]
    fn test_translation_carries_forward_metadata() {
        let mut forward = ForwardReference::new("weather", "http://w/mcp").with_namespace("ext");
        forward.labels.insert("team".into(), "x".into());
        let resolver = McpForwardResolver::new(forward, Duration::from_secs(1));

        let tool = resolver.to_tool_reference(protocol::Tool {
            name: "forecast".into(),
            description: Some("Forecast".into()),
            input_schema: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        });
        assert_eq!(tool.tool_type, REMOTE_TOOL_TYPE);
        assert_eq!(tool.namespace.as_deref(), Some("ext"));
        assert_eq!(tool.labels.get("team").map(String::as_str), Some("x"));
        assert!(tool.input_schema.properties.contains_key("city"));

        let resource = resolver.to_resource_reference(protocol::Resource {
            uri: "file:///r".into(),
            name: "r".into(),
            description: None,
            mime_type: Some("text/plain".into()),
        });
        assert_eq!(resource.location, "file:///r");
        assert_eq!(resource.resource_type, REMOTE_RESOURCE_TYPE);
    }

    #[tokio::test]
    async fn test_unreachable_listing_is_service_unavailable() {
        let resolver = unreachable();
        assert!(matches!(
            resolver.list_tools().await,
            Err(Error::ServiceUnavailable(_))
        ));
        assert!(matches!(
            resolver.list_resources().await,
            Err(Error::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_call_is_error_result() {
        let resolver = unreachable();
        let tool = tool_ref("anything");
        let result = resolver.resolve(&tool).call(Map::new(), &tool).await;
        assert!(result.is_error);
        assert!(result.joined_text().contains("anything"));
    }

    #[tokio::test]
    async fn test_noop_resolver() {
        let resolver = NoopForwardResolver;
        assert!(resolver.list_tools().await.unwrap().is_empty());
        assert!(resolver.list_resources().await.unwrap().is_empty());
        assert!(resolver.provision(None, None).await.is_ok());

        let tool = tool_ref("t");
        assert!(resolver.resolve(&tool).call(Map::new(), &tool).await.is_error);
    }
}
