//! Short-lived MCP client session against a forward's endpoint

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use crate::Result;
use crate::protocol::{
    Resource, ResourceContents, ResourcesListResult, ResourcesReadParams, ResourcesReadResult,
    Tool, ToolsCallParams, ToolsCallResult, ToolsListResult,
};
use crate::transport::{HttpTransport, Transport};

/// Upper bound on followed `nextCursor` pages
const MAX_PAGES: usize = 100;

/// An initialized MCP session; close it with [`McpSession::close`]
pub struct McpSession {
    transport: Arc<HttpTransport>,
}

impl McpSession {
    /// Connect and perform the MCP handshake
    pub async fn open(address: &str, timeout: Duration) -> Result<Self> {
        let transport = HttpTransport::new(address, HashMap::new(), timeout)?;
        transport.initialize().await?;
        Ok(Self { transport })
    }

    /// Every tool of the remote server (follows pagination)
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ToolsListResult = self
                .transport
                .request("tools/list", params)
                .await?
                .into_typed()?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(tools)
    }

    /// Every resource of the remote server (follows pagination)
    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ResourcesListResult = self
                .transport
                .request("resources/list", params)
                .await?
                .into_typed()?;
            resources.extend(page.resources);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(resources)
    }

    /// Read one resource
    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>> {
        let params = serde_json::to_value(ResourcesReadParams {
            uri: uri.to_string(),
        })?;
        let result: ResourcesReadResult = self
            .transport
            .request("resources/read", Some(params))
            .await?
            .into_typed()?;
        Ok(result.contents)
    }

    /// Call one tool
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult> {
        let params = serde_json::to_value(ToolsCallParams {
            name: name.to_string(),
            arguments,
        })?;
        self.transport
            .request("tools/call", Some(params))
            .await?
            .into_typed()
    }

    /// End the session (best effort)
    pub async fn close(self) {
        if let Err(e) = self.transport.close().await {
            debug!(url = %self.transport.url(), error = %e, "Failed to close MCP session");
        }
    }
}
