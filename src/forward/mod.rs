//! Forward proxying: remote MCP servers whose tools and resources are exposed
//! through this gateway.
//!
//! ```text
//! ForwardService ──▶ ForwardRegistry (NameNamespacePair → resolver)
//!                          │
//!                          ▼
//!                  McpForwardResolver ──▶ short-lived MCP session per call
//! ```

mod registry;
mod resolver;
mod service;
mod session;

pub use registry::ForwardRegistry;
pub use resolver::{McpForwardResolver, NoopForwardResolver};
pub use service::ForwardService;
pub use session::McpSession;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::Result;
use crate::protocol::{ResourceContents, ToolsCallResult};
use crate::types::{ResourceReference, ToolReference};

/// A callable tool produced by [`ForwardResolver::resolve`]
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invoke the tool.
    ///
    /// Never fails: remote errors come back as an error-flagged result.
    async fn call(&self, arguments: Map<String, Value>, tool: &ToolReference) -> ToolsCallResult;
}

/// Proxy for one forward
#[async_trait]
pub trait ForwardResolver: Send + Sync {
    /// Resources exposed by the remote server
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` if the remote endpoint cannot be reached.
    async fn list_resources(&self) -> Result<Vec<ResourceReference>>;

    /// Tools exposed by the remote server
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` if the remote endpoint cannot be reached.
    async fn list_tools(&self) -> Result<Vec<ToolReference>>;

    /// Read a resource, returning its first content block as text
    async fn read(
        &self,
        arguments: &Map<String, Value>,
        resource: &ResourceReference,
    ) -> Result<Vec<ResourceContents>>;

    /// Callable for a tool
    fn resolve(&self, tool: &ToolReference) -> Arc<dyn Tool>;

    /// Provision configuration and secrets for the forward (nothing to do for
    /// remote MCP servers)
    async fn provision(&self, _config_uri: Option<&str>, _secrets_uri: Option<&str>) -> Result<()> {
        Ok(())
    }
}
