//! [`DiscoveryService`] implementations

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{DiscoveryService, methods};
use crate::registry::ServiceRegistry;
use crate::transport::{HttpTransport, Transport};
use crate::types::{ServiceState, ServiceTarget};
use crate::{Error, Result};

#[derive(Deserialize)]
struct Found {
    found: bool,
}

/// Talks JSON-RPC to the gateway's discovery endpoint
pub struct HttpDiscoveryClient {
    transport: Arc<HttpTransport>,
}

impl HttpDiscoveryClient {
    /// Create a client for `registry_url`
    pub fn new(registry_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(registry_url, HashMap::new(), timeout)?,
        })
    }

    async fn expect_found(&self, method: &str, id: &str, params: serde_json::Value) -> Result<()> {
        let reply: Found = self
            .transport
            .request(method, Some(params))
            .await?
            .into_typed()?;
        if reply.found {
            Ok(())
        } else {
            Err(Error::EntityNotFound(format!("capability {id}")))
        }
    }
}

#[async_trait]
impl DiscoveryService for HttpDiscoveryClient {
    async fn register(&self, target: &ServiceTarget) -> Result<ServiceTarget> {
        self.transport
            .request(methods::REGISTER, Some(serde_json::to_value(target)?))
            .await?
            .into_typed()
            .map_err(|e| match e {
                Error::JsonRpc { message, .. } => Error::Registration(message),
                other => other,
            })
    }

    async fn deregister(&self, target: &ServiceTarget) -> Result<()> {
        self.transport
            .request(methods::DEREGISTER, Some(serde_json::to_value(target)?))
            .await?
            .into_result()
            .map(|_| ())
    }

    async fn ping(&self, id: &str) -> Result<()> {
        self.expect_found(methods::PING, id, json!({ "id": id })).await
    }

    async fn update_state(&self, id: &str, state: &ServiceState) -> Result<()> {
        self.expect_found(methods::UPDATE_STATE, id, json!({ "id": id, "state": state }))
            .await
    }
}

/// In-process discovery straight against a registry
pub struct LocalDiscovery {
    registry: Arc<dyn ServiceRegistry>,
}

impl LocalDiscovery {
    /// Wrap a registry
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl DiscoveryService for LocalDiscovery {
    async fn register(&self, target: &ServiceTarget) -> Result<ServiceTarget> {
        Ok(self.registry.register(target.clone()))
    }

    async fn deregister(&self, target: &ServiceTarget) -> Result<()> {
        self.registry.deregister(target);
        Ok(())
    }

    async fn ping(&self, id: &str) -> Result<()> {
        if self.registry.ping(id) {
            Ok(())
        } else {
            Err(Error::EntityNotFound(format!("capability {id}")))
        }
    }

    async fn update_state(&self, id: &str, state: &ServiceState) -> Result<()> {
        if self.registry.update_last_state(id, state.clone()) {
            Ok(())
        } else {
            Err(Error::EntityNotFound(format!("capability {id}")))
        }
    }
}
