//! Health probe contract and its JSON-RPC implementation

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::transport::{HttpTransport, Transport};
use crate::types::{ServiceState, ServiceTarget};
use crate::{Error, Result};

/// JSON-RPC method a capability answers probes on
pub const PROBE_METHOD: &str = "health/probe";

/// Runtime state a capability reports about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    /// Up and serving
    Started,
    /// Booting
    Starting,
    /// Shutting down
    Stopping,
    /// Not serving
    Stopped,
    /// Anything else
    #[serde(other)]
    Unknown,
}

/// Payload of a `health/probe` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReply {
    /// Reported runtime status
    pub status: RuntimeStatus,
}

impl ProbeReply {
    /// Translate into a registry state: only `started` is healthy
    #[must_use]
    pub fn into_state(self) -> ServiceState {
        match self.status {
            RuntimeStatus::Started => ServiceState::healthy(),
            other => ServiceState::unhealthy(format!("Runtime status: {other:?}")),
        }
    }
}

/// Asks a single capability for its health.
///
/// `Ok` carries a Healthy or Unhealthy state; an `Err` means the capability
/// could not be reached and is treated as Down by the caller.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe one target
    async fn probe(&self, target: &ServiceTarget) -> Result<ServiceState>;
}

/// Probe over JSON-RPC/HTTP to `http://host:port/`
pub struct RpcHealthProbe {
    timeout: Duration,
}

impl RpcHealthProbe {
    /// Create a probe whose HTTP calls give up after `timeout`
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HealthProbe for RpcHealthProbe {
    async fn probe(&self, target: &ServiceTarget) -> Result<ServiceState> {
        let id = target
            .id
            .clone()
            .ok_or_else(|| Error::Probe(format!("{} has no id", target.service_name)))?;
        let url = format!("http://{}/", target.address());

        let transport = HttpTransport::new(&url, HashMap::new(), self.timeout)?;
        let reply: ProbeReply = transport
            .request(PROBE_METHOD, Some(json!({ "id": id })))
            .await?
            .into_typed()?;

        Ok(reply.into_state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HealthStatus;

    #[test]
    fn test_started_is_healthy() {
        let reply: ProbeReply = serde_json::from_str(r#"{"status":"started"}"#).unwrap();
        assert_eq!(reply.into_state().status, HealthStatus::Healthy);
    }

    #[test]
    fn test_other_statuses_are_unhealthy() {
        for raw in ["starting", "stopping", "stopped", "exploded"] {
            let reply: ProbeReply =
                serde_json::from_str(&format!(r#"{{"status":"{raw}"}}"#)).unwrap();
            let state = reply.into_state();
            assert_eq!(state.status, HealthStatus::Unhealthy, "{raw}");
            assert!(state.reason.is_some());
        }
    }

    #[tokio::test]
    async fn test_unreachable_target_errors() {
        let probe = RpcHealthProbe::new(Duration::from_millis(300));
        let target = ServiceTarget::new("x", "127.0.0.1", 1, crate::types::ServiceType::ToolInvoker)
            .with_id("x-1");
        assert!(probe.probe(&target).await.is_err());
    }
}
