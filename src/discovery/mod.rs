//! Capability discovery: the provider-side registration client and the
//! gateway-side RPC surface it talks to

mod client;
mod instance;
mod manager;
pub mod rpc;

pub use client::{HttpDiscoveryClient, LocalDiscovery};
pub use instance::{InstanceData, InstanceDataManager};
pub use manager::RegistrationManager;

use async_trait::async_trait;
use tracing::info;

use crate::Result;
use crate::types::{ServiceState, ServiceTarget};

/// JSON-RPC method names of the discovery surface
pub mod methods {
    /// Register (or re-register) a capability
    pub const REGISTER: &str = "discovery/register";
    /// Remove a capability
    pub const DEREGISTER: &str = "discovery/deregister";
    /// Keep-alive
    pub const PING: &str = "discovery/ping";
    /// Push an explicit health state
    pub const UPDATE_STATE: &str = "discovery/updateState";

    /// List targets, optionally by type and label expression
    pub const LIST: &str = "capabilities/list";
    /// Activity record of one target
    pub const STATES: &str = "capabilities/states";
    /// Stale targets
    pub const STALE: &str = "capabilities/stale";
    /// Remove stale targets
    pub const CLEANUP: &str = "capabilities/cleanup";
    /// Remove every target matching a label expression
    pub const REMOVE: &str = "capabilities/remove";
    /// Fleet-wide health summary
    pub const FLEET_STATUS: &str = "capabilities/fleetStatus";
    /// Probe one target now
    pub const CHECK: &str = "capabilities/check";
}

/// How a registration client reaches the registry
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    /// Register a target, returning it with the registry-assigned id
    async fn register(&self, target: &ServiceTarget) -> Result<ServiceTarget>;

    /// Remove a target
    async fn deregister(&self, target: &ServiceTarget) -> Result<()>;

    /// Keep-alive; fails with `EntityNotFound` if the registry forgot the id
    async fn ping(&self, id: &str) -> Result<()>;

    /// Push an explicit state
    async fn update_state(&self, id: &str, state: &ServiceState) -> Result<()>;
}

/// Observer of registration lifecycle changes.
///
/// Observers run in registration order; an error from one is logged and the
/// rest still run.
pub trait DiscoveryCallback: Send + Sync {
    /// Called after a successful registration
    fn on_registration(&self, _target: &ServiceTarget) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after deregistration
    fn on_deregistration(&self, _target: &ServiceTarget) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after a successful ping
    fn on_ping(&self, _target: &ServiceTarget) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Logs every lifecycle change (installed by default)
#[derive(Debug, Default)]
pub struct LoggingCallback;

impl DiscoveryCallback for LoggingCallback {
    fn on_registration(&self, target: &ServiceTarget) -> anyhow::Result<()> {
        info!(
            id = ?target.id,
            service = %target.service_name,
            address = %target.address(),
            "Capability registered"
        );
        Ok(())
    }

    fn on_deregistration(&self, target: &ServiceTarget) -> anyhow::Result<()> {
        info!(id = ?target.id, service = %target.service_name, "Capability deregistered");
        Ok(())
    }

    fn on_ping(&self, target: &ServiceTarget) -> anyhow::Result<()> {
        tracing::trace!(id = ?target.id, service = %target.service_name, "Capability pinged");
        Ok(())
    }
}
