//! Capability registry
//!
//! The registry is the single authoritative store of capability service
//! targets and their activity records. One instance is built at startup and
//! shared (behind an `Arc`) with the discovery RPC surface, the health
//! scheduler and anything else that needs to find or judge a capability.
//! Callers always receive copies; the maps never leak.

mod fleet;
mod memory;

pub use fleet::{FleetStatus, OverallStatus};
pub use memory::InMemoryServiceRegistry;

use std::collections::HashMap;
use std::time::Duration;

use crate::events::EventBus;
use crate::types::{ActivityRecord, ServiceState, ServiceTarget, ServiceType, StaleCapability};

/// Operations every registry backend provides
pub trait ServiceRegistry: Send + Sync {
    /// Register a target, returning the stored copy with its id.
    ///
    /// Re-registering the same (service name, type, sub-type) updates the
    /// existing entry in place and keeps its id.
    fn register(&self, target: ServiceTarget) -> ServiceTarget;

    /// Remove a target (looked up by id, or by logical key when the id is absent)
    fn deregister(&self, target: &ServiceTarget) -> bool;

    /// Replace the mutable fields (host, port, labels) of a known target
    fn update(&self, target: ServiceTarget) -> bool;

    /// Append a state reported by the capability itself and mark it seen
    fn update_last_state(&self, id: &str, state: ServiceState) -> bool;

    /// Record a probe result without touching `last_seen`
    fn update_health_status(&self, id: &str, state: ServiceState) -> bool;

    /// Mark a target as seen now
    fn ping(&self, id: &str) -> bool;

    /// All targets with this name and type
    fn get_service_by_name(&self, name: &str, service_type: ServiceType) -> Vec<ServiceTarget>;

    /// All targets matching type, sub-type and name
    fn get_code_execution_service(
        &self,
        service_type: ServiceType,
        subtype: &str,
        name: &str,
    ) -> Vec<ServiceTarget>;

    /// All targets of a type
    fn get_entries(&self, service_type: ServiceType) -> Vec<ServiceTarget>;

    /// Every registered target
    fn list_all(&self) -> Vec<ServiceTarget>;

    /// Lookup by id
    fn get_by_id(&self, id: &str) -> Option<ServiceTarget>;

    /// Activity record of a target.
    ///
    /// A record without any state history gets a "missing in action"
    /// pending state appended first.
    fn get_states(&self, id: &str) -> Option<ActivityRecord>;

    /// Activity records of every target of a type, grouped by service name
    fn states_by_service(&self, service_type: ServiceType) -> HashMap<String, Vec<ActivityRecord>>;

    /// Targets not seen for at least `max_age`; with `inactive_only`, only
    /// those whose health is not `Healthy`.
    ///
    /// The bound is inclusive (`now - last_seen >= max_age`), so a zero
    /// `max_age` matches every target.
    fn find_stale_capabilities(&self, max_age: Duration, inactive_only: bool)
    -> Vec<StaleCapability>;

    /// Delete a target and its activity record
    fn remove_by_id(&self, id: &str) -> bool;

    /// Event bus the registry publishes lifecycle events on
    fn events(&self) -> &EventBus;

    /// Aggregated health of every registered target
    fn fleet_status(&self) -> FleetStatus;

    /// Remove every stale target, returning what was removed
    fn cleanup_stale_capabilities(
        &self,
        max_age: Duration,
        inactive_only: bool,
    ) -> Vec<ServiceTarget> {
        let mut removed = Vec::new();
        for stale in self.find_stale_capabilities(max_age, inactive_only) {
            if self.deregister(&stale.target) {
                tracing::info!(
                    capability = ?stale.target.id,
                    service = %stale.target.service_name,
                    "Removed stale capability"
                );
                removed.push(stale.target);
            }
        }
        removed
    }
}
