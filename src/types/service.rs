//! Capability service targets and their activity records

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::labels::{Labels, LabelsAware};

/// Kind of work a capability provider performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    /// Executes tools on behalf of agents
    ToolInvoker,
    /// Serves readable resources
    ResourceProvider,
    /// Runs submitted code (qualified by a sub-type such as a language)
    CodeExecutionEngine,
}

impl ServiceType {
    /// Wire name (`tool-invoker`, `resource-provider`, `code-execution-engine`)
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolInvoker => "tool-invoker",
            Self::ResourceProvider => "resource-provider",
            Self::CodeExecutionEngine => "code-execution-engine",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of a capability as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Probe reported the runtime as started
    Healthy,
    /// Reachable but not ready
    Unhealthy,
    /// Not probed yet
    #[default]
    Pending,
    /// Unreachable or timed out
    Down,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Pending => "pending",
            Self::Down => "down",
        })
    }
}

/// A registered capability provider endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTarget {
    /// Registry-assigned identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Logical service name (e.g. `http`, `s3`)
    pub service_name: String,
    /// Host the provider listens on
    pub host: String,
    /// Port the provider listens on
    pub port: u16,
    /// Service kind
    pub service_type: ServiceType,
    /// Optional refinement of the kind (language, engine flavour)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_subtype: Option<String>,
    /// Metadata labels
    #[serde(default)]
    pub labels: Labels,
}

impl ServiceTarget {
    /// Create an unregistered target
    pub fn new(
        service_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        service_type: ServiceType,
    ) -> Self {
        Self {
            id: None,
            service_name: service_name.into(),
            host: host.into(),
            port,
            service_type,
            service_subtype: None,
            labels: Labels::new(),
        }
    }

    /// Set the sub-type
    #[must_use]
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.service_subtype = Some(subtype.into());
        self
    }

    /// Add a label
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the identity
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// `host:port`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Key under which re-registrations of the same service collapse
    #[must_use]
    pub fn logical_key(&self) -> (String, ServiceType, Option<String>) {
        (
            self.service_name.clone(),
            self.service_type,
            self.service_subtype.clone(),
        )
    }
}

impl LabelsAware for ServiceTarget {
    fn labels(&self) -> &Labels {
        &self.labels
    }
}

/// One entry in a capability's state history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    /// When the state was recorded
    pub timestamp: DateTime<Utc>,
    /// Observed health
    pub status: HealthStatus,
    /// Why (for non-healthy states)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ServiceState {
    fn now(status: HealthStatus, reason: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            reason,
        }
    }

    /// Healthy state
    #[must_use]
    pub fn healthy() -> Self {
        Self::now(HealthStatus::Healthy, None)
    }

    /// Unhealthy state
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::now(HealthStatus::Unhealthy, Some(reason.into()))
    }

    /// Down state
    pub fn down(reason: impl Into<String>) -> Self {
        Self::now(HealthStatus::Down, Some(reason.into()))
    }

    /// Pending state
    #[must_use]
    pub fn pending() -> Self {
        Self::now(HealthStatus::Pending, None)
    }

    /// Placeholder recorded when a capability never reported any state
    #[must_use]
    pub fn missing_in_action() -> Self {
        Self::now(
            HealthStatus::Pending,
            Some("Missing in action: no state reported yet".to_string()),
        )
    }

    /// Whether this state counts as healthy
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Per-target activity and health bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    /// Target id
    pub id: String,
    /// Last registration, ping or state report
    pub last_seen: DateTime<Utc>,
    /// Whether the provider has pinged since registration
    pub active: bool,
    /// Latest health
    pub health_status: HealthStatus,
    /// Recent states, oldest first
    pub states: Vec<ServiceState>,
}

impl ActivityRecord {
    /// Fresh record for a just-registered target
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_seen: Utc::now(),
            active: true,
            health_status: HealthStatus::Pending,
            states: Vec::new(),
        }
    }

    /// Mark as seen now
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
        self.active = true;
    }

    /// Append a state and update `health_status`.
    ///
    /// Once the history grows past `max_states`, the oldest half is dropped.
    pub fn push_state(&mut self, state: ServiceState, max_states: usize) {
        self.health_status = state.status;
        self.states.push(state);

        if self.states.len() > max_states {
            let excess = (max_states / 2).max(1).min(self.states.len());
            self.states.drain(..excess);
        }
    }

    /// Whether at least `max_age` has elapsed since `last_seen`
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let elapsed = (now - self.last_seen).to_std().unwrap_or_default();
        elapsed >= max_age
    }
}

/// A stale target paired with its activity record (query result only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleCapability {
    /// The target
    pub target: ServiceTarget,
    /// Its activity record at query time
    pub activity: ActivityRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_wire_names() {
        let json = serde_json::to_string(&ServiceType::CodeExecutionEngine).unwrap();
        assert_eq!(json, "\"code-execution-engine\"");
        let parsed: ServiceType = serde_json::from_str("\"tool-invoker\"").unwrap();
        assert_eq!(parsed, ServiceType::ToolInvoker);
    }

    #[test]
    fn test_target_serializes_camel_case() {
        let target = ServiceTarget::new("http", "localhost", 9000, ServiceType::ToolInvoker)
            .with_label("env", "prod");
        let value = serde_json::to_value(&target).unwrap();
        assert_eq!(value["serviceName"], "http");
        assert_eq!(value["serviceType"], "tool-invoker");
        assert_eq!(value["labels"]["env"], "prod");
        assert!(value.get("id").is_none());
        assert_eq!(target.address(), "localhost:9000");
    }

    #[test]
    fn test_history_is_bounded() {
        let mut record = ActivityRecord::new("a");
        for _ in 0..11 {
            record.push_state(ServiceState::healthy(), 10);
        }
        assert_eq!(record.states.len(), 6);

        record.push_state(ServiceState::down("gone"), 10);
        assert_eq!(record.health_status, HealthStatus::Down);
        assert_eq!(record.states.last().map(|s| s.status), Some(HealthStatus::Down));
    }

    #[test]
    fn test_zero_max_age_is_always_stale() {
        let record = ActivityRecord::new("a");
        assert!(record.is_stale(Utc::now(), Duration::ZERO));
        assert!(!record.is_stale(Utc::now(), Duration::from_secs(3600)));
    }

    #[test]
    fn test_stale_bound_is_inclusive() {
        let record = ActivityRecord::new("a");
        let later = record.last_seen + chrono::Duration::seconds(10);
        assert!(record.is_stale(later, Duration::from_secs(10)));
        assert!(!record.is_stale(later, Duration::from_secs(11)));
    }
}
