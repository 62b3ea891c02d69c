//! Fleet-wide health aggregation

use serde::{Deserialize, Serialize};

use crate::types::HealthStatus;

/// Overall fleet verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Every capability is healthy (or there are none)
    Healthy,
    /// Something is unhealthy or still pending
    Warning,
    /// At least one capability is down
    Down,
}

/// Health summary across all registered capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetStatus {
    /// Verdict
    pub overall: OverallStatus,
    /// Number of capabilities
    pub total: usize,
    /// Healthy count
    pub healthy: usize,
    /// Unhealthy count
    pub unhealthy: usize,
    /// Pending count
    pub pending: usize,
    /// Down count
    pub down: usize,
}

impl FleetStatus {
    /// Aggregate individual statuses
    pub fn from_statuses(statuses: impl IntoIterator<Item = HealthStatus>) -> Self {
        let mut status = Self {
            overall: OverallStatus::Healthy,
            total: 0,
            healthy: 0,
            unhealthy: 0,
            pending: 0,
            down: 0,
        };

        for s in statuses {
            status.total += 1;
            match s {
                HealthStatus::Healthy => status.healthy += 1,
                HealthStatus::Unhealthy => status.unhealthy += 1,
                HealthStatus::Pending => status.pending += 1,
                HealthStatus::Down => status.down += 1,
            }
        }

        status.overall = if status.down > 0 {
            OverallStatus::Down
        } else if status.unhealthy > 0 || status.pending > 0 {
            OverallStatus::Warning
        } else {
            OverallStatus::Healthy
        };

        status
    }
}
