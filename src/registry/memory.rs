//! In-process registry backed by sharded concurrent maps

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{FleetStatus, ServiceRegistry};
use crate::events::{CapabilityEvent, EventBus};
use crate::types::{
    ActivityRecord, HealthStatus, ServiceState, ServiceTarget, ServiceType, StaleCapability,
};

/// Default number of states kept per capability
pub const DEFAULT_MAX_STATE_COUNT: usize = 10;

type LogicalKey = (String, ServiceType, Option<String>);

/// Registry held entirely in memory.
///
/// Three maps are kept: targets by id, ids by logical key, and activity
/// records by id. Locks are only ever taken in that order (index before
/// targets before activity) and never across a whole map.
pub struct InMemoryServiceRegistry {
    targets: DashMap<String, ServiceTarget>,
    index: DashMap<LogicalKey, String>,
    activity: DashMap<String, ActivityRecord>,
    max_state_count: usize,
    events: EventBus,
}

impl InMemoryServiceRegistry {
    /// Create a registry
    #[must_use]
    pub fn new(max_state_count: usize, events: EventBus) -> Self {
        Self {
            targets: DashMap::new(),
            index: DashMap::new(),
            activity: DashMap::new(),
            max_state_count,
            events,
        }
    }

    /// Number of registered targets
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn fresh_id(&self, requested: Option<&str>, key: &LogicalKey) -> String {
        match requested.filter(|id| !id.is_empty()) {
            // A cached id is honoured unless another service already owns it
            Some(id) => match self.targets.get(id) {
                Some(existing) if existing.logical_key() != *key => Uuid::new_v4().to_string(),
                _ => id.to_string(),
            },
            None => Uuid::new_v4().to_string(),
        }
    }

    fn resolve_id(&self, target: &ServiceTarget) -> Option<String> {
        match target.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => Some(id.to_string()),
            None => self.index.get(&target.logical_key()).map(|id| id.clone()),
        }
    }

    /// Remove a target together with its index entry and activity record.
    ///
    /// The index entry is held for the whole removal so a concurrent
    /// `register` of the same key either completes before or starts after.
    fn remove_entry(&self, id: &str) -> Option<ServiceTarget> {
        let key = self.targets.get(id)?.logical_key();
        let index_entry = self.index.entry(key);

        let (_, removed) = self.targets.remove(id)?;
        self.activity.remove(id);
        if let Entry::Occupied(owner) = index_entry
            && owner.get() == id
        {
            owner.remove();
        }
        Some(removed)
    }

    fn with_activity(&self, id: &str, op: &str, f: impl FnOnce(&mut ActivityRecord)) -> bool {
        if let Some(mut record) = self.activity.get_mut(id) {
            f(&mut record);
            true
        } else {
            warn!(capability = %id, "No capability registered with this id; ignoring {op}");
            false
        }
    }
}

impl Default for InMemoryServiceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STATE_COUNT, EventBus::default())
    }
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn register(&self, mut target: ServiceTarget) -> ServiceTarget {
        let key = target.logical_key();

        let stored = match self.index.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let id = entry.get().clone();
                target.id = Some(id.clone());
                self.targets.insert(id.clone(), target.clone());
                self.activity
                    .entry(id.clone())
                    .and_modify(ActivityRecord::touch)
                    .or_insert_with(|| ActivityRecord::new(id.clone()));
                debug!(capability = %id, service = %target.service_name, "Updated existing registration");
                target
            }
            Entry::Vacant(entry) => {
                let id = self.fresh_id(target.id.as_deref(), &key);
                target.id = Some(id.clone());
                self.targets.insert(id.clone(), target.clone());
                self.activity.insert(id.clone(), ActivityRecord::new(id.clone()));
                entry.insert(id.clone());
                info!(
                    capability = %id,
                    service = %target.service_name,
                    service_type = %target.service_type,
                    address = %target.address(),
                    "Registered capability"
                );
                target
            }
        };

        self.events.publish(CapabilityEvent::Registered {
            target: stored.clone(),
        });
        stored
    }

    fn deregister(&self, target: &ServiceTarget) -> bool {
        let Some(id) = self.resolve_id(target) else {
            warn!(service = %target.service_name, "Cannot deregister unknown capability");
            return false;
        };

        let Some(removed) = self.remove_entry(&id) else {
            warn!(capability = %id, "Cannot deregister unknown capability");
            return false;
        };

        info!(capability = %id, service = %removed.service_name, "Deregistered capability");
        self.events
            .publish(CapabilityEvent::Deregistered { target: removed });
        true
    }

    fn update(&self, target: ServiceTarget) -> bool {
        let Some(id) = target.id.clone() else {
            warn!(service = %target.service_name, "Cannot update a capability without id");
            return false;
        };

        if let Some(mut existing) = self.targets.get_mut(&id) {
            existing.host = target.host;
            existing.port = target.port;
            existing.labels = target.labels;
            true
        } else {
            warn!(capability = %id, "No capability registered with this id; ignoring update");
            false
        }
    }

    fn update_last_state(&self, id: &str, state: ServiceState) -> bool {
        let max = self.max_state_count;
        self.with_activity(id, "state update", |record| {
            record.touch();
            record.push_state(state, max);
        })
    }

    fn update_health_status(&self, id: &str, state: ServiceState) -> bool {
        let max = self.max_state_count;
        self.with_activity(id, "health status", |record| {
            record.push_state(state, max);
        })
    }

    fn ping(&self, id: &str) -> bool {
        let found = self.with_activity(id, "ping", ActivityRecord::touch);
        if found {
            self.events
                .publish(CapabilityEvent::Ping { id: id.to_string() });
        }
        found
    }

    fn get_service_by_name(&self, name: &str, service_type: ServiceType) -> Vec<ServiceTarget> {
        self.targets
            .iter()
            .filter(|t| t.service_type == service_type && t.service_name == name)
            .map(|t| t.value().clone())
            .collect()
    }

    fn get_code_execution_service(
        &self,
        service_type: ServiceType,
        subtype: &str,
        name: &str,
    ) -> Vec<ServiceTarget> {
        self.targets
            .iter()
            .filter(|t| {
                t.service_type == service_type
                    && t.service_subtype.as_deref() == Some(subtype)
                    && t.service_name == name
            })
            .map(|t| t.value().clone())
            .collect()
    }

    fn get_entries(&self, service_type: ServiceType) -> Vec<ServiceTarget> {
        self.targets
            .iter()
            .filter(|t| t.service_type == service_type)
            .map(|t| t.value().clone())
            .collect()
    }

    fn list_all(&self) -> Vec<ServiceTarget> {
        self.targets.iter().map(|t| t.value().clone()).collect()
    }

    fn get_by_id(&self, id: &str) -> Option<ServiceTarget> {
        self.targets.get(id).map(|t| t.value().clone())
    }

    fn get_states(&self, id: &str) -> Option<ActivityRecord> {
        let mut record = self.activity.get_mut(id)?;
        if record.states.is_empty() {
            record.push_state(ServiceState::missing_in_action(), self.max_state_count);
        }
        Some(record.clone())
    }

    fn states_by_service(&self, service_type: ServiceType) -> HashMap<String, Vec<ActivityRecord>> {
        let mut grouped: HashMap<String, Vec<ActivityRecord>> = HashMap::new();
        for target in self.get_entries(service_type) {
            let Some(id) = target.id.as_deref() else {
                continue;
            };
            if let Some(record) = self.get_states(id) {
                grouped.entry(target.service_name).or_default().push(record);
            }
        }
        grouped
    }

    fn find_stale_capabilities(
        &self,
        max_age: Duration,
        inactive_only: bool,
    ) -> Vec<StaleCapability> {
        let now = Utc::now();
        let stale: Vec<ActivityRecord> = self
            .activity
            .iter()
            .filter(|r| r.is_stale(now, max_age))
            .filter(|r| !inactive_only || r.health_status != HealthStatus::Healthy)
            .map(|r| r.value().clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|activity| {
                let target = self.get_by_id(&activity.id)?;
                Some(StaleCapability { target, activity })
            })
            .collect()
    }

    fn remove_by_id(&self, id: &str) -> bool {
        let Some(removed) = self.remove_entry(id) else {
            return false;
        };
        debug!(capability = %id, service = %removed.service_name, "Removed capability");
        true
    }

    fn events(&self) -> &EventBus {
        &self.events
    }

    fn fleet_status(&self) -> FleetStatus {
        let ids: Vec<String> = self.targets.iter().map(|t| t.key().clone()).collect();
        FleetStatus::from_statuses(ids.iter().map(|id| {
            self.activity
                .get(id)
                .map_or(HealthStatus::Pending, |r| r.health_status)
        }))
    }
}
