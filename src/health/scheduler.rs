//! Periodic health sweep over the capability registry

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use futures::future::join_all;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::HealthProbe;
use crate::config::HealthCheckConfig;
use crate::events::CapabilityEvent;
use crate::registry::ServiceRegistry;
use crate::types::{HealthStatus, ServiceState, ServiceTarget};
use crate::{Error, Result};

/// Removes an id from the in-progress set when dropped
struct InProgressGuard {
    set: Arc<DashSet<String>>,
    id: String,
}

impl InProgressGuard {
    fn acquire(set: &Arc<DashSet<String>>, id: &str) -> Option<Self> {
        set.insert(id.to_string()).then(|| Self {
            set: Arc::clone(set),
            id: id.to_string(),
        })
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

/// Probes every registered capability on a fixed period.
///
/// At most `worker_pool_size` probes run at once, and at most one probe per
/// capability id is ever in flight, whether it was started by the sweep or by
/// [`trigger`](Self::trigger).
pub struct HealthCheckScheduler {
    registry: Arc<dyn ServiceRegistry>,
    probe: Arc<dyn HealthProbe>,
    in_progress: Arc<DashSet<String>>,
    workers: Arc<Semaphore>,
    interval: Duration,
    timeout: Duration,
}

impl HealthCheckScheduler {
    /// Create a scheduler
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        probe: Arc<dyn HealthProbe>,
        config: &HealthCheckConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            probe,
            in_progress: Arc::new(DashSet::new()),
            workers: Arc::new(Semaphore::new(config.worker_pool_size.max(1))),
            interval: config.interval,
            timeout: config.timeout,
        })
    }

    /// Whether a probe for `id` is currently in flight
    #[must_use]
    pub fn is_in_progress(&self, id: &str) -> bool {
        self.in_progress.contains(id)
    }

    /// Probe one capability and record the result.
    ///
    /// Returns `None` when a probe for the same id is already running (or the
    /// target has no id), otherwise the recorded status.
    pub async fn check_instance_health(&self, target: &ServiceTarget) -> Option<HealthStatus> {
        let id = target.id.as_deref()?;

        let Some(_guard) = InProgressGuard::acquire(&self.in_progress, id) else {
            trace!(capability = %id, "Health check already in progress, skipping");
            return None;
        };

        let Ok(_permit) = self.workers.acquire().await else {
            warn!(capability = %id, "Health check worker pool closed");
            return None;
        };

        let state = match tokio::time::timeout(self.timeout, self.probe.probe(target)).await {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => ServiceState::down(e.to_string()),
            Err(_) => ServiceState::down(Error::Timeout(self.timeout).to_string()),
        };
        let status = state.status;

        debug!(
            capability = %id,
            service = %target.service_name,
            status = %status,
            reason = state.reason.as_deref().unwrap_or(""),
            "Health check completed"
        );

        if self.registry.update_health_status(id, state.clone()) {
            let events = self.registry.events();
            if events.has_subscribers() {
                events.publish(CapabilityEvent::StateChanged {
                    id: id.to_string(),
                    state,
                });
            }
        }

        Some(status)
    }

    /// Externally triggered check of a single capability
    pub async fn trigger(&self, id: &str) -> Result<Option<HealthStatus>> {
        let target = self
            .registry
            .get_by_id(id)
            .ok_or_else(|| Error::EntityNotFound(format!("capability {id}")))?;
        Ok(self.check_instance_health(&target).await)
    }

    /// Probe every registered capability once, each in its own task.
    ///
    /// Returns how many probes actually ran (deduplicated ones excluded).
    pub async fn sweep(self: &Arc<Self>) -> usize {
        let handles: Vec<JoinHandle<Option<HealthStatus>>> = self
            .registry
            .list_all()
            .into_iter()
            .map(|target| {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.check_instance_health(&target).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .filter(|result| match result {
                Ok(status) => status.is_some(),
                Err(e) => {
                    warn!(error = %e, "Health check task failed");
                    false
                }
            })
            .count()
    }

    /// Run the sweep every `interval` until `shutdown` fires
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval = ?self.interval, timeout = ?self.timeout, "Health check scheduler started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let probed = self.sweep().await;
                        debug!(probed, "Health sweep finished");
                    }
                    _ = shutdown.recv() => {
                        info!("Health check scheduler stopped");
                        break;
                    }
                }
            }
        })
    }
}
