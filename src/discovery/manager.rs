//! Registration client run inside each capability provider

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use parking_lot::RwLock;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::{DiscoveryCallback, DiscoveryService, InstanceDataManager, LoggingCallback};
use crate::Error;
use crate::config::RegistrationConfig;
use crate::types::{ServiceState, ServiceTarget};

/// How long a registration attempt waits for a concurrent one to finish
const LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Keeps one capability registered with the gateway.
///
/// Failures never escape: they are logged, retried with a constant wait up to
/// `retries` attempts, and otherwise left for the next cycle. The retry budget
/// is refilled at the start of every [`register`](Self::register) call.
pub struct RegistrationManager {
    discovery: Arc<dyn DiscoveryService>,
    target: RwLock<ServiceTarget>,
    instance: InstanceDataManager,
    registered: AtomicBool,
    retries: u32,
    remaining_retries: AtomicU32,
    retry_wait: Duration,
    ping_enabled: bool,
    lock: Mutex<()>,
    callbacks: RwLock<Vec<Arc<dyn DiscoveryCallback>>>,
}

impl RegistrationManager {
    /// Create a manager, restoring a cached id for `target.service_name` if one exists
    pub fn new(
        discovery: Arc<dyn DiscoveryService>,
        mut target: ServiceTarget,
        config: &RegistrationConfig,
    ) -> Self {
        let instance = InstanceDataManager::new(config.data_dir(), &target.service_name);
        if let Some(data) = instance.read_instance_data() {
            debug!(service = %target.service_name, id = %data.id, "Restored cached instance identity");
            target.id = Some(data.id);
        }

        Self {
            discovery,
            target: RwLock::new(target),
            instance,
            registered: AtomicBool::new(false),
            retries: config.retries,
            remaining_retries: AtomicU32::new(config.retries),
            retry_wait: config.retry_wait,
            ping_enabled: config.ping_enabled,
            lock: Mutex::new(()),
            callbacks: RwLock::new(vec![Arc::new(LoggingCallback)]),
        }
    }

    /// Append an observer
    pub fn add_callback(&self, callback: Arc<dyn DiscoveryCallback>) {
        self.callbacks.write().push(callback);
    }

    /// Whether the last registration succeeded and has not been lost since
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Retry budget left in the current (or last) registration cycle
    #[must_use]
    pub fn remaining_retries(&self) -> u32 {
        self.remaining_retries.load(Ordering::Acquire)
    }

    /// Current view of the target (id included once known)
    #[must_use]
    pub fn target(&self) -> ServiceTarget {
        self.target.read().clone()
    }

    /// Register, or ping when already registered and pinging is enabled
    pub async fn register(&self) {
        if self.ping_enabled && self.is_registered() {
            self.ping().await;
            return;
        }

        let Ok(_guard) = tokio::time::timeout(LOCK_TIMEOUT, self.lock.lock()).await else {
            warn!("Another registration attempt is in progress; skipping this cycle");
            return;
        };

        // A concurrent attempt may have finished while we waited
        if self.ping_enabled && self.is_registered() {
            return;
        }

        let attempts = self.retries.max(1);
        self.remaining_retries.store(attempts, Ordering::Release);

        let target = self.target();
        let backoff = ConstantBuilder::default()
            .with_delay(self.retry_wait)
            .with_max_times((attempts - 1) as usize);

        let result = (|| self.discovery.register(&target))
            .retry(backoff)
            .notify(|e: &Error, wait: Duration| {
                let left = self.remaining_retries.fetch_sub(1, Ordering::AcqRel) - 1;
                warn!(
                    service = %target.service_name,
                    error = %e,
                    remaining = left,
                    retry_in = ?wait,
                    "Registration failed, retrying"
                );
            })
            .await;

        match result {
            Ok(stored) => self.on_registered(stored),
            Err(e) => {
                self.remaining_retries.store(0, Ordering::Release);
                error!(
                    service = %target.service_name,
                    error = %e,
                    "Registration failed and no retries are left; will try again next cycle"
                );
            }
        }
    }

    fn on_registered(&self, stored: ServiceTarget) {
        if let Some(id) = stored.id.as_deref()
            && let Err(e) = self.instance.write_instance_data(id)
        {
            warn!(error = %e, "Failed to cache instance identity");
        }

        *self.target.write() = stored.clone();
        self.registered.store(true, Ordering::Release);
        self.run_callbacks("registration", |cb| cb.on_registration(&stored));
    }

    /// Keep-alive. A failed ping clears the registered flag so the next cycle
    /// registers again (with the cached id).
    pub async fn ping(&self) {
        let target = self.target();
        let Some(id) = target.id.as_deref() else {
            warn!(service = %target.service_name, "Cannot ping: identity unknown");
            return;
        };

        match self.discovery.ping(id).await {
            Ok(()) => self.run_callbacks("ping", |cb| cb.on_ping(&target)),
            Err(e) => {
                warn!(capability = %id, error = %e, "Ping failed; will re-register");
                self.registered.store(false, Ordering::Release);
            }
        }
    }

    /// Best-effort deregistration; failures are only logged
    pub async fn deregister(&self) {
        let target = self.target();
        if let Err(e) = self.discovery.deregister(&target).await {
            warn!(service = %target.service_name, error = %e, "Deregistration failed");
        }
        self.registered.store(false, Ordering::Release);
        self.run_callbacks("deregistration", |cb| cb.on_deregistration(&target));
    }

    /// Report the last operation as failed
    pub async fn last_as_fail(&self, reason: &str) {
        self.report(ServiceState::unhealthy(reason)).await;
    }

    /// Report the last operation as successful
    pub async fn last_as_successful(&self) {
        self.report(ServiceState::healthy()).await;
    }

    async fn report(&self, state: ServiceState) {
        let Some(id) = self.target.read().id.clone() else {
            warn!("Cannot report state: identity unknown");
            return;
        };
        if let Err(e) = self.discovery.update_state(&id, &state).await {
            warn!(capability = %id, error = %e, "Failed to report state");
        }
    }

    fn run_callbacks(
        &self,
        event: &str,
        f: impl Fn(&Arc<dyn DiscoveryCallback>) -> anyhow::Result<()>,
    ) {
        let callbacks = self.callbacks.read().clone();
        for callback in &callbacks {
            if let Err(e) = f(callback) {
                warn!(event, error = %e, "Discovery callback failed");
            }
        }
    }

    /// Register (then ping) every `interval` until `shutdown`, then deregister
    pub fn spawn_registration_loop(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.register().await,
                    _ = shutdown.recv() => {
                        info!(service = %self.target.read().service_name, "Registration loop stopping");
                        self.deregister().await;
                        break;
                    }
                }
            }
        })
    }
}
