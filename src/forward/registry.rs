//! In-memory binding of forward keys to resolvers

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::{ForwardResolver, McpForwardResolver, NoopForwardResolver};
use crate::config::ForwardsConfig;
use crate::types::{ForwardReference, NameNamespacePair};

/// Map of [`NameNamespacePair`] to live resolver.
///
/// Not persisted; rebuilt from the forward repository at startup.
pub struct ForwardRegistry {
    resolvers: DashMap<NameNamespacePair, Arc<dyn ForwardResolver>>,
    enabled: bool,
    timeout: Duration,
}

impl ForwardRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: &ForwardsConfig) -> Self {
        Self {
            resolvers: DashMap::new(),
            enabled: config.enabled,
            timeout: config.timeout,
        }
    }

    /// Build (but do not link) a resolver for a forward
    #[must_use]
    pub fn new_resolver_for_service(
        &self,
        pair: &NameNamespacePair,
        reference: &ForwardReference,
    ) -> Arc<dyn ForwardResolver> {
        if !self.enabled {
            debug!(forward = %pair, "Forwards disabled, using no-op resolver");
            return Arc::new(NoopForwardResolver);
        }
        Arc::new(McpForwardResolver::new(reference.clone(), self.timeout))
    }

    /// Resolver bound to `pair`
    #[must_use]
    pub fn get_resolver(&self, pair: &NameNamespacePair) -> Option<Arc<dyn ForwardResolver>> {
        self.resolvers.get(pair).map(|r| Arc::clone(r.value()))
    }

    /// Bind `resolver` to `pair`, replacing any previous binding
    pub fn link(&self, pair: NameNamespacePair, resolver: Arc<dyn ForwardResolver>) {
        debug!(forward = %pair, "Linked forward");
        self.resolvers.insert(pair, resolver);
    }

    /// Remove the binding of `pair`
    pub fn unlink(&self, pair: &NameNamespacePair) -> Option<Arc<dyn ForwardResolver>> {
        let removed = self.resolvers.remove(pair).map(|(_, r)| r);
        if removed.is_some() {
            debug!(forward = %pair, "Unlinked forward");
        }
        removed
    }

    /// Every bound key (sorted)
    #[must_use]
    pub fn services(&self) -> Vec<NameNamespacePair> {
        let mut pairs: Vec<_> = self.resolvers.iter().map(|e| e.key().clone()).collect();
        pairs.sort();
        pairs
    }

    /// Snapshot of every binding
    #[must_use]
    pub fn entries(&self) -> Vec<(NameNamespacePair, Arc<dyn ForwardResolver>)> {
        self.resolvers
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    /// Number of bindings
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    /// Whether nothing is bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}
