//! Gateway-side aggregation over every linked forward

use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{info, warn};
use url::Url;

use super::{ForwardRegistry, ForwardResolver};
use crate::labels::LabelExpression;
use crate::persistence::Repository;
use crate::protocol::{ResourceContents, ToolsCallResult};
use crate::types::{ForwardReference, NameNamespacePair, ResourceReference, ToolReference};
use crate::{Error, Result};

/// Manages forwards and aggregates their tools and resources
pub struct ForwardService {
    registry: Arc<ForwardRegistry>,
    repository: Arc<dyn Repository<ForwardReference>>,
}

fn parse_filter(filter: Option<&str>) -> Result<Option<LabelExpression>> {
    Ok(filter
        .filter(|f| !f.trim().is_empty())
        .map(LabelExpression::parse)
        .transpose()?)
}

impl ForwardService {
    /// Create the service
    pub fn new(
        registry: Arc<ForwardRegistry>,
        repository: Arc<dyn Repository<ForwardReference>>,
    ) -> Self {
        Self {
            registry,
            repository,
        }
    }

    /// The resolver registry
    #[must_use]
    pub fn registry(&self) -> &Arc<ForwardRegistry> {
        &self.registry
    }

    /// Link a resolver for every persisted forward, returning how many
    pub fn preload(&self) -> Result<usize> {
        let forwards = self.repository.list_all()?;
        for forward in &forwards {
            let pair = forward.key();
            let resolver = self.registry.new_resolver_for_service(&pair, forward);
            self.registry.link(pair, resolver);
        }
        info!(count = forwards.len(), "Preloaded forwards");
        Ok(forwards.len())
    }

    fn find_persisted(&self, pair: &NameNamespacePair) -> Result<Option<ForwardReference>> {
        Ok(self
            .repository
            .find_by_name(&pair.name)?
            .into_iter()
            .find(|f| f.namespace == pair.namespace))
    }

    /// Persist a forward and link its resolver.
    ///
    /// A forward with the same name and namespace is replaced in place.
    pub fn add_forward(&self, mut forward: ForwardReference) -> Result<ForwardReference> {
        Url::parse(&forward.address).map_err(|e| {
            Error::Config(format!("Invalid forward address '{}': {e}", forward.address))
        })?;
        let pair = forward.key();

        let stored = match self.find_persisted(&pair)? {
            Some(existing) => {
                forward.id = existing.id;
                self.repository.update(forward.clone())?;
                forward
            }
            None => self.repository.persist(forward)?,
        };

        let resolver = self.registry.new_resolver_for_service(&pair, &stored);
        self.registry.link(pair, resolver);
        info!(forward = %stored.key(), address = %stored.address, "Forward added");
        Ok(stored)
    }

    /// Delete a forward and unlink its resolver
    pub fn remove_forward(&self, name: &str, namespace: Option<&str>) -> Result<ForwardReference> {
        let pair = NameNamespacePair::new(name, namespace.map(str::to_string));
        let forward = self
            .find_persisted(&pair)?
            .ok_or_else(|| Error::EntityNotFound(format!("forward {pair}")))?;

        if let Some(id) = forward.id.as_deref() {
            self.repository.delete_by_id(id)?;
        }
        self.registry.unlink(&pair);
        info!(forward = %pair, "Forward removed");
        Ok(forward)
    }

    /// Persisted forwards, optionally filtered by a label expression
    pub fn list_forwards(&self, filter: Option<&str>) -> Result<Vec<ForwardReference>> {
        let expression = parse_filter(filter)?;
        let forwards = self.repository.list_all()?;
        Ok(match expression {
            Some(e) => e.filter(forwards),
            None => forwards,
        })
    }

    /// Tools of every forward. A forward that fails is logged and skipped.
    pub async fn list_tools(&self, filter: Option<&str>) -> Result<Vec<ToolReference>> {
        let expression = parse_filter(filter)?;
        let entries = self.registry.entries();

        let listings = join_all(
            entries
                .iter()
                .map(|(_, resolver)| resolver.list_tools()),
        )
        .await;

        let mut tools = Vec::new();
        for ((pair, _), listing) in entries.iter().zip(listings) {
            match listing {
                Ok(listed) => tools.extend(listed),
                Err(e) => warn!(forward = %pair, error = %e, "Skipping forward tools"),
            }
        }

        Ok(match expression {
            Some(e) => e.filter(tools),
            None => tools,
        })
    }

    /// Resources of every forward. A forward that fails is logged and skipped.
    pub async fn list_resources(&self, filter: Option<&str>) -> Result<Vec<ResourceReference>> {
        let expression = parse_filter(filter)?;
        let entries = self.registry.entries();

        let listings = join_all(
            entries
                .iter()
                .map(|(_, resolver)| resolver.list_resources()),
        )
        .await;

        let mut resources = Vec::new();
        for ((pair, _), listing) in entries.iter().zip(listings) {
            match listing {
                Ok(listed) => resources.extend(listed),
                Err(e) => warn!(forward = %pair, error = %e, "Skipping forward resources"),
            }
        }

        Ok(match expression {
            Some(e) => e.filter(resources),
            None => resources,
        })
    }

    async fn locate_tool(&self, name: &str) -> Option<(Arc<dyn ForwardResolver>, ToolReference)> {
        for (pair, resolver) in self.registry.entries() {
            match resolver.list_tools().await {
                Ok(tools) => {
                    if let Some(tool) = tools.into_iter().find(|t| t.name == name) {
                        return Some((resolver, tool));
                    }
                }
                Err(e) => warn!(forward = %pair, error = %e, "Skipping forward during tool lookup"),
            }
        }
        None
    }

    /// Call a tool on whichever forward exposes it
    ///
    /// # Errors
    ///
    /// `EntityNotFound` if no reachable forward exposes `name`. Failures of the
    /// call itself come back as an error-flagged result.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolsCallResult> {
        let (resolver, tool) = self
            .locate_tool(name)
            .await
            .ok_or_else(|| Error::EntityNotFound(format!("tool {name}")))?;
        Ok(resolver.resolve(&tool).call(arguments, &tool).await)
    }

    /// Read a resource from whichever forward exposes it
    pub async fn read_resource(&self, location: &str) -> Result<Vec<ResourceContents>> {
        for (pair, resolver) in self.registry.entries() {
            let resources = match resolver.list_resources().await {
                Ok(resources) => resources,
                Err(e) => {
                    warn!(forward = %pair, error = %e, "Skipping forward during resource lookup");
                    continue;
                }
            };
            if let Some(resource) = resources.into_iter().find(|r| r.location == location) {
                return resolver.read(&Map::new(), &resource).await;
            }
        }
        Err(Error::EntityNotFound(format!("resource {location}")))
    }
}
