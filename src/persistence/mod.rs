//! Backend-agnostic repository contract for persisted entities
//!
//! Forward references and the tool/resource references derived from them are
//! persisted; service targets are runtime-only and live in the registry.

mod file;
mod memory;

pub use file::FileRepository;
pub use memory::InMemoryRepository;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::config::{PersistenceBackend, PersistenceConfig, expand_home};
use crate::labels::{LabelExpression, LabelsAware};
use crate::types::{ForwardReference, ResourceReference, ToolReference};

/// A persistable domain object
pub trait Entity:
    LabelsAware + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Storage kind (also the file name of the file backend)
    const KIND: &'static str;

    /// Identity, if assigned
    fn id(&self) -> Option<&str>;

    /// Assign the identity
    fn set_id(&mut self, id: String);

    /// Logical name
    fn name(&self) -> &str;
}

/// Storage operations for one entity kind
pub trait Repository<T: Entity>: Send + Sync {
    /// Store a new entity, assigning an id if it has none
    fn persist(&self, entity: T) -> Result<T>;

    /// Every stored entity
    fn list_all(&self) -> Result<Vec<T>>;

    /// Lookup by id
    fn find_by_id(&self, id: &str) -> Result<Option<T>>;

    /// Every entity with this name
    fn find_by_name(&self, name: &str) -> Result<Vec<T>>;

    /// Delete by id; `false` if nothing was stored under it
    fn delete_by_id(&self, id: &str) -> Result<bool>;

    /// Replace an existing entity (matched by id); `false` if unknown
    fn update(&self, entity: T) -> Result<bool>;

    /// Entities matching a label expression
    fn list_by_label_expression(&self, expression: &str) -> Result<Vec<T>> {
        let expression = LabelExpression::parse(expression)?;
        Ok(expression.filter(self.list_all()?))
    }

    /// Delete every entity matching a label expression, returning how many went
    fn remove_by_label_expression(&self, expression: &str) -> Result<usize> {
        let mut removed = 0;
        for entity in self.list_by_label_expression(expression)? {
            if let Some(id) = entity.id()
                && self.delete_by_id(id)?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Open a repository for `T` on the configured backend
pub fn open_repository<T: Entity>(config: &PersistenceConfig) -> Result<Arc<dyn Repository<T>>> {
    Ok(match config.backend {
        PersistenceBackend::Memory => Arc::new(InMemoryRepository::<T>::new()),
        PersistenceBackend::File => Arc::new(FileRepository::<T>::open(expand_home(
            &config.directory,
        ))?),
    })
}

macro_rules! impl_entity {
    ($ty:ty, $kind:literal) => {
        impl Entity for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> Option<&str> {
                self.id.as_deref()
            }

            fn set_id(&mut self, id: String) {
                self.id = Some(id);
            }

            fn name(&self) -> &str {
                &self.name
            }
        }
    };
}

impl_entity!(ForwardReference, "forwards");
impl_entity!(ToolReference, "tools");
impl_entity!(ResourceReference, "resources");
