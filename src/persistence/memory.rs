//! Process-local repository

use dashmap::DashMap;
use uuid::Uuid;

use super::{Entity, Repository};
use crate::Result;

/// Repository held in a concurrent map; contents are lost on restart
pub struct InMemoryRepository<T: Entity> {
    entities: DashMap<String, T>,
}

impl<T: Entity> InMemoryRepository<T> {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
        }
    }
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    fn persist(&self, mut entity: T) -> Result<T> {
        let id = match entity.id() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        entity.set_id(id.clone());
        self.entities.insert(id, entity.clone());
        Ok(entity)
    }

    fn list_all(&self) -> Result<Vec<T>> {
        Ok(self.entities.iter().map(|e| e.value().clone()).collect())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        Ok(self.entities.get(id).map(|e| e.value().clone()))
    }

    fn find_by_name(&self, name: &str) -> Result<Vec<T>> {
        Ok(self
            .entities
            .iter()
            .filter(|e| e.name() == name)
            .map(|e| e.value().clone())
            .collect())
    }

    fn delete_by_id(&self, id: &str) -> Result<bool> {
        Ok(self.entities.remove(id).is_some())
    }

    fn update(&self, entity: T) -> Result<bool> {
        let Some(id) = entity.id() else {
            return Ok(false);
        };
        Ok(match self.entities.get_mut(id) {
            Some(mut existing) => {
                *existing = entity;
                true
            }
            None => false,
        })
    }
}
