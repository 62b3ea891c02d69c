//! JSON-file repository (one file per entity kind, write-through)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{Entity, Repository};
use crate::{Error, Result};

/// Repository persisted as `<directory>/<kind>.json`
pub struct FileRepository<T: Entity> {
    path: PathBuf,
    entities: Mutex<BTreeMap<String, T>>,
}

impl<T: Entity> FileRepository<T> {
    /// Open (or create) the repository under `directory`
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory).map_err(|e| {
            Error::Persistence(format!("Failed to create {}: {e}", directory.display()))
        })?;

        let path = directory.join(format!("{}.json", T::KIND));
        let entities = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let list: Vec<T> = serde_json::from_str(&content).map_err(|e| {
                Error::Persistence(format!("Corrupt repository file {}: {e}", path.display()))
            })?;
            list.into_iter()
                .filter_map(|e| e.id().map(str::to_string).map(|id| (id, e)))
                .collect()
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), count = entities.len(), "Opened file repository");
        Ok(Self {
            path,
            entities: Mutex::new(entities),
        })
    }

    fn flush(&self, entities: &BTreeMap<String, T>) -> Result<()> {
        let list: Vec<&T> = entities.values().collect();
        let content = serde_json::to_string_pretty(&list)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| Error::Persistence(format!("Failed to write {}: {e}", self.path.display())))
    }

    /// Apply `change` to a copy, write it, and only then make it current
    fn commit(&self, change: impl FnOnce(&mut BTreeMap<String, T>) -> bool) -> Result<bool> {
        let mut entities = self.entities.lock();
        let mut next = entities.clone();
        if !change(&mut next) {
            return Ok(false);
        }
        self.flush(&next)?;
        *entities = next;
        Ok(true)
    }
}

impl<T: Entity> Repository<T> for FileRepository<T> {
    fn persist(&self, mut entity: T) -> Result<T> {
        let id = match entity.id() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        entity.set_id(id.clone());

        let stored = entity.clone();
        self.commit(|entities| {
            entities.insert(id, stored);
            true
        })?;
        Ok(entity)
    }

    fn list_all(&self) -> Result<Vec<T>> {
        Ok(self.entities.lock().values().cloned().collect())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        Ok(self.entities.lock().get(id).cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Vec<T>> {
        Ok(self
            .entities
            .lock()
            .values()
            .filter(|e| e.name() == name)
            .cloned()
            .collect())
    }

    fn delete_by_id(&self, id: &str) -> Result<bool> {
        self.commit(|entities| entities.remove(id).is_some())
    }

    fn update(&self, entity: T) -> Result<bool> {
        let Some(id) = entity.id().map(str::to_string) else {
            return Ok(false);
        };
        self.commit(|entities| match entities.get_mut(&id) {
            Some(existing) => {
                *existing = entity;
                true
            }
            None => false,
        })
    }
}
