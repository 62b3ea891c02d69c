//! Local identity cache
//!
//! Persists the registry-assigned id of a capability so that a restarted
//! provider re-registers under the same identity.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Cached identity of one capability instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceData {
    /// Registry-assigned id
    pub id: String,
    /// Service name the id belongs to
    pub service_name: String,
}

/// Reads and writes `<data_dir>/<service_name>.json`
pub struct InstanceDataManager {
    path: PathBuf,
    service_name: String,
}

impl InstanceDataManager {
    /// Create a manager for one service
    pub fn new(data_dir: impl AsRef<Path>, service_name: &str) -> Self {
        let file_name: String = service_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();

        Self {
            path: data_dir.as_ref().join(format!("{file_name}.json")),
            service_name: service_name.to_string(),
        }
    }

    /// Path of the identity file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an identity file exists
    #[must_use]
    pub fn data_file_exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the cached identity.
    ///
    /// A missing, unreadable or corrupt file yields `None`: the provider then
    /// simply registers as new.
    #[must_use]
    pub fn read_instance_data(&self) -> Option<InstanceData> {
        if !self.path.exists() {
            debug!(service = %self.service_name, "No cached instance identity");
            return None;
        }

        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<InstanceData>(&content) {
                Ok(data) if data.service_name == self.service_name => Some(data),
                Ok(data) => {
                    warn!(
                        expected = %self.service_name,
                        found = %data.service_name,
                        "Cached instance identity belongs to another service; ignoring"
                    );
                    None
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Failed to parse instance identity");
                    None
                }
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read instance identity");
                None
            }
        }
    }

    /// Persist the identity (write to a temp file, then rename)
    pub fn write_instance_data(&self, id: &str) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                Error::Persistence(format!("Failed to create {}: {e}", dir.display()))
            })?;
        }

        let data = InstanceData {
            id: id.to_string(),
            service_name: self.service_name.clone(),
        };
        let content = serde_json::to_string_pretty(&data)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                Error::Persistence(format!("Failed to write {}: {e}", self.path.display()))
            })?;

        info!(service = %self.service_name, id = %id, "Saved instance identity");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let manager = InstanceDataManager::new(dir.path().join("nested"), "http");
        assert!(!manager.data_file_exists());
        assert!(manager.read_instance_data().is_none());

        manager.write_instance_data("abc-123").unwrap();
        assert!(manager.data_file_exists());

        let restored = InstanceDataManager::new(dir.path().join("nested"), "http");
        assert_eq!(
            restored.read_instance_data(),
            Some(InstanceData {
                id: "abc-123".into(),
                service_name: "http".into()
            })
        );
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let manager = InstanceDataManager::new(dir.path(), "http");
        fs::write(manager.path(), "{not json").unwrap();
        assert!(manager.read_instance_data().is_none());
    }

    #[test]
    fn test_file_name_is_sanitized() {
        let manager = InstanceDataManager::new("/tmp", "camel/yaml dsl");
        assert_eq!(manager.path(), Path::new("/tmp/camel_yaml_dsl.json"));
    }
}
