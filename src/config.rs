//! Configuration management

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Capability registry configuration
    pub registry: RegistryConfig,
    /// Periodic health check configuration
    pub health_check: HealthCheckConfig,
    /// Registration client configuration (capability-provider side)
    pub registration: RegistrationConfig,
    /// Forward proxy configuration
    pub forwards: ForwardsConfig,
    /// Persistence configuration
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // CAPABILITY_GATEWAY_HEALTH_CHECK__INTERVAL=30s -> health_check.interval
        figment = figment.merge(Env::prefixed("CAPABILITY_GATEWAY_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let path = expand_home(path_str);
            if path.exists() {
                match dotenvy::from_path(&path) {
                    Ok(()) => tracing::info!("Loaded env file: {}", path.display()),
                    Err(e) => tracing::warn!("Failed to load env file {}: {e}", path.display()),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {}", path.display());
            }
        }
    }
}

/// Expand a leading `~` to the user's home directory
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39500,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Capability registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of state entries kept per capability
    pub max_state_count: usize,
    /// Age after which a capability counts as stale
    #[serde(with = "humantime_serde")]
    pub stale_max_age: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_state_count: 10,
            stale_max_age: Duration::from_secs(86_400),
        }
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the periodic sweep
    pub enabled: bool,
    /// Sweep interval
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Per-probe timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Maximum number of probes in flight at once
    pub worker_pool_size: usize,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
            worker_pool_size: 8,
        }
    }
}

/// Registration client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Discovery RPC endpoint of the gateway
    pub registry_url: String,
    /// Attempts per registration cycle
    pub retries: u32,
    /// Wait between attempts
    #[serde(with = "humantime_serde")]
    pub retry_wait: Duration,
    /// Ping instead of re-registering once registered
    pub ping_enabled: bool,
    /// Registration/ping period
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Directory holding cached instance identities
    pub data_dir: String,
    /// Timeout for each discovery RPC
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            registry_url: "http://127.0.0.1:39500/discovery".to_string(),
            retries: 3,
            retry_wait: Duration::from_secs(1),
            ping_enabled: true,
            interval: Duration::from_secs(10),
            data_dir: "~/.capability-gateway/instances".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RegistrationConfig {
    /// Data directory with `~` expanded
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }
}

/// Forward proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardsConfig {
    /// When disabled every forward resolves to a no-op resolver
    pub enabled: bool,
    /// Timeout for each outbound call to a forward
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ForwardsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Persistence backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    /// Process-local maps, lost on restart
    #[default]
    Memory,
    /// JSON files under `persistence.directory`
    File,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Backend kind
    pub backend: PersistenceBackend,
    /// Directory for the file backend
    pub directory: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::Memory,
            directory: "~/.capability-gateway/data".to_string(),
        }
    }
}

/// Humantime-style serde for `Duration` (`100ms`, `30s`, `5m`, `2h`, `1d`, bare seconds)
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// Parse a duration string
    ///
    /// # Errors
    ///
    /// Returns a message if the numeric part is not an unsigned integer.
    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let number = |n: &str| {
            n.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid duration '{s}': {e}"))
        };
        let scaled = |n: &str, unit: u64| -> Result<Duration, String> {
            number(n)?
                .checked_mul(unit)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("invalid duration '{s}': number too large"))
        };

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            number(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            number(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            scaled(mins, 60)
        } else if let Some(hours) = s.strip_suffix('h') {
            scaled(hours, 3600)
        } else if let Some(days) = s.strip_suffix('d') {
            scaled(days, 86_400)
        } else {
            number(s).map(Duration::from_secs)
        }
    }
}
