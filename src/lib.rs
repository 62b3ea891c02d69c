//! Capability Gateway Library
//!
//! Control plane for a fleet of independently deployed capability providers
//! (tool invokers, resource providers, code execution engines) plus proxying
//! to remote MCP servers ("forwards").
//!
//! # Components
//!
//! - **Registry**: concurrent map of live capabilities with bounded health
//!   history, staleness queries and fleet status
//! - **Registration client**: provider-side register/ping loop with retries
//!   and a cached identity that survives restarts
//! - **Health scheduler**: periodic, deduplicated, worker-bounded probes
//! - **Forwards**: per-forward MCP resolvers listing and invoking remote
//!   tools and resources
//! - **Label expressions**: `key=value`, `!=`, `!`, `&`, `|` and parentheses
//!   for selecting entities by metadata

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod forward;
pub mod health;
pub mod labels;
pub mod persistence;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;
pub mod types;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))?,
    }

    Ok(())
}
