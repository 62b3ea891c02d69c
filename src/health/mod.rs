//! Capability health probing
//!
//! - [`HealthProbe`]: asks one capability how it is doing
//! - [`HealthCheckScheduler`]: sweeps the whole registry on a fixed period,
//!   one independent probe per capability, bounded by a worker pool and
//!   deduplicated per capability id

mod probe;
mod scheduler;

pub use probe::{HealthProbe, ProbeReply, RpcHealthProbe, RuntimeStatus};
pub use scheduler::HealthCheckScheduler;
