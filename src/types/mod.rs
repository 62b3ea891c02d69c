//! Domain types shared by the registry, the health scheduler and the forward proxy

mod forward;
mod service;

pub use forward::{
    ForwardReference, InputSchema, NameNamespacePair, Property, REMOTE_RESOURCE_TYPE,
    REMOTE_TOOL_TYPE, ResourceReference, ToolReference,
};
pub use service::{
    ActivityRecord, HealthStatus, ServiceState, ServiceTarget, ServiceType, StaleCapability,
};
