//! JSON-RPC envelopes and the MCP payloads the forward proxy exchanges

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// MCP protocol version announced during the handshake
pub const PROTOCOL_VERSION: &str = "2025-03-26";
