//! Backend-facing side of the gateway: the MCP client seam and the
//! per-backend supervisor that keeps the broker's projection live.

pub mod client;
pub mod manager;
