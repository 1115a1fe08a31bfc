#![deny(unreachable_pub)]

//! Wire-level types shared across the gateway: the JSON-RPC 2.0 envelope the
//! router parses off the proxy stream, the MCP tool-catalog shapes the
//! upstream supervisors exchange with backends, and the method/header name
//! constants both sides agree on.

pub mod headers;
pub mod mcp;
pub mod methods;
pub mod request;

pub use mcp::CallToolResult;
pub use mcp::Implementation;
pub use mcp::InitializeResult;
pub use mcp::ServerCapabilities;
pub use mcp::Tool;
pub use mcp::ToolsCapability;
pub use mcp::ToolsListResult;
pub use request::JsonRpcResponse;
pub use request::McpRequest;
pub use request::ProtocolError;
pub use request::RpcError;

/// The only JSON-RPC protocol version the gateway speaks.
pub const JSONRPC_VERSION: &str = "2.0";
