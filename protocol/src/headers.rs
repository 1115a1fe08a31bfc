//! Header names exchanged with the front proxy and with backends.

/// JSON-RPC method of the in-flight request, stamped for the proxy's routing
/// rules.
pub const HEADER_MCP_METHOD: &str = "x-mcp-method";
/// Resolved backend name for `tools/call` requests; empty when the request is
/// answered by the aggregated endpoint.
pub const HEADER_MCP_SERVER_NAME: &str = "x-mcp-servername";
/// Session id header defined by the MCP streamable-HTTP transport.
pub const HEADER_MCP_SESSION_ID: &str = "mcp-session-id";
/// Shared-secret gate for the router's ext_proc endpoint.
pub const HEADER_GATEWAY_API_KEY: &str = "x-mcp-gateway-key";

pub const HEADER_REQUEST_ID: &str = "x-request-id";
pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";
pub const HEADER_TRACEPARENT: &str = "traceparent";

/// Pseudo-headers surfaced by the proxy in the ext_proc header map.
pub const PSEUDO_PATH: &str = ":path";
pub const PSEUDO_METHOD: &str = ":method";
pub const PSEUDO_AUTHORITY: &str = ":authority";
