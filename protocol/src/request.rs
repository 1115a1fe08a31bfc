//! The JSON-RPC 2.0 envelope as the router sees it.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::JSONRPC_VERSION;
use crate::headers::HEADER_MCP_SESSION_ID;
use crate::methods::METHOD_TOOLS_CALL;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed JSON-RPC body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported JSON-RPC version `{0}`")]
    Version(String),
    #[error("missing JSON-RPC method")]
    MissingMethod,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<JsonValue>,
}

/// A parsed client request, together with the request headers it arrived
/// with. An absent `id` marks a notification.
#[derive(Debug, Clone, Default)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: Option<i64>,
    pub method: String,
    pub params: Option<JsonValue>,
    /// Request headers captured off the proxy stream, lowercased keys.
    pub headers: HashMap<String, String>,
    /// Whether the proxy delivered the body in more than one chunk.
    pub streaming: bool,
}

impl McpRequest {
    /// Parses a request body, enforcing the envelope invariants the router
    /// relies on: version `"2.0"` and a non-empty method.
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        let raw: RawEnvelope = serde_json::from_slice(body)?;
        let jsonrpc = raw.jsonrpc.unwrap_or_default();
        if jsonrpc != JSONRPC_VERSION {
            return Err(ProtocolError::Version(jsonrpc));
        }
        let method = match raw.method {
            Some(method) if !method.is_empty() => method,
            _ => return Err(ProtocolError::MissingMethod),
        };
        Ok(Self {
            jsonrpc,
            id: raw.id,
            method,
            params: raw.params,
            headers: HashMap::new(),
            streaming: false,
        })
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// The prefixed tool name, present only for `tools/call`.
    pub fn tool_name(&self) -> Option<&str> {
        if self.method != METHOD_TOOLS_CALL {
            return None;
        }
        self.params
            .as_ref()
            .and_then(|params| params.get("name"))
            .and_then(JsonValue::as_str)
    }

    /// The MCP session id the client attached, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.headers.get(HEADER_MCP_SESSION_ID).map(String::as_str)
    }
}

/// Error object of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

/// A JSON-RPC response as returned by a backend. Exactly one of `result` and
/// `error` is populated on the wire; both are kept so callers can decide.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub result: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    /// Unwraps the result, converting a JSON-RPC error object into `Err`.
    pub fn into_result(self) -> Result<JsonValue, RpcError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(self.result.unwrap_or(JsonValue::Null))
    }
}
