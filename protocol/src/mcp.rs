//! MCP tool-catalog wire shapes.
//!
//! These are the subset of the MCP schema the gateway actually moves around:
//! the tool descriptor returned by `tools/list` and the `initialize` result
//! needed to learn whether a backend advertises `tools.listChanged`. Field
//! names follow the MCP JSON casing, so the structs round-trip backend
//! payloads byte-for-byte at the JSON level.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Key under `_meta` where the gateway stamps the owning upstream identity.
pub const META_ID_KEY: &str = "id";

/// A named callable exposed by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonValue,
    #[serde(
        rename = "outputSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub output_schema: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<JsonValue>,
    /// Additional fields; the gateway uses this to stamp the upstream id.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, JsonValue>>,
}

impl Tool {
    /// The upstream id previously stamped into `_meta`, if any.
    pub fn meta_id(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get(META_ID_KEY))
            .and_then(JsonValue::as_str)
    }

    /// Returns a copy of this tool with `_meta.id` set, preserving any other
    /// meta fields the backend shipped.
    pub fn with_meta_id(mut self, id: &str) -> Self {
        let meta = self.meta.get_or_insert_with(serde_json::Map::new);
        meta.insert(META_ID_KEY.to_string(), JsonValue::String(id.to_string()));
        self
    }
}

/// Result payload of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<JsonValue>,
    #[serde(rename = "isError", default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// An `isError` result carrying a single text block.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![serde_json::json!({"type": "text", "text": text.into()})],
            is_error: Some(true),
        }
    }
}

/// Result payload of `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<Tool>,
    #[serde(
        rename = "nextCursor",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(
        rename = "listChanged",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

/// Result payload of `initialize`, reduced to what the gateway consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
}

impl InitializeResult {
    pub fn supports_tools_list_changed(&self) -> bool {
        self.capabilities
            .tools
            .as_ref()
            .and_then(|tools| tools.list_changed)
            .unwrap_or(false)
    }
}
