//! The broker aggregates every supervisor's prefixed tools into the catalog
//! the virtual MCP server publishes.
//!
//! Each upstream supervisor is the sole writer for tools carrying its
//! upstream id; the broker serializes writers under one lock so a reader of
//! [`ToolBroker::list_tools`] always sees a consistent snapshot. The router
//! never touches the broker on the hot path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use gateway_protocol::CallToolResult;
use gateway_protocol::Tool;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::config::UpstreamId;
use crate::config::VirtualServer;

/// Safety-net invocation path for a published tool. The normal path routes
/// at the proxy layer and never calls this.
pub trait ToolCallHandler: Send + Sync {
    fn call(&self, arguments: Option<JsonValue>) -> CallToolResult;
}

/// A prefixed tool as served by the virtual MCP endpoint.
#[derive(Clone)]
pub struct ServerTool {
    /// Prefixed name, `_meta.id` stamped with the owning upstream.
    pub tool: Tool,
    pub upstream_id: UpstreamId,
    pub handler: Arc<dyn ToolCallHandler>,
}

impl std::fmt::Debug for ServerTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerTool")
            .field("name", &self.tool.name)
            .field("upstream_id", &self.upstream_id)
            .finish()
    }
}

/// Publication surface the upstream supervisors address. Implementations
/// must be safe under concurrent calls from many supervisors.
pub trait ToolBroker: Send + Sync {
    /// Adds (or replaces) tools by prefixed name.
    fn add_tools(&self, tools: Vec<ServerTool>);
    /// Removes tools by prefixed name. Unknown names are ignored.
    fn delete_tools(&self, names: &[String]);
    /// A snapshot of the full aggregated catalog, keyed by prefixed name.
    fn list_tools(&self) -> HashMap<String, ServerTool>;
}

#[derive(Default)]
pub struct InMemoryBroker {
    tools: Mutex<HashMap<String, ServerTool>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog restricted to the subset a virtual server names.
    pub fn list_tools_for(&self, virtual_server: &VirtualServer) -> HashMap<String, ServerTool> {
        let tools = self.list_tools();
        virtual_server
            .tools
            .iter()
            .filter_map(|name| tools.get(name).map(|tool| (name.clone(), tool.clone())))
            .collect()
    }
}

impl ToolBroker for InMemoryBroker {
    fn add_tools(&self, tools: Vec<ServerTool>) {
        let Ok(mut guard) = self.tools.lock() else {
            return;
        };
        for tool in tools {
            if let Some(existing) = guard.get(&tool.tool.name)
                && existing.upstream_id != tool.upstream_id
            {
                warn!(
                    name = %tool.tool.name,
                    owner = %existing.upstream_id,
                    claimant = %tool.upstream_id,
                    "tool name collision across backends; replacing"
                );
            }
            guard.insert(tool.tool.name.clone(), tool);
        }
    }

    fn delete_tools(&self, names: &[String]) {
        let Ok(mut guard) = self.tools.lock() else {
            return;
        };
        for name in names {
            guard.remove(name);
        }
    }

    fn list_tools(&self) -> HashMap<String, ServerTool> {
        match self.tools.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => HashMap::new(),
        }
    }
}
