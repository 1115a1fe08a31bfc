//! Span handling for the ext_proc stream.
//!
//! One span covers one HTTP transaction, opened when the request headers
//! arrive and enriched as later frames reveal the JSON-RPC envelope, the
//! resolved backend and the response status. Field names follow the OTel
//! semantic conventions so an exporting subscriber can forward them as-is.

use gateway_protocol::JSONRPC_VERSION;
use gateway_protocol::McpRequest;
use gateway_protocol::methods::METHOD_TOOLS_CALL;
use tracing::Span;
use tracing::field;
use tracing::info_span;

pub struct ProcessSpan(Span);

impl ProcessSpan {
    pub fn new(http_method: &str, path: &str, request_id: &str, traceparent: Option<&str>) -> Self {
        let span = info_span!(
            "mcp-router.process",
            http.method = %http_method,
            http.path = %path,
            http.request_id = %request_id,
            http.status_code = field::Empty,
            mcp.method.name = field::Empty,
            mcp.session.id = field::Empty,
            mcp.server = field::Empty,
            jsonrpc.protocol.version = field::Empty,
            jsonrpc.request.id = field::Empty,
            gen_ai.tool.name = field::Empty,
            gen_ai.operation.name = field::Empty,
            client.address = field::Empty,
            "error.type" = field::Empty,
            error_source = field::Empty,
            trace.parent = field::Empty,
        );
        if let Some(traceparent) = traceparent {
            span.record("trace.parent", traceparent);
        }
        Self(span)
    }

    pub fn record_request(&self, request: &McpRequest, client_address: Option<&str>) -> &Self {
        self.0.record("mcp.method.name", request.method.as_str());
        self.0.record("jsonrpc.protocol.version", JSONRPC_VERSION);
        if let Some(id) = request.id {
            self.0.record("jsonrpc.request.id", id);
        }
        if let Some(session) = request.session_id() {
            self.0.record("mcp.session.id", session);
        }
        if let Some(tool) = request.tool_name() {
            self.0.record("gen_ai.tool.name", tool);
        }
        if request.method == METHOD_TOOLS_CALL {
            self.0.record("gen_ai.operation.name", "execute_tool");
        }
        if let Some(address) = client_address {
            self.0.record("client.address", address);
        }
        self
    }

    pub fn record_server(&self, server_name: &str) -> &Self {
        self.0.record("mcp.server", server_name);
        self
    }

    pub fn record_status(&self, status: u16) -> &Self {
        self.0.record("http.status_code", status);
        self
    }

    pub fn record_stream_error(&self, message: &str) -> &Self {
        self.0.record("error.type", message);
        self.0.record("error_source", "ext-proc");
        self.0.record("http.status_code", 500_u16);
        self
    }

    pub fn span(&self) -> Span {
        self.0.clone()
    }
}
