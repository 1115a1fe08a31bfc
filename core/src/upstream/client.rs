//! The backend-facing MCP client.
//!
//! [`UpstreamClient`] is the seam the supervisor is written against, so
//! tests drive the supervisor with in-memory fakes. The production
//! implementation speaks MCP over streamable HTTP: JSON-RPC bodies POSTed to
//! the backend URL, responses arriving either as plain JSON or as a
//! single-request SSE stream, the backend session id carried in the
//! `mcp-session-id` header.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use gateway_protocol::InitializeResult;
use gateway_protocol::JsonRpcResponse;
use gateway_protocol::Tool;
use gateway_protocol::ToolsListResult;
use gateway_protocol::headers::HEADER_MCP_SESSION_ID;
use gateway_protocol::methods::METHOD_INITIALIZE;
use gateway_protocol::methods::METHOD_PING;
use gateway_protocol::methods::METHOD_TOOLS_LIST;
use gateway_protocol::methods::NOTIFICATION_INITIALIZED;
use reqwest::header::ACCEPT;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value as JsonValue;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::config::McpServer;
use crate::config::ResolvedCredential;
use crate::config::UpstreamId;

/// MCP protocol revision the gateway offers during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// Per-request deadline for backend I/O.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub type NotificationHandler = Arc<dyn Fn(&str) + Send + Sync>;
pub type ConnectionLostHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed backend payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("backend returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("backend response stream carried no reply for request {0}")]
    MissingResponse(i64),
    #[error("not connected")]
    NotConnected,
}

/// Operations the supervisor needs from a backend connection.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn connect(&self) -> Result<(), UpstreamError>;
    async fn disconnect(&self) -> Result<(), UpstreamError>;
    async fn ping(&self) -> Result<(), UpstreamError>;
    async fn list_tools(&self) -> Result<Vec<Tool>, UpstreamError>;
    /// The `initialize` result captured at connect time.
    async fn protocol_info(&self) -> Option<InitializeResult>;
    async fn supports_tools_list_changed(&self) -> bool;
    /// Registers the handler invoked with the method name of every
    /// server-initiated notification. Replaces any previous handler.
    fn on_notification(&self, handler: NotificationHandler);
    /// Registers the handler invoked when the transport drops underneath an
    /// established connection.
    fn on_connection_lost(&self, handler: ConnectionLostHandler);
    fn id(&self) -> UpstreamId;
    fn name(&self) -> String;
    fn prefix(&self) -> String;
    fn server_config(&self) -> McpServer;
}

#[derive(Default)]
struct ConnState {
    connected: bool,
    session_id: Option<String>,
    init: Option<InitializeResult>,
}

pub struct StreamableHttpClient {
    config: McpServer,
    id: UpstreamId,
    http: reqwest::Client,
    next_id: AtomicI64,
    state: Mutex<ConnState>,
    notification_handler: Mutex<Option<NotificationHandler>>,
    connection_lost_handler: Mutex<Option<ConnectionLostHandler>>,
}

impl StreamableHttpClient {
    pub fn new(config: McpServer) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let id = config.upstream_id();
        Ok(Self {
            config,
            id,
            http,
            next_id: AtomicI64::new(1),
            state: Mutex::new(ConnState::default()),
            notification_handler: Mutex::new(None),
            connection_lost_handler: Mutex::new(None),
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ConnState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.resolve_credential() {
            Some(ResolvedCredential::Bearer(token)) => {
                request.header(AUTHORIZATION, format!("Bearer {token}"))
            }
            Some(ResolvedCredential::Basic { username, password }) => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                request.header(AUTHORIZATION, format!("Basic {encoded}"))
            }
            None => request,
        }
    }

    fn dispatch_notification(&self, method: &str) {
        let handler = match self.notification_handler.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(handler) = handler {
            handler(method);
        }
    }

    fn fire_connection_lost(&self) {
        let was_connected = {
            let mut state = self.lock_state();
            std::mem::replace(&mut state.connected, false)
        };
        if !was_connected {
            return;
        }
        let handler = match self.connection_lost_handler.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Sends one request and returns its result, draining any notifications
    /// that share the response stream.
    async fn rpc(&self, method: &str, params: Option<JsonValue>) -> Result<JsonValue, UpstreamError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut envelope = serde_json::Map::new();
        envelope.insert("jsonrpc".to_string(), json!("2.0"));
        envelope.insert("id".to_string(), json!(id));
        envelope.insert("method".to_string(), json!(method));
        if let Some(params) = params {
            envelope.insert("params".to_string(), params);
        }

        let mut request = self
            .http
            .post(&self.config.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(&JsonValue::Object(envelope));
        request = self.apply_auth(request);
        if let Some(session) = self.lock_state().session_id.clone() {
            request = request.header(HEADER_MCP_SESSION_ID, session);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                self.fire_connection_lost();
                return Err(err.into());
            }
        };
        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }
        if let Some(session) = response
            .headers()
            .get(HEADER_MCP_SESSION_ID)
            .and_then(|value| value.to_str().ok())
        {
            self.lock_state().session_id = Some(session.to_string());
        }

        let event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));
        let body = response.text().await?;

        let reply = if event_stream {
            self.response_from_sse(&body, id)?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body)?
        };
        reply
            .into_result()
            .map_err(|err| UpstreamError::Rpc {
                code: err.code,
                message: err.message,
            })
    }

    /// Pulls the reply with our request id out of an SSE body, dispatching
    /// any interleaved notifications along the way.
    fn response_from_sse(&self, body: &str, id: i64) -> Result<JsonRpcResponse, UpstreamError> {
        let mut reply = None;
        for data in sse_data_payloads(body) {
            let message: JsonValue = serde_json::from_str(&data)?;
            if let Some(method) = message.get("method").and_then(JsonValue::as_str) {
                debug!(method, backend = %self.config.name, "backend notification");
                self.dispatch_notification(method);
                continue;
            }
            if message.get("id").and_then(JsonValue::as_i64) == Some(id) {
                reply = Some(serde_json::from_value::<JsonRpcResponse>(message)?);
            }
        }
        reply.ok_or(UpstreamError::MissingResponse(id))
    }

    /// Fire-and-forget notification to the backend.
    async fn notify(&self, method: &str) -> Result<(), UpstreamError> {
        let envelope = json!({"jsonrpc": "2.0", "method": method});
        let mut request = self
            .http
            .post(&self.config.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(&envelope);
        request = self.apply_auth(request);
        if let Some(session) = self.lock_state().session_id.clone() {
            request = request.header(HEADER_MCP_SESSION_ID, session);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl UpstreamClient for StreamableHttpClient {
    async fn connect(&self) -> Result<(), UpstreamError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "mcp-gateway",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result = self.rpc(METHOD_INITIALIZE, Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result)?;
        {
            let mut state = self.lock_state();
            state.init = Some(init);
            state.connected = true;
        }
        // Backends are free to reject the initialized notification; the
        // connection is already established at that point.
        if let Err(err) = self.notify(NOTIFICATION_INITIALIZED).await {
            warn!(backend = %self.config.name, "initialized notification failed: {err}");
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), UpstreamError> {
        let session = {
            let mut state = self.lock_state();
            state.connected = false;
            state.init = None;
            state.session_id.take()
        };
        if let Some(session) = session {
            // Best-effort MCP session termination.
            let mut request = self
                .http
                .delete(&self.config.url)
                .header(HEADER_MCP_SESSION_ID, session);
            request = self.apply_auth(request);
            if let Err(err) = request.send().await {
                debug!(backend = %self.config.name, "session termination failed: {err}");
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), UpstreamError> {
        if !self.lock_state().connected {
            return Err(UpstreamError::NotConnected);
        }
        self.rpc(METHOD_PING, None).await.map(|_| ())
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, UpstreamError> {
        if !self.lock_state().connected {
            return Err(UpstreamError::NotConnected);
        }
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|cursor| json!({"cursor": cursor}));
            let result = self.rpc(METHOD_TOOLS_LIST, params).await?;
            let page: ToolsListResult = serde_json::from_value(result)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(tools)
    }

    async fn protocol_info(&self) -> Option<InitializeResult> {
        self.lock_state().init.clone()
    }

    async fn supports_tools_list_changed(&self) -> bool {
        self.lock_state()
            .init
            .as_ref()
            .is_some_and(InitializeResult::supports_tools_list_changed)
    }

    fn on_notification(&self, handler: NotificationHandler) {
        match self.notification_handler.lock() {
            Ok(mut guard) => *guard = Some(handler),
            Err(poisoned) => *poisoned.into_inner() = Some(handler),
        }
    }

    fn on_connection_lost(&self, handler: ConnectionLostHandler) {
        match self.connection_lost_handler.lock() {
            Ok(mut guard) => *guard = Some(handler),
            Err(poisoned) => *poisoned.into_inner() = Some(handler),
        }
    }

    fn id(&self) -> UpstreamId {
        self.id.clone()
    }

    fn name(&self) -> String {
        self.config.name.clone()
    }

    fn prefix(&self) -> String {
        self.config.tool_prefix.clone()
    }

    fn server_config(&self) -> McpServer {
        self.config.clone()
    }
}

/// Joins the `data:` lines of each SSE event into one payload per event.
fn sse_data_payloads(body: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in body.lines() {
        if line.is_empty() {
            if !current.is_empty() {
                payloads.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if !current.is_empty() {
        payloads.push(current.join("\n"));
    }
    payloads
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::body_partial_json;
    use wiremock::matchers::header;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    fn config_for(server: &MockServer) -> McpServer {
        McpServer {
            name: "test-server".to_string(),
            url: format!("{}/mcp", server.uri()),
            hostname: String::new(),
            tool_prefix: "test_".to_string(),
            credential_env_var: String::new(),
            enabled: true,
            auth: None,
        }
    }

    fn initialize_response() -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "protocolVersion": "2025-03-26",
                "capabilities": {"tools": {"listChanged": true}},
                "serverInfo": {"name": "backend", "version": "0.1.0"}
            }
        })
    }

    #[tokio::test]
    async fn connect_captures_session_and_capabilities() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("mcp-session-id", "backend-sess-1")
                    .set_body_json(initialize_response()),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .and(header("mcp-session-id", "backend-sess-1"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let client = StreamableHttpClient::new(config_for(&server)).expect("build client");
        client.connect().await.expect("connect");

        assert!(client.supports_tools_list_changed().await);
        let info = client.protocol_info().await.expect("protocol info");
        assert_eq!(info.server_info.name, "backend");
    }

    #[tokio::test]
    async fn list_tools_follows_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/list", "params": {"cursor": "page-2"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 3,
                "result": {"tools": [
                    {"name": "tool2", "inputSchema": {"type": "object"}}
                ]}
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": {
                    "tools": [{"name": "tool1", "inputSchema": {"type": "object"}}],
                    "nextCursor": "page-2"
                }
            })))
            .mount(&server)
            .await;

        let client = StreamableHttpClient::new(config_for(&server)).expect("build client");
        client.connect().await.expect("connect");
        let tools = client.list_tools().await.expect("list tools");
        let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names, vec!["tool1", "tool2"]);
    }

    #[tokio::test]
    async fn sse_responses_are_parsed_and_notifications_dispatched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        let sse = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/tools/list_changed\"}\n",
            "\n",
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{}}\n",
            "\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "ping"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let client = StreamableHttpClient::new(config_for(&server)).expect("build client");
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_handler = seen.clone();
        client.on_notification(Arc::new(move |method| {
            if method == "notifications/tools/list_changed" {
                seen_in_handler.fetch_add(1, Ordering::SeqCst);
            }
        }));
        client.connect().await.expect("connect");
        client.ping().await.expect("ping");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rpc_error_surfaces_code_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32000, "message": "backend unavailable"}
            })))
            .mount(&server)
            .await;

        let client = StreamableHttpClient::new(config_for(&server)).expect("build client");
        let err = client.connect().await.expect_err("connect must fail");
        assert!(matches!(
            err,
            UpstreamError::Rpc { code: -32000, ref message } if message == "backend unavailable"
        ));
    }

    #[test]
    fn sse_payloads_join_multi_line_data() {
        // Multi-line data fields are concatenated per the SSE framing rules.
        let payloads = sse_data_payloads("data: one\ndata: two\n\ndata: three\n\n");
        assert_eq!(payloads, vec!["one\ntwo".to_string(), "three".to_string()]);
    }
}
