//! The ext_proc stream machine.
//!
//! The proxy sends frames for one HTTP transaction in a fixed causal order:
//! request headers, then an optional request body, then response headers
//! (response bodies are not forwarded by configuration). Every frame gets a
//! reply before the next `recv`, so per-stream state is a plain struct owned
//! by the stream task; a slow backend stalls its own transaction and nothing
//! else.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use gateway_core::McpServersConfig;
use gateway_core::SessionKeyMinter;
use gateway_core::SessionStore;
use gateway_core::UpstreamId;
use gateway_protocol::McpRequest;
use gateway_protocol::ProtocolError;
use gateway_protocol::headers::HEADER_FORWARDED_FOR;
use gateway_protocol::headers::HEADER_GATEWAY_API_KEY;
use gateway_protocol::headers::HEADER_MCP_METHOD;
use gateway_protocol::headers::HEADER_MCP_SERVER_NAME;
use gateway_protocol::headers::HEADER_MCP_SESSION_ID;
use gateway_protocol::headers::HEADER_REQUEST_ID;
use gateway_protocol::headers::HEADER_TRACEPARENT;
use gateway_protocol::headers::PSEUDO_AUTHORITY;
use gateway_protocol::headers::PSEUDO_METHOD;
use gateway_protocol::headers::PSEUDO_PATH;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tonic::Streaming;
use tracing::info;
use tracing::warn;

use crate::envoy::r#type::v3::StatusCode;
use crate::envoy::service::ext_proc::v3::HttpBody;
use crate::envoy::service::ext_proc::v3::HttpHeaders;
use crate::envoy::service::ext_proc::v3::ProcessingRequest;
use crate::envoy::service::ext_proc::v3::ProcessingResponse;
use crate::envoy::service::ext_proc::v3::external_processor_server::ExternalProcessor;
use crate::envoy::service::ext_proc::v3::external_processor_server::ExternalProcessorServer;
use crate::envoy::service::ext_proc::v3::processing_request::Request as RequestFrame;
use crate::headers::body_response;
use crate::headers::headers_response;
use crate::headers::immediate;
use crate::headers::mutation;
use crate::headers::response_body_passthrough;
use crate::headers::response_headers_response;
use crate::headers::to_map;
use crate::trace::ProcessSpan;

const INVALID_REQUEST_BODY: &str = "invalid mcp request";

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("frame received out of order")]
    OutOfOrderFrame,
    #[error(transparent)]
    InvalidBody(#[from] ProtocolError),
}

impl RouterError {
    fn into_immediate(self) -> ProcessingResponse {
        immediate(StatusCode::BadRequest, INVALID_REQUEST_BODY)
    }
}

/// What the driver wants sent for one received frame, and whether the
/// transaction is finished.
pub struct FrameStep {
    pub responses: Vec<ProcessingResponse>,
    pub done: bool,
}

impl FrameStep {
    fn reply(response: ProcessingResponse) -> Self {
        Self {
            responses: vec![response],
            done: false,
        }
    }

    fn finish(response: ProcessingResponse) -> Self {
        Self {
            responses: vec![response],
            done: true,
        }
    }
}

struct ResolvedTarget {
    upstream_id: UpstreamId,
    server_name: String,
}

/// Per-transaction state machine, one per accepted ext_proc stream.
pub struct StreamDriver {
    config: Arc<McpServersConfig>,
    sessions: Arc<dyn SessionStore>,
    minter: Arc<SessionKeyMinter>,
    headers: Option<HashMap<String, String>>,
    request: Option<McpRequest>,
    request_id: String,
    body: Vec<u8>,
    body_chunks: usize,
    resolved: Option<ResolvedTarget>,
    span: Option<ProcessSpan>,
}

impl StreamDriver {
    pub fn new(
        config: Arc<McpServersConfig>,
        sessions: Arc<dyn SessionStore>,
        minter: Arc<SessionKeyMinter>,
    ) -> Self {
        Self {
            config,
            sessions,
            minter,
            headers: None,
            request: None,
            request_id: String::new(),
            body: Vec::new(),
            body_chunks: 0,
            resolved: None,
            span: None,
        }
    }

    pub async fn on_frame(&mut self, frame: ProcessingRequest) -> FrameStep {
        match frame.request {
            Some(RequestFrame::RequestHeaders(headers)) => {
                self.on_request_headers(headers).await
            }
            Some(RequestFrame::RequestBody(body)) => self.on_request_body(body).await,
            Some(RequestFrame::ResponseHeaders(headers)) => {
                self.on_response_headers(headers).await
            }
            Some(RequestFrame::ResponseBody(_)) => {
                // The proxy is configured not to forward response bodies;
                // answer politely instead of consuming them.
                warn!(request_id = %self.request_id, "unexpected response body frame");
                FrameStep::reply(response_body_passthrough())
            }
            None => FrameStep::finish(RouterError::OutOfOrderFrame.into_immediate()),
        }
    }

    pub fn record_stream_error(&self, status: &Status) {
        if let Some(span) = &self.span {
            span.record_stream_error(&status.to_string());
        }
    }

    async fn on_request_headers(&mut self, frame: HttpHeaders) -> FrameStep {
        let headers = to_map(frame.headers.as_ref());
        let http_method = headers.get(PSEUDO_METHOD).cloned().unwrap_or_default();
        let path = headers.get(PSEUDO_PATH).cloned().unwrap_or_default();
        self.request_id = headers.get(HEADER_REQUEST_ID).cloned().unwrap_or_default();

        let span = ProcessSpan::new(
            &http_method,
            &path,
            &self.request_id,
            headers.get(HEADER_TRACEPARENT).map(String::as_str),
        );
        self.span = Some(span);

        if let Some(expected) = self.config.snapshot().router_api_key.as_deref() {
            let presented = headers.get(HEADER_GATEWAY_API_KEY).map(String::as_str);
            if presented != Some(expected) {
                info!(request_id = %self.request_id, "gateway api key missing or wrong");
                return FrameStep::finish(immediate(StatusCode::Forbidden, "forbidden"));
            }
        }

        // Explicit MCP session termination: drop the cached entry and let
        // the transaction continue to the aggregated endpoint.
        if http_method.eq_ignore_ascii_case("DELETE")
            && let Some(key) = headers.get(HEADER_MCP_SESSION_ID)
        {
            if let Err(err) = self.sessions.delete_sessions(&[key.clone()]).await {
                warn!(request_id = %self.request_id, "session delete failed: {err}");
            }
        }

        self.headers = Some(headers);
        // Clear `:authority` so the body phase can rewrite it toward the
        // resolved backend.
        FrameStep::reply(headers_response(Some(mutation(
            Vec::new(),
            vec![PSEUDO_AUTHORITY.to_string()],
        ))))
    }

    async fn on_request_body(&mut self, frame: HttpBody) -> FrameStep {
        let Some(headers) = self.headers.clone() else {
            return FrameStep::finish(RouterError::OutOfOrderFrame.into_immediate());
        };

        self.body_chunks += 1;
        self.body.extend_from_slice(&frame.body);
        if !frame.end_of_stream {
            return FrameStep::reply(body_response(None));
        }
        if self.body.is_empty() {
            return FrameStep::reply(body_response(None));
        }

        let mut request = match McpRequest::parse(&self.body) {
            Ok(request) => request,
            Err(err) => {
                info!(request_id = %self.request_id, "rejecting request body: {err}");
                return FrameStep::finish(RouterError::InvalidBody(err).into_immediate());
            }
        };
        request.streaming = self.body_chunks > 1;
        request = request.with_headers(headers);

        if let Some(span) = &self.span {
            span.record_request(
                &request,
                request
                    .headers
                    .get(HEADER_FORWARDED_FOR)
                    .and_then(|xff| xff.split(',').next())
                    .map(str::trim),
            );
        }

        let step = self.route(&request).await;
        self.request = Some(request);
        step
    }

    /// Resolves the target backend and builds the request-phase header
    /// rewrite.
    async fn route(&mut self, request: &McpRequest) -> FrameStep {
        let snapshot = self.config.snapshot();
        let mut set = vec![(HEADER_MCP_METHOD.to_string(), request.method.clone())];
        let mut server_name = String::new();

        if let Some(tool) = request.tool_name() {
            let Some(server) = snapshot.server_for_tool(tool) else {
                // Unresolvable prefix: hand the request through unchanged
                // and let the aggregated endpoint answer.
                info!(
                    request_id = %self.request_id,
                    tool,
                    "no enabled backend owns this tool; passing through"
                );
                return FrameStep::reply(body_response(None));
            };

            server_name = server.name.clone();
            let upstream_id = server.upstream_id();
            set.push((
                PSEUDO_AUTHORITY.to_string(),
                server.effective_hostname(),
            ));

            if let Some(key) = request.session_id() {
                match self.sessions.get_session(key).await {
                    Ok(Some(backends)) => {
                        if let Some(backend_session) = backends.get(&upstream_id) {
                            set.push((HEADER_MCP_SESSION_ID.to_string(), backend_session.clone()));
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        // Session state is best-effort; the request goes on.
                        warn!(request_id = %self.request_id, "session lookup failed: {err}");
                    }
                }
            }

            if let Some(span) = &self.span {
                span.record_server(&server_name);
            }
            self.resolved = Some(ResolvedTarget {
                upstream_id,
                server_name: server_name.clone(),
            });
        }

        set.push((HEADER_MCP_SERVER_NAME.to_string(), server_name));
        FrameStep::reply(body_response(Some(mutation(set, Vec::new()))))
    }

    async fn on_response_headers(&mut self, frame: HttpHeaders) -> FrameStep {
        if self.headers.is_none() {
            return FrameStep::finish(RouterError::OutOfOrderFrame.into_immediate());
        }
        let response_headers = to_map(frame.headers.as_ref());

        if let Some(span) = &self.span
            && let Some(status) = response_headers
                .get(":status")
                .and_then(|status| status.parse::<u16>().ok())
        {
            span.record_status(status);
        }

        let mut header_mutation = None;
        if let (Some(resolved), Some(backend_session)) = (
            self.resolved.as_ref(),
            response_headers.get(HEADER_MCP_SESSION_ID),
        ) {
            if let Some(client_key) = self.capture_session(resolved, backend_session).await {
                // The client only ever sees the gateway's key, never the
                // backend's own session id.
                header_mutation = Some(mutation(
                    vec![(HEADER_MCP_SESSION_ID.to_string(), client_key)],
                    Vec::new(),
                ));
            }
        }

        FrameStep::finish(response_headers_response(header_mutation))
    }

    /// Records `backend_session` for the transaction's backend under the
    /// client's session key, minting a key when the client has none yet.
    /// Returns the key to surface to the client.
    async fn capture_session(
        &self,
        resolved: &ResolvedTarget,
        backend_session: &str,
    ) -> Option<String> {
        let presented = self
            .request
            .as_ref()
            .and_then(McpRequest::session_id)
            .map(str::to_string);
        let key = match presented {
            Some(key) => key,
            None => match self.minter.mint() {
                Ok(key) => key,
                Err(err) => {
                    warn!(request_id = %self.request_id, "failed to mint session key: {err}");
                    return None;
                }
            },
        };

        match self
            .sessions
            .add_session(&key, &resolved.upstream_id, backend_session)
            .await
        {
            Ok(created) => {
                if created {
                    info!(
                        request_id = %self.request_id,
                        server = %resolved.server_name,
                        "established session with backend"
                    );
                }
                Some(key)
            }
            Err(err) => {
                warn!(request_id = %self.request_id, "session store update failed: {err}");
                None
            }
        }
    }
}

/// The External Processor service: one [`StreamDriver`] per accepted
/// stream, frames handled strictly in receipt order.
pub struct RouterService {
    config: Arc<McpServersConfig>,
    sessions: Arc<dyn SessionStore>,
    minter: Arc<SessionKeyMinter>,
}

impl RouterService {
    pub fn new(
        config: Arc<McpServersConfig>,
        sessions: Arc<dyn SessionStore>,
        minter: Arc<SessionKeyMinter>,
    ) -> Self {
        Self {
            config,
            sessions,
            minter,
        }
    }

    pub fn driver(&self) -> StreamDriver {
        StreamDriver::new(
            Arc::clone(&self.config),
            Arc::clone(&self.sessions),
            Arc::clone(&self.minter),
        )
    }
}

#[tonic::async_trait]
impl ExternalProcessor for RouterService {
    type ProcessStream =
        Pin<Box<dyn Stream<Item = Result<ProcessingResponse, Status>> + Send + 'static>>;

    async fn process(
        &self,
        request: Request<Streaming<ProcessingRequest>>,
    ) -> Result<Response<Self::ProcessStream>, Status> {
        let mut inbound = request.into_inner();
        let mut driver = self.driver();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            loop {
                let frame = match inbound.message().await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(status) => {
                        driver.record_stream_error(&status);
                        break;
                    }
                };
                let step = driver.on_frame(frame).await;
                for response in step.responses {
                    if tx.send(Ok(response)).await.is_err() {
                        return;
                    }
                }
                if step.done {
                    break;
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

/// Serves the router on `addr` until the task is cancelled.
pub async fn serve(
    addr: SocketAddr,
    service: RouterService,
) -> Result<(), tonic::transport::Error> {
    info!(%addr, "starting ext_proc router");
    tonic::transport::Server::builder()
        .add_service(ExternalProcessorServer::new(service))
        .serve(addr)
        .await
}
