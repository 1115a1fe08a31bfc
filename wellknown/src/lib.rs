#![deny(unreachable_pub)]

//! OAuth protected-resource metadata endpoint.
//!
//! Serves `/.well-known/oauth-protected-resource` so MCP clients can
//! discover how to obtain credentials for the gateway. The document is
//! assembled from environment variables with sensible defaults; the env
//! reader is injectable so tests never mutate process state.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

pub const WELL_KNOWN_PATH: &str = "/.well-known/oauth-protected-resource";

pub const ENV_RESOURCE_NAME: &str = "OAUTH_RESOURCE_NAME";
pub const ENV_RESOURCE: &str = "OAUTH_RESOURCE";
pub const ENV_AUTHORIZATION_SERVERS: &str = "OAUTH_AUTHORIZATION_SERVERS";
pub const ENV_BEARER_METHODS: &str = "OAUTH_BEARER_METHODS_SUPPORTED";
pub const ENV_SCOPES: &str = "OAUTH_SCOPES_SUPPORTED";

/// Reads one environment variable; `None` when unset.
pub type EnvReader = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource_name: String,
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
}

impl ProtectedResourceMetadata {
    /// Assembles the document from the environment, falling back to the
    /// defaults for anything unset.
    pub fn from_env(env: &EnvReader) -> Self {
        Self {
            resource_name: env(ENV_RESOURCE_NAME).unwrap_or_else(|| "MCP Server".to_string()),
            resource: env(ENV_RESOURCE).unwrap_or_else(|| "/mcp".to_string()),
            authorization_servers: env(ENV_AUTHORIZATION_SERVERS)
                .map(|value| split_csv(&value))
                .unwrap_or_default(),
            bearer_methods_supported: env(ENV_BEARER_METHODS)
                .map(|value| split_csv(&value))
                .unwrap_or_else(|| vec!["header".to_string()]),
            scopes_supported: env(ENV_SCOPES)
                .map(|value| split_csv(&value))
                .unwrap_or_else(|| vec!["basic".to_string()]),
        }
    }
}

/// Splits a comma-separated value, trimming whitespace and dropping empty
/// entries.
fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone)]
struct WellKnownState {
    env: EnvReader,
}

/// The metadata router, reading from the process environment.
pub fn router() -> Router {
    router_with_env(Arc::new(|name| std::env::var(name).ok()))
}

/// The metadata router with an injected environment, for tests and embedding.
pub fn router_with_env(env: EnvReader) -> Router {
    let state = WellKnownState { env };
    Router::new()
        .route(
            WELL_KNOWN_PATH,
            get(metadata).post(metadata).options(preflight),
        )
        .with_state(state)
}

fn cors_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
}

async fn metadata(State(state): State<WellKnownState>) -> Response {
    let document = ProtectedResourceMetadata::from_env(&state.env);
    debug!(resource = %document.resource, "serving protected-resource metadata");
    let mut response = Json(document).into_response();
    cors_headers(&mut response);
    response
}

async fn preflight() -> Response {
    let mut response = StatusCode::OK.into_response();
    cors_headers(&mut response);
    response
}
