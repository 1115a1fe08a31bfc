//! Routing configuration: backend descriptors, the live snapshot holder, and
//! observer fan-out.
//!
//! Authoritative configuration is produced outside the core (a reconciler
//! watching a secret store, a CLI, a test). The core consumes immutable
//! [`ConfigSnapshot`] values: the holder swaps the current snapshot under a
//! writer lock and pushes the new value to registered observers, one spawned
//! task per observer so a slow observer never delays the rest.

use std::fmt;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;
use url::Url;

/// Stable identity of one configured backend, `"{name}:{prefix}:{hostname}"`.
/// Stamped as `_meta.id` on every served tool so the router can route back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpstreamId(String);

impl UpstreamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpstreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UpstreamId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Static auth material carried in the persisted config, used when no
/// credential environment variable is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UpstreamAuth {
    Bearer { token: String },
    Basic { username: String, password: String },
}

/// Credential resolved at request time.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedCredential {
    Bearer(String),
    Basic { username: String, password: String },
}

/// One backend MCP server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServer {
    /// Unique, user-given name.
    pub name: String,
    /// Absolute URL of the backend's MCP endpoint, path included.
    pub url: String,
    /// Routing target for the proxy; may differ from the URL host. Empty
    /// means "use the URL host".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    /// Prefix applied to every tool name from this backend. Opaque; empty
    /// publishes names verbatim.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_prefix: String,
    /// Process-env key yielding a bearer credential. Empty means no env
    /// credential; `auth` is the fallback.
    #[serde(
        rename = "credential",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub credential_env_var: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<UpstreamAuth>,
}

impl McpServer {
    /// The hostname the proxy should target: the configured override, or the
    /// URL host when none is set.
    pub fn effective_hostname(&self) -> String {
        if !self.hostname.is_empty() {
            return self.hostname.clone();
        }
        Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    pub fn upstream_id(&self) -> UpstreamId {
        UpstreamId(format!(
            "{}:{}:{}",
            self.name,
            self.tool_prefix,
            self.effective_hostname()
        ))
    }

    /// Resolves the credential to attach to backend requests. The env var
    /// wins over static auth; a configured-but-unset env var resolves to
    /// nothing rather than falling through to stale static material.
    pub fn resolve_credential(&self) -> Option<ResolvedCredential> {
        if !self.credential_env_var.is_empty() {
            return std::env::var(&self.credential_env_var)
                .ok()
                .filter(|token| !token.is_empty())
                .map(ResolvedCredential::Bearer);
        }
        match &self.auth {
            Some(UpstreamAuth::Bearer { token }) => Some(ResolvedCredential::Bearer(token.clone())),
            Some(UpstreamAuth::Basic { username, password }) => Some(ResolvedCredential::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            None => None,
        }
    }
}

/// A named subset of prefixed tool names served as its own catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServer {
    pub name: String,
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("server `{name}`: invalid url `{url}`")]
    InvalidUrl { name: String, url: String },
    #[error("duplicate server name `{0}`")]
    DuplicateServerName(String),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// An immutable view of the gateway configuration. The persisted document
/// carries `servers` and `virtualServers`; the gateway-level fields are
/// filled in by whoever assembles the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    #[serde(default)]
    pub servers: Vec<McpServer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_servers: Vec<VirtualServer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateway_hostnames: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_api_key: Option<String>,
}

impl ConfigSnapshot {
    pub fn from_yaml(document: &str) -> Result<Self, ConfigError> {
        let snapshot: Self = serde_yaml::from_str(document)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Rejects configurations the gateway cannot route: duplicate names and
    /// relative URLs. Shared prefixes between enabled servers are legal (the
    /// first match in configured order wins) but get a warning, since the
    /// later server's tools are shadowed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = std::collections::HashSet::new();
        for server in &self.servers {
            if !names.insert(server.name.as_str()) {
                return Err(ConfigError::DuplicateServerName(server.name.clone()));
            }
            let parsed = Url::parse(&server.url);
            if !parsed.is_ok_and(|url| url.has_host()) {
                return Err(ConfigError::InvalidUrl {
                    name: server.name.clone(),
                    url: server.url.clone(),
                });
            }
        }
        let enabled: Vec<&McpServer> = self.servers.iter().filter(|s| s.enabled).collect();
        for (i, server) in enabled.iter().enumerate() {
            if let Some(other) = enabled[..i]
                .iter()
                .find(|other| other.tool_prefix == server.tool_prefix)
            {
                warn!(
                    first = %other.name,
                    shadowed = %server.name,
                    prefix = %server.tool_prefix,
                    "enabled servers share a tool prefix; the first match wins"
                );
            }
        }
        Ok(())
    }

    /// The owning server for a prefixed tool name: the first enabled server,
    /// in configured order, whose prefix is a prefix of the name. An empty
    /// prefix matches every name, acting as an ordered catch-all.
    pub fn server_for_tool(&self, prefixed_name: &str) -> Option<&McpServer> {
        self.servers
            .iter()
            .find(|server| server.enabled && prefixed_name.starts_with(&server.tool_prefix))
    }

    pub fn server_named(&self, name: &str) -> Option<&McpServer> {
        self.servers.iter().find(|server| server.name == name)
    }
}

/// Receives the new snapshot on every configuration change. Delivery is
/// at-least-once and unordered between observers; implementations must be
/// idempotent in applying a snapshot.
pub trait ConfigObserver: Send + Sync {
    fn on_change(&self, snapshot: Arc<ConfigSnapshot>);
}

/// The live configuration: single writer, many readers.
pub struct McpServersConfig {
    current: RwLock<Arc<ConfigSnapshot>>,
    observers: RwLock<Vec<Arc<dyn ConfigObserver>>>,
    generation: AtomicU64,
}

impl Default for McpServersConfig {
    fn default() -> Self {
        Self::new(ConfigSnapshot::default())
    }
}

impl McpServersConfig {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            observers: RwLock::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// A consistent view of the current configuration.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Installs a new snapshot and notifies every observer. Each observer is
    /// notified on its own task; a slow observer cannot block the writer or
    /// its peers. Requires a tokio runtime.
    pub fn replace(&self, snapshot: ConfigSnapshot) {
        let snapshot = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = Arc::clone(&snapshot),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&snapshot),
        }
        self.generation.fetch_add(1, Ordering::AcqRel);

        let observers = match self.observers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for observer in observers {
            let snapshot = Arc::clone(&snapshot);
            tokio::spawn(async move {
                observer.on_change(snapshot);
            });
        }
    }

    pub fn register_observer(&self, observer: Arc<dyn ConfigObserver>) {
        match self.observers.write() {
            Ok(mut guard) => guard.push(observer),
            Err(poisoned) => poisoned.into_inner().push(observer),
        }
    }
}
