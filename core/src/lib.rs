#![deny(unreachable_pub)]

//! Core of the MCP gateway: the live routing configuration and its observer
//! fan-out, the per-backend upstream supervisors that keep a prefixed
//! projection of every backend's tool catalog inside the broker, and the
//! session cache the router consults when steering client traffic.

pub mod broker;
pub mod config;
pub mod session;
pub mod upstream;

pub use broker::InMemoryBroker;
pub use broker::ServerTool;
pub use broker::ToolBroker;
pub use config::ConfigObserver;
pub use config::ConfigSnapshot;
pub use config::McpServer;
pub use config::McpServersConfig;
pub use config::UpstreamId;
pub use config::VirtualServer;
pub use session::MemorySessionStore;
pub use session::SessionKeyMinter;
pub use session::SessionStore;
pub use upstream::client::StreamableHttpClient;
pub use upstream::client::UpstreamClient;
pub use upstream::client::UpstreamError;
pub use upstream::manager::ServerValidationStatus;
pub use upstream::manager::UpstreamManager;
