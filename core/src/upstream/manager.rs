//! Per-backend supervisor.
//!
//! One manager owns one backend: the connection, the last known tool
//! catalog, the validation status, and the prefixed projection published to
//! the broker. The supervisory loop reconnects after failures, refreshes the
//! catalog on a ticker or on a `tools/list_changed` notification, and tears
//! the connection down exactly once on stop.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use gateway_protocol::CallToolResult;
use gateway_protocol::Tool;
use gateway_protocol::methods::NOTIFICATION_TOOLS_LIST_CHANGED;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::broker::ServerTool;
use crate::broker::ToolBroker;
use crate::broker::ToolCallHandler;
use crate::config::UpstreamId;
use crate::upstream::client::UpstreamClient;

/// Fallback catalog refresh interval; configured intervals of zero (the
/// "unset" value in the persisted config) fall back to this.
pub const DEFAULT_TICKER_INTERVAL: Duration = Duration::from_secs(30);

/// `prefix + name`; an empty prefix publishes the name verbatim.
pub fn prefixed_name(prefix: &str, name: &str) -> String {
    format!("{prefix}{name}")
}

/// Splits `new` against `old` by bare tool name: `added = new \ old` as
/// fully-formed tools, `removed = old \ new` as bare names.
pub fn diff_tools(old: &[Tool], new: &[Tool]) -> (Vec<Tool>, Vec<String>) {
    let old_names: HashSet<&str> = old.iter().map(|tool| tool.name.as_str()).collect();
    let new_names: HashSet<&str> = new.iter().map(|tool| tool.name.as_str()).collect();
    let added = new
        .iter()
        .filter(|tool| !old_names.contains(tool.name.as_str()))
        .cloned()
        .collect();
    let removed = old
        .iter()
        .filter(|tool| !new_names.contains(tool.name.as_str()))
        .map(|tool| tool.name.clone())
        .collect();
    (added, removed)
}

/// Health of one backend as observed by its manager, the sole writer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerValidationStatus {
    pub id: UpstreamId,
    pub name: String,
    pub last_validated: DateTime<Utc>,
    pub message: String,
    pub ready: bool,
    pub total_tools: usize,
}

struct Shared {
    status: Mutex<ServerValidationStatus>,
    /// Last known raw (unprefixed) catalog.
    server_tools: Mutex<Vec<Tool>>,
    /// Prefixed name -> raw tool, for reverse lookups by the serving layer.
    served_tools: Mutex<HashMap<String, Tool>>,
    refresh: Notify,
    connection_lost: AtomicBool,
    cancel: CancellationToken,
}

impl Shared {
    fn lock_status(&self) -> std::sync::MutexGuard<'_, ServerValidationStatus> {
        match self.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Safety net behind every published tool: the serving path routes at the
/// proxy layer, so a direct invocation means something is miswired.
struct RoutedToolHandler {
    name: String,
}

impl ToolCallHandler for RoutedToolHandler {
    fn call(&self, _arguments: Option<JsonValue>) -> CallToolResult {
        CallToolResult::error(format!(
            "tool `{}` is served by its upstream backend",
            self.name
        ))
    }
}

pub struct UpstreamManager {
    client: Arc<dyn UpstreamClient>,
    broker: Arc<dyn ToolBroker>,
    interval: Duration,
    shared: Arc<Shared>,
}

impl UpstreamManager {
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        broker: Arc<dyn ToolBroker>,
        ticker_interval: Option<Duration>,
    ) -> Self {
        let interval = match ticker_interval {
            Some(interval) if !interval.is_zero() => interval,
            _ => DEFAULT_TICKER_INTERVAL,
        };
        let shared = Arc::new(Shared {
            status: Mutex::new(ServerValidationStatus {
                id: client.id(),
                name: client.name(),
                last_validated: Utc::now(),
                message: "not yet validated".to_string(),
                ready: false,
                total_tools: 0,
            }),
            server_tools: Mutex::new(Vec::new()),
            served_tools: Mutex::new(HashMap::new()),
            refresh: Notify::new(),
            connection_lost: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });
        Self {
            client,
            broker,
            interval,
            shared,
        }
    }

    /// Launches the supervisory loop. The loop exits when `shutdown` or
    /// [`UpstreamManager::stop`] fires, disconnecting exactly once on the
    /// way out.
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut task = self.supervisor_task();
        let interval = self.interval;
        let cancel = self.shared.cancel.clone();
        tokio::spawn(async move {
            loop {
                task.cycle().await;
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = task.shared.refresh.notified() => {}
                    _ = cancel.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                }
            }
            if let Err(err) = task.client.disconnect().await {
                debug!(backend = %task.client.name(), "disconnect on shutdown failed: {err}");
            }
        })
    }

    /// Signals the loop to terminate. Safe to call any number of times.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
    }

    pub fn status(&self) -> ServerValidationStatus {
        self.shared.lock_status().clone()
    }

    /// The last known raw tool list; callers get their own copy.
    pub fn managed_tools(&self) -> Vec<Tool> {
        match self.shared.server_tools.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The raw tool behind a served (prefixed) name, if this manager serves
    /// it.
    pub fn served_managed_tool(&self, prefixed: &str) -> Option<Tool> {
        match self.shared.served_tools.lock() {
            Ok(guard) => guard.get(prefixed).cloned(),
            Err(poisoned) => poisoned.into_inner().get(prefixed).cloned(),
        }
    }

    pub fn mcp_name(&self) -> String {
        self.client.name()
    }

    fn supervisor_task(&self) -> SupervisorTask {
        SupervisorTask {
            client: Arc::clone(&self.client),
            broker: Arc::clone(&self.broker),
            shared: Arc::clone(&self.shared),
            prefix: self.client.prefix(),
            connected: false,
            degraded: false,
        }
    }
}

struct SupervisorTask {
    client: Arc<dyn UpstreamClient>,
    broker: Arc<dyn ToolBroker>,
    shared: Arc<Shared>,
    prefix: String,
    connected: bool,
    degraded: bool,
}

impl SupervisorTask {
    /// One manage pass: establish the connection if needed, probe it, and
    /// reconcile the catalog. Failures are recorded, never propagated; the
    /// broker keeps the previous catalog whenever any step fails.
    async fn cycle(&mut self) {
        if self.shared.connection_lost.swap(false, Ordering::SeqCst) {
            self.connected = false;
            self.degraded = false;
        }

        if !self.connected {
            if let Err(err) = self.client.connect().await {
                self.record_failure(format!("connect failed: {err}"));
                return;
            }
            self.connected = true;
            self.degraded = false;
            self.install_handlers().await;
            info!(backend = %self.client.name(), "connected to upstream");
        }

        if let Err(err) = self.client.ping().await {
            if self.degraded {
                // Second consecutive failure: tear down and reconnect on the
                // next pass.
                let _ = self.client.disconnect().await;
                self.connected = false;
                self.degraded = false;
                self.record_failure(format!("ping failed again, reconnecting: {err}"));
            } else {
                // Grace tick: the previous catalog stays published.
                self.degraded = true;
                self.record_failure(format!("ping failed: {err}"));
            }
            return;
        }
        self.degraded = false;

        match self.client.list_tools().await {
            Ok(tools) => self.apply_catalog(tools),
            Err(err) => self.record_failure(format!("tools/list failed: {err}")),
        }
    }

    async fn install_handlers(&self) {
        if self.client.supports_tools_list_changed().await {
            let shared = Arc::clone(&self.shared);
            self.client.on_notification(Arc::new(move |method| {
                if method == NOTIFICATION_TOOLS_LIST_CHANGED {
                    shared.refresh.notify_one();
                }
            }));
        }
        let shared = Arc::clone(&self.shared);
        self.client.on_connection_lost(Arc::new(move || {
            shared.connection_lost.store(true, Ordering::SeqCst);
            shared.refresh.notify_one();
        }));
    }

    fn apply_catalog(&self, new_tools: Vec<Tool>) {
        let old_tools = match self.shared.server_tools.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let (added, removed_bare) = diff_tools(&old_tools, &new_tools);
        let upstream_id = self.client.id();

        let added_count = added.len();
        let removed_count = removed_bare.len();
        let server_tools: Vec<ServerTool> = added
            .into_iter()
            .map(|raw| {
                let name = prefixed_name(&self.prefix, &raw.name);
                let mut tool = raw;
                tool.name = name.clone();
                ServerTool {
                    tool: tool.with_meta_id(upstream_id.as_str()),
                    upstream_id: upstream_id.clone(),
                    handler: Arc::new(RoutedToolHandler { name }),
                }
            })
            .collect();
        let removed: Vec<String> = removed_bare
            .iter()
            .map(|name| prefixed_name(&self.prefix, name))
            .collect();

        // Add before delete: a rename pass that reuses a live name must not
        // end with the name absent.
        if !server_tools.is_empty() {
            self.broker.add_tools(server_tools);
        }
        if !removed.is_empty() {
            self.broker.delete_tools(&removed);
        }
        if added_count > 0 || removed_count > 0 {
            info!(
                backend = %self.client.name(),
                added = added_count,
                removed = removed_count,
                "tool catalog reconciled"
            );
        }

        let served: HashMap<String, Tool> = new_tools
            .iter()
            .map(|tool| (prefixed_name(&self.prefix, &tool.name), tool.clone()))
            .collect();
        match self.shared.served_tools.lock() {
            Ok(mut guard) => *guard = served,
            Err(poisoned) => *poisoned.into_inner() = served,
        }
        let total = new_tools.len();
        match self.shared.server_tools.lock() {
            Ok(mut guard) => *guard = new_tools,
            Err(poisoned) => *poisoned.into_inner() = new_tools,
        }

        let mut status = self.shared.lock_status();
        status.last_validated = Utc::now();
        status.message = "ok".to_string();
        status.ready = true;
        status.total_tools = total;
    }

    fn record_failure(&self, message: String) {
        warn!(backend = %self.client.name(), "{message}");
        let mut status = self.shared.lock_status();
        status.last_validated = Utc::now();
        status.message = message;
        status.ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::config::McpServer;
    use crate::upstream::client::ConnectionLostHandler;
    use crate::upstream::client::NotificationHandler;
    use crate::upstream::client::UpstreamError;
    use async_trait::async_trait;
    use gateway_protocol::InitializeResult;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    fn tool(name: &str) -> Tool {
        serde_json::from_value(json!({
            "name": name,
            "inputSchema": {"type": "object"}
        }))
        .expect("build tool")
    }

    fn test_config() -> McpServer {
        McpServer {
            name: "test-server".to_string(),
            url: "https://test.example.com/mcp".to_string(),
            hostname: String::new(),
            tool_prefix: "test_".to_string(),
            credential_env_var: String::new(),
            enabled: true,
            auth: None,
        }
    }

    #[derive(Default)]
    struct FakeClient {
        config: McpServer,
        connect_errors: Mutex<VecDeque<UpstreamError>>,
        ping_errors: Mutex<VecDeque<UpstreamError>>,
        list_results: Mutex<VecDeque<Result<Vec<Tool>, UpstreamError>>>,
        last_list: Mutex<Vec<Tool>>,
        supports_list_changed: bool,
        notification_handler: Mutex<Option<NotificationHandler>>,
        disconnects: AtomicUsize,
    }

    impl FakeClient {
        fn new(config: McpServer) -> Self {
            Self {
                config,
                ..Default::default()
            }
        }

        fn queue_lists(&self, lists: Vec<Vec<Tool>>) {
            self.list_results
                .lock()
                .expect("lock")
                .extend(lists.into_iter().map(Ok));
        }

        fn queue_list_error(&self, err: UpstreamError) {
            self.list_results.lock().expect("lock").push_back(Err(err));
        }

        fn fire_list_changed(&self) {
            let handler = self.notification_handler.lock().expect("lock").clone();
            if let Some(handler) = handler {
                handler(NOTIFICATION_TOOLS_LIST_CHANGED);
            }
        }
    }

    #[async_trait]
    impl UpstreamClient for FakeClient {
        async fn connect(&self) -> Result<(), UpstreamError> {
            match self.connect_errors.lock().expect("lock").pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn disconnect(&self) -> Result<(), UpstreamError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn ping(&self) -> Result<(), UpstreamError> {
            match self.ping_errors.lock().expect("lock").pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn list_tools(&self) -> Result<Vec<Tool>, UpstreamError> {
            let mut queue = self.list_results.lock().expect("lock");
            let mut last = self.last_list.lock().expect("lock");
            match queue.pop_front() {
                Some(Ok(next)) => *last = next,
                Some(Err(err)) => return Err(err),
                None => {}
            }
            Ok(last.clone())
        }

        async fn protocol_info(&self) -> Option<InitializeResult> {
            None
        }

        async fn supports_tools_list_changed(&self) -> bool {
            self.supports_list_changed
        }

        fn on_notification(&self, handler: NotificationHandler) {
            *self.notification_handler.lock().expect("lock") = Some(handler);
        }

        fn on_connection_lost(&self, _handler: ConnectionLostHandler) {}

        fn id(&self) -> UpstreamId {
            self.config.upstream_id()
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

    fn rpc_error(message: &str) -> UpstreamError {
        UpstreamError::Rpc {
            code: -32000,
            message: message.to_string(),
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition within deadline");
    }

    #[tokio::test]
    async fn first_cycle_publishes_prefixed_catalog() {
        let client = Arc::new(FakeClient::new(test_config()));
        client.queue_lists(vec![vec![tool("tool1"), tool("tool2")]]);
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client.clone(), broker.clone(), None);

        manager.supervisor_task().cycle().await;

        let tools = broker.list_tools();
        assert_eq!(tools.len(), 2);
        assert!(tools.contains_key("test_tool1"));
        assert!(tools.contains_key("test_tool2"));
        let expected_id = client.id();
        assert_eq!(
            tools["test_tool1"].tool.meta_id(),
            Some(expected_id.as_str())
        );

        let status = manager.status();
        assert!(status.ready);
        assert_eq!(status.total_tools, 2);
    }

    #[tokio::test]
    async fn rename_is_added_then_removed() {
        let client = Arc::new(FakeClient::new(test_config()));
        client.queue_lists(vec![
            vec![tool("tool1"), tool("tool2")],
            vec![tool("tool1"), tool("tool3")],
        ]);
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client, broker.clone(), None);
        let mut task = manager.supervisor_task();

        task.cycle().await;
        task.cycle().await;

        let mut names: Vec<String> = broker.list_tools().into_keys().collect();
        names.sort();
        assert_eq!(names, vec!["test_tool1", "test_tool3"]);
    }

    #[tokio::test]
    async fn connect_failure_records_status_and_leaves_broker_alone() {
        let client = Arc::new(FakeClient::new(test_config()));
        client
            .connect_errors
            .lock()
            .expect("lock")
            .push_back(rpc_error("connection refused"));
        client.queue_lists(vec![vec![tool("tool1")]]);
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client, broker.clone(), None);
        let mut task = manager.supervisor_task();

        task.cycle().await;
        let status = manager.status();
        assert!(!status.ready);
        assert!(status.message.contains("connection refused"));
        assert_eq!(broker.list_tools().len(), 0);

        // Next tick recovers.
        task.cycle().await;
        assert!(manager.status().ready);
        assert_eq!(broker.list_tools().len(), 1);
    }

    #[tokio::test]
    async fn ping_failure_gets_one_grace_tick_then_reconnects() {
        let client = Arc::new(FakeClient::new(test_config()));
        client.queue_lists(vec![vec![tool("tool1")]]);
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client.clone(), broker.clone(), None);
        let mut task = manager.supervisor_task();

        task.cycle().await;
        assert!(manager.status().ready);

        {
            let mut pings = client.ping_errors.lock().expect("lock");
            pings.push_back(rpc_error("timeout"));
            pings.push_back(rpc_error("timeout"));
        }

        // Grace tick: catalog retained, status degraded.
        task.cycle().await;
        assert!(!manager.status().ready);
        assert_eq!(broker.list_tools().len(), 1);
        assert_eq!(client.disconnects.load(Ordering::SeqCst), 0);

        // Second failure tears the connection down.
        task.cycle().await;
        assert_eq!(client.disconnects.load(Ordering::SeqCst), 1);

        // And the pass after that reconnects and recovers.
        task.cycle().await;
        assert!(manager.status().ready);
    }

    #[tokio::test]
    async fn list_failure_keeps_previous_catalog() {
        let client = Arc::new(FakeClient::new(test_config()));
        client.queue_lists(vec![vec![tool("tool1"), tool("tool2")]]);
        client.queue_list_error(rpc_error("listing exploded"));
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client, broker.clone(), None);
        let mut task = manager.supervisor_task();

        task.cycle().await;
        assert_eq!(broker.list_tools().len(), 2);

        task.cycle().await;
        let status = manager.status();
        assert!(!status.ready);
        assert!(status.message.contains("listing exploded"));
        // The broker still serves the previous catalog.
        assert_eq!(broker.list_tools().len(), 2);
        assert_eq!(status.total_tools, 2);
    }

    #[tokio::test]
    async fn transient_empty_listing_purges_published_tools() {
        let client = Arc::new(FakeClient::new(test_config()));
        client.queue_lists(vec![vec![tool("tool1"), tool("tool2")], Vec::new()]);
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client, broker.clone(), None);
        let mut task = manager.supervisor_task();

        task.cycle().await;
        assert_eq!(broker.list_tools().len(), 2);

        task.cycle().await;
        assert_eq!(broker.list_tools().len(), 0);
        assert_eq!(manager.status().total_tools, 0);
        assert!(manager.status().ready);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_disconnects_once() {
        let client = Arc::new(FakeClient::new(test_config()));
        client.queue_lists(vec![vec![tool("tool1")]]);
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client.clone(), broker, None);

        let handle = manager.start(CancellationToken::new());
        wait_until(|| manager.status().ready).await;

        manager.stop();
        manager.stop();
        handle.await.expect("loop exits");
        manager.stop();

        assert_eq!(client.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn list_changed_notification_triggers_a_refresh() {
        let config = test_config();
        let client = Arc::new(FakeClient {
            config: config.clone(),
            supports_list_changed: true,
            ..Default::default()
        });
        client.queue_lists(vec![vec![tool("tool1")], vec![tool("tool1"), tool("tool2")]]);
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client.clone(), broker.clone(), None);

        let handle = manager.start(CancellationToken::new());
        wait_until(|| broker.list_tools().contains_key("test_tool1")).await;
        assert!(!broker.list_tools().contains_key("test_tool2"));

        client.fire_list_changed();
        wait_until(|| broker.list_tools().contains_key("test_tool2")).await;

        manager.stop();
        handle.await.expect("loop exits");
    }

    #[tokio::test]
    async fn external_shutdown_token_also_stops_the_loop() {
        let client = Arc::new(FakeClient::new(test_config()));
        client.queue_lists(vec![vec![tool("tool1")]]);
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client.clone(), broker, None);

        let shutdown = CancellationToken::new();
        let handle = manager.start(shutdown.clone());
        wait_until(|| manager.status().ready).await;

        shutdown.cancel();
        handle.await.expect("loop exits");
        assert_eq!(client.disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn managed_tools_returns_a_defensive_copy() {
        let client = Arc::new(FakeClient::new(test_config()));
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client, broker, None);
        {
            let mut guard = manager.shared.server_tools.lock().expect("lock");
            *guard = vec![tool("tool1")];
        }

        let mut copy = manager.managed_tools();
        copy.push(tool("injected"));
        assert_eq!(manager.managed_tools().len(), 1);
    }

    #[test]
    fn served_managed_tool_looks_up_by_prefixed_name() {
        let client = Arc::new(FakeClient::new(test_config()));
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client, broker, None);
        {
            let mut guard = manager.shared.served_tools.lock().expect("lock");
            guard.insert("test_tool1".to_string(), tool("tool1"));
        }

        assert_eq!(
            manager.served_managed_tool("test_tool1").map(|t| t.name),
            Some("tool1".to_string())
        );
        assert_eq!(manager.served_managed_tool("tool1"), None);
    }

    #[test]
    fn diff_partitions_by_bare_name() {
        let old = vec![tool("a"), tool("b"), tool("c")];
        let new = vec![tool("b"), tool("c"), tool("d"), tool("e")];
        let (added, removed) = diff_tools(&old, &new);

        let added_names: Vec<&str> = added.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(added_names, vec!["d", "e"]);
        assert_eq!(removed, vec!["a".to_string()]);

        let kept = new.len() - added.len();
        assert_eq!(added.len() + kept, new.len());
        assert_eq!(removed.len() + kept, old.len());
    }

    #[test]
    fn diff_handles_empty_old_and_empty_new() {
        let tools = vec![tool("a"), tool("b")];

        let (added, removed) = diff_tools(&[], &tools);
        assert_eq!(added.len(), 2);
        assert!(removed.is_empty());

        let (added, removed) = diff_tools(&tools, &[]);
        assert!(added.is_empty());
        assert_eq!(removed.len(), 2);
    }

    #[test]
    fn prefix_identities() {
        assert_eq!(prefixed_name("", "tool"), "tool");
        assert_eq!(prefixed_name("test_", "tool"), "test_tool");
    }

    #[test]
    fn zero_interval_falls_back_to_default() {
        let client = Arc::new(FakeClient::new(test_config()));
        let broker = Arc::new(InMemoryBroker::new());
        let manager = UpstreamManager::new(client, broker, Some(Duration::ZERO));
        assert_eq!(manager.interval, DEFAULT_TICKER_INTERVAL);
    }
}
