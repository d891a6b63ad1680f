//! Fan-out over a dynamic set of named [`McpClient`]s.
//!
//! Connects and deliveries run on a [`JoinSet`], bounded by a semaphore sized
//! `min(targets, max_workers)`. Results are gathered in completion order and folded
//! into maps keyed by server name.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    future::Future,
    sync::Arc,
    time::Duration
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinSet
};
use crate::{
    api::Server,
    client::{
        hooks::{self, Event, EventSink, Payload},
        network::{ConnectionInfo, Delivery, ServerStatus},
        progress::ConnectProgress,
        McpClient
    },
    config::ClientOptions,
    error::{Error, Result}
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ConnectOutcome {
    Connected(ConnectionInfo),
    Failed { error: String },
}

impl ConnectOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ConnectOutcome::Connected(_))
    }
}

pub struct ConnectionManager {
    clients: HashMap<String, McpClient>,
    statuses: BTreeMap<String, ServerStatus>,
    default_servers: Vec<String>,
    options: ClientOptions,
    events: Option<EventSink>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ClientOptions::default(), vec!["glama".to_owned(), "smithery".to_owned()])
    }
}

impl ConnectionManager {
    pub fn new(options: ClientOptions, default_servers: Vec<String>) -> Self {
        Self {
            clients: HashMap::new(),
            statuses: BTreeMap::new(),
            default_servers,
            options,
            events: None,
        }
    }

    /// Starts emitting [`Event`]s into a fresh channel. A previous subscription is replaced.
    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<Event> {
        let (sink, rx) = hooks::channel(capacity);
        self.events = Some(sink);
        rx
    }

    fn emit(&self, server: &str, payload: Payload) {
        if let Some(events) = &self.events {
            events.send(server, payload);
        }
    }

    pub fn default_servers(&self) -> &[String] {
        &self.default_servers
    }

    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn add_server(&mut self, server: Server) -> Result<()> {
        if self.clients.contains_key(&server.name) {
            warn!("Server {} already exists", server.name);
            return Err(Error::ServerExists(server.name));
        }
        info!("Adding server: {server}");
        let client = McpClient::new(server, &self.options)?;
        self.clients.insert(client.server_name().to_owned(), client);
        Ok(())
    }

    pub fn remove_server(&mut self, name: &str) -> Result<()> {
        let Some(client) = self.clients.remove(name) else {
            warn!("Server {name} not found");
            return Err(Error::UnknownServer(name.to_owned()));
        };
        if client.is_connected() {
            client.disconnect();
            self.emit(name, Payload::Disconnect { reason: Some("Server removed".to_owned()) });
        }
        info!("Removing server: {name}");
        self.statuses.remove(name);
        Ok(())
    }

    pub fn get_client(&self, name: &str) -> Option<&McpClient> {
        self.clients.get(name)
    }

    /// Resolves the connect target list: explicit names, else every registered server,
    /// else the defaults. Unregistered names are added as loopback servers.
    fn resolve_targets(&mut self, names: &[String]) -> Vec<String> {
        let mut targets: Vec<String> = if !names.is_empty() {
            names.to_vec()
        } else if !self.clients.is_empty() {
            self.server_names()
        } else {
            self.default_servers.clone()
        };
        let mut seen = BTreeSet::new();
        targets.retain(|name| seen.insert(name.clone()));

        for name in &targets {
            if !self.clients.contains_key(name) {
                if let Err(e) = self.add_server(Server::named(name.as_str())) {
                    error!("Failed to add server {name}: {e}");
                }
            }
        }
        targets
    }

    pub async fn connect_to_servers(
        &mut self,
        names: &[String],
        show_progress: bool
    ) -> BTreeMap<String, ConnectOutcome> {
        let targets = self.resolve_targets(names);
        let total = targets.len();
        info!("Connecting to {total} MCP servers: {}", targets.join(", "));

        let progress = ConnectProgress::new(total as u64, "Connecting to MCP servers", show_progress);
        let clients: Vec<McpClient> = targets.iter()
            .filter_map(|name| self.clients.get(name).cloned())
            .collect();

        let mut completed = 0u64;
        let outcomes = fan_out(
            clients,
            self.options.max_workers,
            |client| async move { client.connect().await },
            |name, result| {
                completed += 1;
                match result {
                    Ok(info) => {
                        progress.update(completed, format!("Connected to {name}"));
                        self.emit(name, Payload::Connect { latency: info.connection_latency_ms });
                    }
                    Err(e) => {
                        error!("Error connecting to {name}: {e}");
                        progress.update(completed, format!("Failed to connect to {name}"));
                        self.emit(name, Payload::Failed { error: e.to_string() });
                    }
                }
            }
        ).await;
        let results = outcomes.into_iter()
            .map(|(name, result)| {
                let outcome = match result {
                    Ok(info) => ConnectOutcome::Connected(info),
                    Err(e) => ConnectOutcome::Failed { error: e.to_string() },
                };
                (name, outcome)
            })
            .collect();
        progress.finish();

        self.update_all_statuses();
        results
    }

    pub fn disconnect_from_all(&mut self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for (name, client) in self.clients.iter() {
            let disconnected = client.disconnect();
            if disconnected {
                self.emit(name, Payload::Disconnect { reason: None });
            }
            results.insert(name.clone(), disconnected);
        }
        self.update_all_statuses();
        results
    }

    pub fn update_all_statuses(&mut self) -> &BTreeMap<String, ServerStatus> {
        for (name, client) in self.clients.iter() {
            self.statuses.insert(name.clone(), client.status());
        }
        &self.statuses
    }

    /// Cached statuses as of the last refresh.
    pub fn statuses(&self) -> &BTreeMap<String, ServerStatus> {
        &self.statuses
    }

    pub fn get_connected_servers(&self) -> Vec<String> {
        let mut names: Vec<_> = self.clients.iter()
            .filter(|(_, client)| client.is_connected())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn connected_clients(&self) -> Vec<McpClient> {
        self.clients.values()
            .filter(|client| client.is_connected())
            .cloned()
            .collect()
    }

    pub async fn broadcast_message(&self, message: &Value) -> BTreeMap<String, Result<Delivery>> {
        let clients = self.connected_clients();
        if clients.is_empty() {
            warn!("Broadcast skipped: no connected servers");
            return BTreeMap::new();
        }

        let message = Arc::new(message.clone());
        fan_out(
            clients,
            self.options.max_workers,
            move |client| {
                let message = message.clone();
                async move { client.send_message(&message).await }
            },
            |name, result| match result {
                Ok(delivery) => self.emit(name, Payload::Delivered { timestamp: delivery.timestamp_ms }),
                Err(e) => {
                    warn!("Delivery to {name} failed: {e}");
                    self.emit(name, Payload::Failed { error: e.to_string() });
                }
            }
        ).await
    }

    pub async fn ping_all(&self) -> BTreeMap<String, Result<Duration>> {
        fan_out(
            self.connected_clients(),
            self.options.max_workers,
            |client| async move { client.ping().await },
            |_, _| {}
        ).await
    }
}

/// Runs `work` for every client with at most `max_workers` in flight and collects
/// the results by server name. `on_complete` sees each result as soon as its worker
/// finishes. A worker that panics yields [`Error::TaskAborted`].
async fn fan_out<T, F, Fut, C>(
    clients: Vec<McpClient>,
    max_workers: usize,
    work: F,
    mut on_complete: C
) -> BTreeMap<String, Result<T>>
where
    T: Send + 'static,
    F: Fn(McpClient) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    C: FnMut(&str, &Result<T>),
{
    let mut results = BTreeMap::new();
    if clients.is_empty() {
        return results;
    }

    let semaphore = Arc::new(Semaphore::new(clients.len().min(max_workers).max(1)));
    let mut pending = BTreeSet::new();
    let mut tasks = JoinSet::new();
    for client in clients {
        let name = client.server_name().to_owned();
        pending.insert(name.clone());
        let semaphore = semaphore.clone();
        let job = work(client);
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (name.clone(), Err(Error::TaskAborted(name)));
            };
            (name, job.await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, result)) => {
                pending.remove(&name);
                on_complete(&name, &result);
                results.insert(name, result);
            }
            Err(e) => error!("Worker task failed: {e}"),
        }
    }
    for name in pending {
        let result = Err(Error::TaskAborted(name.clone()));
        on_complete(&name, &result);
        results.insert(name, result);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::client::testing::{AgentReply, RpcServer};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn starts_empty() {
        let manager = ConnectionManager::default();
        assert!(manager.server_names().is_empty());
        assert!(manager.statuses().is_empty());
        assert_eq!(manager.default_servers(), ["glama", "smithery"]);
    }

    #[test]
    fn add_server_rejects_duplicates() {
        let mut manager = ConnectionManager::default();
        manager.add_server(Server::named("test-server")).unwrap();
        manager.add_server(Server {
            name: "test-server-2".into(),
            endpoint: None,
            api_key: Some("test-key".into()),
        }).unwrap();
        assert_eq!(manager.get_client("test-server-2").unwrap().api_key(), Some("test-key"));
        assert!(matches!(
            manager.add_server(Server::named("test-server")),
            Err(Error::ServerExists(_))
        ));
    }

    #[test]
    fn add_server_rejects_bad_endpoint() {
        let mut manager = ConnectionManager::default();
        let result = manager.add_server(Server::with_endpoint("bad", "gopher://x"));
        assert!(matches!(result, Err(Error::InvalidEndpoint { .. })));
        assert!(manager.get_client("bad").is_none());
    }

    #[tokio::test]
    async fn remove_server_disconnects() {
        let mut manager = ConnectionManager::default();
        assert!(matches!(manager.remove_server("nonexistent"), Err(Error::UnknownServer(_))));

        manager.connect_to_servers(&names(&["test-server"]), false).await;
        let client = manager.get_client("test-server").unwrap().clone();
        manager.remove_server("test-server").unwrap();
        assert!(!client.is_connected());
        assert!(manager.get_client("test-server").is_none());
        assert!(!manager.statuses().contains_key("test-server"));
    }

    #[tokio::test]
    async fn connect_adds_unknown_servers() {
        let mut manager = ConnectionManager::default();
        let results = manager.connect_to_servers(&names(&["test-server", "test-server-2"]), false).await;
        assert_eq!(results.len(), 2);
        assert!(results.values().all(ConnectOutcome::success));
        assert_eq!(manager.get_connected_servers(), vec!["test-server", "test-server-2"]);
    }

    #[tokio::test]
    async fn connect_without_names_uses_registered_then_defaults() {
        let mut manager = ConnectionManager::default();
        let results = manager.connect_to_servers(&[], false).await;
        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["glama", "smithery"]);

        let mut manager = ConnectionManager::default();
        manager.add_server(Server::named("only")).unwrap();
        let results = manager.connect_to_servers(&[], false).await;
        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["only"]);
    }

    #[tokio::test]
    async fn duplicate_names_connect_once() {
        let mut manager = ConnectionManager::default();
        let results = manager.connect_to_servers(&names(&["a", "a", "b"]), false).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn partial_failure_is_reported_per_server() {
        let mut manager = ConnectionManager::default();
        manager.add_server(Server::with_endpoint("dead", "http://127.0.0.1:1/mcp")).unwrap();
        manager.add_server(Server::named("alive")).unwrap();

        let results = manager.connect_to_servers(&[], false).await;
        assert!(results["alive"].success());
        assert!(matches!(results["dead"], ConnectOutcome::Failed { .. }));
        assert_eq!(manager.get_connected_servers(), vec!["alive"]);
        assert!(!manager.statuses()["dead"].is_connected());
    }

    #[tokio::test]
    async fn single_worker_still_connects_everything() {
        let options = ClientOptions { max_workers: 1, ..Default::default() };
        let mut manager = ConnectionManager::new(options, vec![]);
        let targets: Vec<String> = (0..8).map(|i| format!("server-{i}")).collect();
        let results = manager.connect_to_servers(&targets, false).await;
        assert_eq!(results.len(), 8);
        assert!(results.values().all(ConnectOutcome::success));
    }

    #[tokio::test]
    async fn disconnect_from_all_reports_each() {
        let mut manager = ConnectionManager::default();
        manager.add_server(Server::named("test-server")).unwrap();
        manager.add_server(Server::named("test-server-2")).unwrap();
        manager.connect_to_servers(&[], false).await;

        let results = manager.disconnect_from_all();
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|ok| *ok));
        assert!(manager.get_connected_servers().is_empty());

        let again = manager.disconnect_from_all();
        assert!(again.values().all(|ok| !*ok));
    }

    #[tokio::test]
    async fn statuses_track_connection() {
        let mut manager = ConnectionManager::default();
        manager.add_server(Server::named("test-server")).unwrap();
        manager.add_server(Server::named("test-server-2")).unwrap();

        let statuses = manager.update_all_statuses();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.values().all(|s| !s.is_connected()));

        manager.connect_to_servers(&[], false).await;
        assert!(manager.update_all_statuses().values().all(ServerStatus::is_connected));
    }

    #[tokio::test]
    async fn broadcast_reaches_connected_only() {
        let mut manager = ConnectionManager::default();
        assert!(manager.broadcast_message(&json!({"x": 1})).await.is_empty());

        manager.connect_to_servers(&names(&["test-server", "test-server-2"]), false).await;
        manager.add_server(Server::named("idle")).unwrap();

        let responses = manager.broadcast_message(&json!({"test": "message"})).await;
        assert_eq!(responses.len(), 2);
        assert!(responses.values().all(|r| r.is_ok()));
        assert!(!responses.contains_key("idle"));
    }

    #[tokio::test]
    async fn broadcast_mixes_transports() {
        let rpc = RpcServer::start(AgentReply::Echo).await;
        let mut manager = ConnectionManager::default();
        manager.add_server(Server::with_endpoint("remote", rpc.url())).unwrap();
        manager.add_server(Server::named("local")).unwrap();
        manager.connect_to_servers(&[], false).await;

        let responses = manager.broadcast_message(&json!({"n": 7})).await;
        let remote = responses["remote"].as_ref().unwrap();
        assert_eq!(remote.reply, Some(json!({"echo": {"n": 7}})));
        assert!(responses["local"].as_ref().unwrap().reply.is_none());
    }

    #[tokio::test]
    async fn events_follow_lifecycle() {
        let mut manager = ConnectionManager::default();
        let mut rx = manager.subscribe(16);
        manager.connect_to_servers(&names(&["glama"]), false).await;
        manager.broadcast_message(&json!({})).await;
        manager.disconnect_from_all();

        let connect = rx.recv().await.unwrap();
        assert_eq!(connect.server, "glama");
        assert!(matches!(connect.payload, Payload::Connect { .. }));
        assert!(matches!(rx.recv().await.unwrap().payload, Payload::Delivered { .. }));
        assert_eq!(rx.recv().await.unwrap().payload, Payload::Disconnect { reason: None });
    }

    #[tokio::test]
    async fn ping_all_covers_connected() {
        let mut manager = ConnectionManager::default();
        manager.add_server(Server::named("idle")).unwrap();
        manager.connect_to_servers(&names(&["glama"]), false).await;
        let pings = manager.ping_all().await;
        assert_eq!(pings.keys().collect::<Vec<_>>(), vec!["glama"]);
        assert!(pings["glama"].is_ok());
    }

    #[tokio::test]
    async fn panicking_worker_is_reported() {
        let client = McpClient::new(Server::named("boom"), &ClientOptions::default()).unwrap();
        let results = fan_out(vec![client], 2, |_| async move {
            if true {
                panic!("worker exploded");
            }
            Ok(())
        }, |_, _| {}).await;
        assert!(matches!(results["boom"], Err(Error::TaskAborted(_))));
    }
}
