use std::{
    fmt::{self, Formatter},
    sync::Arc,
    time::{Duration, Instant}
};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use crate::{
    api::Server,
    client::{
        network::{timestamp_ms, ConnectionInfo, Delivery, LinkState, ServerStatus, Session},
        transport::Transport
    },
    config::ClientOptions,
    error::{Error, Result}
};

/// Handle to one agent server.
///
/// Clones share the same transport and link state, so a clone can be moved into a
/// worker task while the manager keeps the original.
#[derive(Clone)]
pub struct McpClient {
    server: Server,
    transport: Arc<Transport>,
    state: Arc<Mutex<LinkState>>,
}

impl fmt::Debug for McpClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "McpClient {{ {}, connected: {} }}", self.server, self.is_connected())
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}

impl McpClient {
    pub fn new(server: Server, options: &ClientOptions) -> Result<Self> {
        let transport = Transport::for_server(&server, options)?;
        Ok(Self {
            server,
            transport: Arc::new(transport),
            state: Arc::new(Mutex::new(LinkState::Disconnected)),
        })
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn server_name(&self) -> &str {
        &self.server.name
    }

    pub fn api_key(&self) -> Option<&str> {
        self.server.api_key.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().session().is_some()
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.state.lock().session().map(|s| s.info.clone())
    }

    /// Performs the handshake and stores the resulting session.
    ///
    /// Calling this on a connected client replaces the session. On failure the client is
    /// left disconnected.
    pub async fn connect(&self) -> Result<ConnectionInfo> {
        info!("Connecting to MCP server: {}", self.server);
        if self.is_connected() {
            debug!("{} already connected, re-initializing", self.server.name);
        }

        let start = Instant::now();
        let handshake = match self.transport.initialize(self.api_key()).await {
            Ok(handshake) => handshake,
            Err(e) => {
                error!("Failed to connect to {}: {e}", self.server.name);
                *self.state.lock() = LinkState::Disconnected;
                return Err(e);
            }
        };
        let latency = start.elapsed();

        let info = ConnectionInfo {
            server_name: self.server.name.clone(),
            connection_latency_ms: millis(latency),
            protocol_version: handshake.protocol_version,
            features: handshake.features,
        };
        *self.state.lock() = LinkState::Connected(Session {
            info: info.clone(),
            latency,
            last_ping: Instant::now(),
        });

        info!("Connected to {} (latency: {}ms)", self.server.name, info.connection_latency_ms);
        Ok(info)
    }

    /// Drops the session. Returns `false` if there was none.
    pub fn disconnect(&self) -> bool {
        let mut state = self.state.lock();
        if state.session().is_none() {
            warn!("Not connected to {}", self.server.name);
            return false;
        }
        info!("Disconnecting from MCP server: {}", self.server.name);
        *state = LinkState::Disconnected;
        true
    }

    pub async fn ping(&self) -> Result<Duration> {
        if !self.is_connected() {
            warn!("Cannot ping {}: not connected", self.server.name);
            return Err(Error::NotConnected(self.server.name.clone()));
        }

        let start = Instant::now();
        self.transport.ping(self.api_key()).await?;
        let latency = start.elapsed();

        // The session may have been dropped while the ping was in flight.
        if let LinkState::Connected(session) = &mut *self.state.lock() {
            session.latency = latency;
            session.info.connection_latency_ms = millis(latency);
            session.last_ping = Instant::now();
        }
        debug!("Ping to {}: {}ms", self.server.name, millis(latency));
        Ok(latency)
    }

    pub fn status(&self) -> ServerStatus {
        match self.state.lock().session() {
            None => ServerStatus::Disconnected {
                server_name: self.server.name.clone(),
            },
            Some(session) => ServerStatus::Connected {
                server_name: self.server.name.clone(),
                connection_latency_ms: millis(session.latency),
                since_ping_secs: session.last_ping.elapsed().as_secs(),
                protocol_version: session.info.protocol_version.clone(),
                features: session.info.features.clone(),
            },
        }
    }

    pub async fn send_message(&self, message: &Value) -> Result<Delivery> {
        if !self.is_connected() {
            error!("Cannot send message to {}: not connected", self.server.name);
            return Err(Error::NotConnected(self.server.name.clone()));
        }

        info!("Sending message to {}", self.server.name);
        debug!("Message content: {message}");
        let reply = self.transport.send(self.api_key(), message).await?;

        Ok(Delivery {
            server: self.server.name.clone(),
            timestamp_ms: timestamp_ms(),
            reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::client::testing::RpcServer;

    fn loopback(name: &str) -> McpClient {
        McpClient::new(Server::named(name), &ClientOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn connect_and_disconnect() {
        let client = loopback("test-server");
        assert!(!client.is_connected());
        assert!(client.connection_info().is_none());
        assert!(!client.disconnect());

        let info = client.connect().await.unwrap();
        assert_eq!(info.server_name, "test-server");
        assert_eq!(info.protocol_version, "MCP/1.0");
        assert!(client.is_connected());
        assert_eq!(client.connection_info(), Some(info));

        assert!(client.disconnect());
        assert!(!client.is_connected());
        assert!(client.connection_info().is_none());
    }

    #[tokio::test]
    async fn ping_requires_connection() {
        let client = loopback("test-server");
        assert!(matches!(client.ping().await, Err(Error::NotConnected(_))));

        client.connect().await.unwrap();
        let latency = client.ping().await.unwrap();
        assert_eq!(client.connection_info().unwrap().connection_latency_ms, millis(latency));
    }

    #[tokio::test]
    async fn status_follows_state() {
        let client = loopback("test-server");
        assert_eq!(
            client.status(),
            ServerStatus::Disconnected { server_name: "test-server".into() }
        );

        client.connect().await.unwrap();
        match client.status() {
            ServerStatus::Connected { server_name, features, since_ping_secs, .. } => {
                assert_eq!(server_name, "test-server");
                assert_eq!(features.len(), 3);
                assert_eq!(since_ping_secs, 0);
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_message_requires_connection() {
        let client = loopback("test-server");
        let message = json!({"test": "message"});
        assert!(matches!(client.send_message(&message).await, Err(Error::NotConnected(_))));

        client.connect().await.unwrap();
        let delivery = client.send_message(&message).await.unwrap();
        assert_eq!(delivery.server, "test-server");
        assert!(delivery.timestamp_ms > 0);
        assert!(delivery.reply.is_none());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let client = loopback("shared");
        let clone = client.clone();
        clone.connect().await.unwrap();
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn failed_connect_leaves_client_disconnected() {
        // Nothing listens on port 1.
        let server = Server::with_endpoint("dead", "http://127.0.0.1:1/mcp");
        let client = McpClient::new(server, &ClientOptions::default()).unwrap();
        assert!(matches!(client.connect().await, Err(Error::Http(_))));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn http_round_trip_uses_api_key() {
        let rpc = RpcServer::with_key("token").await;
        let server = Server {
            name: "remote".into(),
            endpoint: Some(rpc.url()),
            api_key: Some("token".into()),
        };
        let client = McpClient::new(server, &ClientOptions::default()).unwrap();
        let info = client.connect().await.unwrap();
        assert_eq!(info.features, vec!["prompts", "tools"]);

        let delivery = client.send_message(&json!({"hello": "world"})).await.unwrap();
        assert_eq!(delivery.reply, Some(json!({"echo": {"hello": "world"}})));
    }
}
