use std::{
    fmt,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH}
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a server told us about itself when the handshake completed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub server_name: String,
    pub connection_latency_ms: u64,
    pub protocol_version: String,
    pub features: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub info: ConnectionInfo,
    pub latency: Duration,
    pub last_ping: Instant,
}

/// A client either has a live session or nothing; the session owns the connection info.
#[derive(Debug, Clone, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connected(Session),
}

impl LinkState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            LinkState::Connected(session) => Some(session),
            LinkState::Disconnected => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ServerStatus {
    Disconnected {
        server_name: String,
    },
    Connected {
        server_name: String,
        connection_latency_ms: u64,
        since_ping_secs: u64,
        protocol_version: String,
        features: Vec<String>,
    },
}

impl ServerStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ServerStatus::Connected { .. })
    }

    pub fn server_name(&self) -> &str {
        match self {
            ServerStatus::Disconnected { server_name } => server_name,
            ServerStatus::Connected { server_name, .. } => server_name,
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Disconnected { server_name } => write!(f, "{server_name}: disconnected"),
            ServerStatus::Connected {
                server_name, connection_latency_ms, since_ping_secs,
                protocol_version, features
            } => write!(
                f,
                "{server_name}: connected (latency: {connection_latency_ms}ms, last ping {since_ping_secs}s ago)\n    - Protocol: {protocol_version}\n    - Features: {}",
                features.join(", ")
            ),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Delivery {
    pub server: String,
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<Value>,
}

pub(crate) fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_with_tag() {
        let status = ServerStatus::Disconnected { server_name: "glama".into() };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "disconnected");
        assert_eq!(json["server_name"], "glama");
    }

    #[test]
    fn connected_display_lists_features() {
        let status = ServerStatus::Connected {
            server_name: "smithery".into(),
            connection_latency_ms: 4,
            since_ping_secs: 0,
            protocol_version: "MCP/1.0".into(),
            features: vec!["a".into(), "b".into()],
        };
        let text = status.to_string();
        assert!(text.starts_with("smithery: connected (latency: 4ms"));
        assert!(text.ends_with("Features: a, b"));
    }
}
