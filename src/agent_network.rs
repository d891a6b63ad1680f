//! The front door: owns the connection manager and turns tasks and chats into broadcasts.

use std::{collections::BTreeMap, fmt};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use crate::{
    api::ServerList,
    client::{ConnectionManager, ServerStatus},
    config::NetworkConfig,
    error::{Error, Result}
};

/// Envelope broadcast to every connected server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    Task { id: Uuid, description: String },
    Chat { id: Uuid, agent_id: String, message: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Partial,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Partial => "partial",
            TaskStatus::Failed => "failed",
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub description: String,
    pub status: TaskStatus,
    pub servers_responded: Vec<String>,
    pub replies: BTreeMap<String, Value>,
    pub failures: BTreeMap<String, String>,
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Executed task: {} [{}]", self.description, self.status)?;
        if !self.servers_responded.is_empty() {
            write!(f, "\nServers that responded: {}", self.servers_responded.join(", "))?;
        }
        for (server, error) in &self.failures {
            write!(f, "\n  {server} failed: {error}")?;
        }
        Ok(())
    }
}

pub struct AgentNetwork {
    manager: ConnectionManager,
}

impl AgentNetwork {
    pub fn new(config: &NetworkConfig, registry: &ServerList) -> Self {
        let mut manager = ConnectionManager::new(
            config.client_options(), config.default_servers.clone()
        );
        for server in registry.sorted() {
            if let Err(e) = manager.add_server(server.clone()) {
                error!("Skipping server {}: {e}", server.name);
            }
        }
        Self { manager }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ConnectionManager {
        &mut self.manager
    }

    /// Connects to `server_names`. An empty list connects every registered server, or
    /// the configured defaults when nothing is registered.
    /// Returns `true` only if every connection succeeded.
    pub async fn connect_to_servers(&mut self, server_names: &[String], show_progress: bool) -> bool {
        let results = self.manager.connect_to_servers(server_names, show_progress).await;
        let failed = results.values().filter(|o| !o.success()).count();
        if failed > 0 {
            warn!("{failed} of {} connections failed", results.len());
        }
        !results.is_empty() && failed == 0
    }

    pub fn get_server_status(&mut self) -> BTreeMap<String, ServerStatus> {
        self.manager.update_all_statuses().clone()
    }

    pub fn disconnect_from_servers(&mut self) -> BTreeMap<String, bool> {
        self.manager.disconnect_from_all()
    }

    pub async fn execute_task(&self, description: &str) -> Result<TaskResult> {
        if description.trim().is_empty() {
            return Err(Error::InvalidInput("task description must not be empty".to_owned()));
        }
        if self.manager.get_connected_servers().is_empty() {
            return Err(Error::NoConnectedServers);
        }

        let id = Uuid::new_v4();
        info!("Executing task {id}: {description}");
        let message = serde_json::to_value(AgentMessage::Task {
            id,
            description: description.to_owned(),
        })?;

        let mut servers_responded = Vec::new();
        let mut replies = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for (server, result) in self.manager.broadcast_message(&message).await {
            match result {
                Ok(delivery) => {
                    if let Some(reply) = delivery.reply {
                        replies.insert(server.clone(), reply);
                    }
                    servers_responded.push(server);
                }
                Err(e) => {
                    failures.insert(server, e.to_string());
                }
            }
        }

        let status = match (servers_responded.is_empty(), failures.is_empty()) {
            (false, true) => TaskStatus::Completed,
            (false, false) => TaskStatus::Partial,
            (true, _) => TaskStatus::Failed,
        };
        Ok(TaskResult {
            task_id: id,
            description: description.to_owned(),
            status,
            servers_responded,
            replies,
            failures,
        })
    }

    /// Sends `message` for `agent_id` to every connected server and returns the first
    /// textual reply in server-name order.
    pub async fn chat_with_agent(&self, agent_id: &str, message: &str) -> Result<String> {
        if agent_id.trim().is_empty() {
            return Err(Error::InvalidInput("agent id must not be empty".to_owned()));
        }
        if self.manager.get_connected_servers().is_empty() {
            return Err(Error::NoConnectedServers);
        }

        let envelope = serde_json::to_value(AgentMessage::Chat {
            id: Uuid::new_v4(),
            agent_id: agent_id.to_owned(),
            message: message.to_owned(),
        })?;
        let responses = self.manager.broadcast_message(&envelope).await;

        let mut first_error = None;
        let mut delivered = false;
        for (_, result) in responses {
            match result {
                Ok(delivery) => {
                    delivered = true;
                    if let Some(text) = delivery.reply.as_ref().and_then(reply_text) {
                        return Ok(text);
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match (delivered, first_error) {
            (false, Some(e)) => Err(e),
            _ => Ok(format!("Agent {agent_id} response to '{message}'")),
        }
    }
}

/// Accepts a bare string or an object carrying `text` / `message`.
fn reply_text(reply: &Value) -> Option<String> {
    match reply {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map.get("text")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    }
}
