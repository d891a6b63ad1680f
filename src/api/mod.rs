use std::path::PathBuf;
use log::info;
use serde::Serialize;

pub mod controller;
mod server;

pub use server::{
    create as create_server, delete as delete_server,
    List as ServerList, Server
};

use crate::{
    agent_network::AgentNetwork,
    config::NetworkConfig
};

/// Everything loaded from the data directory for one CLI invocation.
pub struct ApiContext {
    pub config: NetworkConfig,
    pub servers: ServerList,
    pub save: PathBuf,
}

pub fn load_from_dir(path: PathBuf) -> ApiContext {
    info!("Initialised API context from directory: {path:?}");
    ApiContext {
        config: NetworkConfig::from_file(&path),
        servers: ServerList::from_file(&path),
        save: path,
    }
}

impl ApiContext {
    pub fn network(&self) -> AgentNetwork {
        AgentNetwork::new(&self.config, &self.servers)
    }
}

/// Flags shared by every command that talks to servers.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub servers: Vec<String>,
    pub show_progress: bool,
    pub json: bool,
}

#[derive(Serialize, Debug)]
pub struct ServerInfo {
    name: String,
    endpoint: Option<String>,
    auth: bool,
}

impl From<&Server> for ServerInfo {
    fn from(server: &Server) -> Self {
        Self {
            name: server.name.clone(),
            endpoint: server.endpoint.clone(),
            auth: server.api_key.is_some(),
        }
    }
}

pub fn get_servers(ctx: &ApiContext) -> Vec<ServerInfo> {
    ctx.servers.sorted().into_iter().map(ServerInfo::from).collect()
}
