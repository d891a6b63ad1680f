use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration
};
use lazy_static::lazy_static;
use log::{error, info};
use serde::{Deserialize, Serialize};

lazy_static! {
    pub static ref DATA_DIR: PathBuf = dirs::config_dir()
        .unwrap_or_default()
        .join("agentworks");
}

const CONFIG_FILE: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Servers connected to when neither the command line nor the registry names any.
    pub default_servers: Vec<String>,
    /// Upper bound on concurrent connect and delivery calls.
    pub max_workers: usize,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Reported to servers as `clientInfo.name` during the handshake.
    pub client_name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_servers: vec!["glama".to_owned(), "smithery".to_owned()],
            max_workers: 5,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            client_name: "agentworks".to_owned(),
        }
    }
}

impl NetworkConfig {
    pub fn from_file(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            let defaults = Self::default();
            if let Err(e) = defaults.write_to_file(dir) {
                error!("Failed to write default config to {path:?}: {e}");
            }
            return defaults;
        }
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(e) => error!("Failed to parse config: {e}"),
            },
            Err(e) => error!("Failed to read config from {path:?}: {e}"),
        }
        Self::default()
    }

    pub fn write_to_file(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CONFIG_FILE);
        info!("Writing config to {path:?}");
        fs::write(path, serde_json::to_string_pretty(self)?)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            client_name: self.client_name.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_workers: self.max_workers.max(1),
        }
    }
}

/// Per-client settings handed down from [`NetworkConfig`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub client_name: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_workers: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        NetworkConfig::default().client_options()
    }
}
