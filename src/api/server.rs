use crate::{
    api::ApiContext,
    client::transport::parse_endpoint,
    error::Error
};
use anyhow::{bail, Context};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io, path::Path,
    fs,
    fmt::Display
};

const SERVERS_FILE: &str = "servers.json";

fn save(api: &ApiContext) -> anyhow::Result<()> {
    api.servers.write_to_file(&api.save).map_err(|e| {
        warn!("Failed to write server list: {e}");
        e
    }).context("Failed to write server list")
}

pub fn create(
    api: &mut ApiContext,
    name: String,
    endpoint: Option<String>,
    api_key: Option<String>
) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        bail!("Server name must not be empty");
    }
    if api.servers.0.contains_key(&name) {
        return Err(Error::ServerExists(name).into());
    }
    if let Some(endpoint) = &endpoint {
        parse_endpoint(&name, endpoint)?;
    }
    let server = Server { name: name.clone(), endpoint, api_key };
    info!("Creating server {server}");
    api.servers.0.insert(name, server);
    save(api)
}

pub fn delete(api: &mut ApiContext, name: &str) -> anyhow::Result<()> {
    if api.servers.0.remove(name).is_none() {
        return Err(Error::UnknownServer(name.to_owned()).into());
    }
    info!("Deleting server {name}");
    save(api)
}

#[derive(Serialize, Deserialize, Default)]
pub struct List(pub(crate) HashMap<String, Server>);

impl List {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn from_file(path: &Path) -> Self {
        let path = path.join(SERVERS_FILE);
        if !path.exists() {
            return Self::new();
        }
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(content.as_str()) {
                Ok(list) => return list,
                Err(e) => error!("Failed to parse server list: {e}"),
            },
            Err(e) => error!("Failed to read server list: {e}"),
        }
        error!("Failed to load server list from {path:?}");
        Self::new()
    }

    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)?;
        let path = path.join(SERVERS_FILE);
        info!("Writing server list to {path:?}");
        fs::write(path, serde_json::to_string_pretty(self)?)
    }

    pub fn get_server(&self, name: &str) -> Option<&Server> {
        self.0.get(name)
    }

    /// Registered servers ordered by name.
    pub fn sorted(&self) -> Vec<&Server> {
        let mut servers: Vec<_> = self.0.values().collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Server {
    pub name: String,
    /// JSON-RPC endpoint. Servers without one are served in-process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Display for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.endpoint {
            Some(endpoint) => write!(f, "{} ({endpoint})", self.name),
            None => write!(f, "{} (loopback)", self.name),
        }
    }
}

impl Server {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), endpoint: None, api_key: None }
    }

    pub fn with_endpoint(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self { name: name.into(), endpoint: Some(endpoint.into()), api_key: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api;

    #[test]
    fn create_persists_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = api::load_from_dir(dir.path().to_path_buf());
        create(&mut ctx, "local".into(), Some("http://127.0.0.1:9000/mcp".into()), None).unwrap();
        let duplicate = create(&mut ctx, "local".into(), None, None).unwrap_err();
        assert!(matches!(duplicate.downcast_ref::<Error>(), Some(Error::ServerExists(name)) if name == "local"));

        let reloaded = List::from_file(dir.path());
        let server = reloaded.get_server("local").unwrap();
        assert_eq!(server.endpoint.as_deref(), Some("http://127.0.0.1:9000/mcp"));
    }

    #[test]
    fn create_rejects_bad_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = api::load_from_dir(dir.path().to_path_buf());
        assert!(create(&mut ctx, "ftp".into(), Some("ftp://example.com".into()), None).is_err());
        assert!(create(&mut ctx, "junk".into(), Some("not a url".into()), None).is_err());
        assert!(ctx.servers.is_empty());
    }

    #[test]
    fn delete_unknown_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = api::load_from_dir(dir.path().to_path_buf());
        let missing = delete(&mut ctx, "ghost").unwrap_err();
        assert!(matches!(missing.downcast_ref::<Error>(), Some(Error::UnknownServer(_))));
        assert_eq!(missing.to_string(), "Server ghost does not exist");
        create(&mut ctx, "glama".into(), None, None).unwrap();
        delete(&mut ctx, "glama").unwrap();
        assert!(List::from_file(dir.path()).is_empty());
    }

    #[test]
    fn display_marks_loopback() {
        assert_eq!(Server::named("glama").to_string(), "glama (loopback)");
        assert_eq!(
            Server::with_endpoint("x", "http://h/mcp").to_string(),
            "x (http://h/mcp)"
        );
    }
}
