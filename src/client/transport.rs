//! Wire layer underneath [`McpClient`](super::McpClient).
//!
//! Servers registered with an endpoint are spoken to with JSON-RPC 2.0 over HTTP POST.
//! Servers without one are handled in-process by the loopback transport, which always
//! completes the handshake and accepts every message.

use std::sync::atomic::{AtomicU64, Ordering};
use log::{debug, trace};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use crate::{
    api::Server,
    config::ClientOptions,
    error::{Error, Result}
};

pub const LOOPBACK_PROTOCOL: &str = "MCP/1.0";
pub const LOOPBACK_FEATURES: [&str; 3] = ["agent_communication", "task_execution", "knowledge_sharing"];
/// Protocol revision announced in the `initialize` request.
pub const CLIENT_PROTOCOL: &str = "2025-03-26";

pub fn parse_endpoint(server: &str, endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint).map_err(|e| Error::InvalidEndpoint {
        server: server.to_owned(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::InvalidEndpoint {
            server: server.to_owned(),
            reason: format!("unsupported scheme '{scheme}'"),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    pub protocol_version: String,
    pub features: Vec<String>,
}

#[derive(Debug)]
pub enum Transport {
    Loopback,
    Http(HttpTransport),
}

impl Transport {
    pub fn for_server(server: &Server, options: &ClientOptions) -> Result<Self> {
        match &server.endpoint {
            None => Ok(Self::Loopback),
            Some(endpoint) => {
                let url = parse_endpoint(&server.name, endpoint)?;
                Ok(Self::Http(HttpTransport::new(&server.name, url, options)?))
            }
        }
    }

    pub async fn initialize(&self, api_key: Option<&str>) -> Result<Handshake> {
        match self {
            Self::Loopback => Ok(Handshake {
                protocol_version: LOOPBACK_PROTOCOL.to_owned(),
                features: LOOPBACK_FEATURES.iter().map(|f| f.to_string()).collect(),
            }),
            Self::Http(http) => http.initialize(api_key).await,
        }
    }

    pub async fn ping(&self, api_key: Option<&str>) -> Result<()> {
        match self {
            Self::Loopback => Ok(()),
            Self::Http(http) => http.call("ping", None, api_key).await.map(|_| ()),
        }
    }

    /// Delivers `message` and returns whatever the server replied with, if anything.
    pub async fn send(&self, api_key: Option<&str>, message: &Value) -> Result<Option<Value>> {
        match self {
            Self::Loopback => Ok(None),
            Self::Http(http) => {
                let reply = http.call("agent/message", Some(message), api_key).await?;
                Ok((!reply.is_null()).then_some(reply))
            }
        }
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: String,
    #[serde(default)]
    capabilities: Map<String, Value>,
}

#[derive(Debug)]
pub struct HttpTransport {
    server: String,
    endpoint: Url,
    client_name: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(server: &str, endpoint: Url, options: &ClientOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()?;
        Ok(Self {
            server: server.to_owned(),
            endpoint,
            client_name: options.client_name.clone(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    async fn initialize(&self, api_key: Option<&str>) -> Result<Handshake> {
        let params = json!({
            "protocolVersion": CLIENT_PROTOCOL,
            "capabilities": {},
            "clientInfo": {
                "name": self.client_name,
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result = self.call("initialize", Some(&params), api_key).await?;
        let result: InitializeResult = serde_json::from_value(result)?;
        let mut features: Vec<String> = result.capabilities.into_iter().map(|(k, _)| k).collect();
        features.sort();
        Ok(Handshake { protocol_version: result.protocol_version, features })
    }

    async fn call(&self, method: &str, params: Option<&Value>, api_key: Option<&str>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest { jsonrpc: "2.0", id, method, params };
        debug!("-> {} {method} #{id}", self.server);
        if let Some(params) = params {
            trace!("params: {params}");
        }

        let mut builder = self.http.post(self.endpoint.clone()).json(&request);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }
        let response: RpcResponse = builder.send().await?
            .error_for_status()?
            .json().await?;

        if let Some(error) = response.error {
            return Err(Error::Rpc {
                server: self.server.clone(),
                code: error.code,
                message: error.message,
            });
        }
        debug!("<- {} {method} #{id}", self.server);
        Ok(response.result.unwrap_or(Value::Null))
    }
}
