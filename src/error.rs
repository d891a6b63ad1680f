use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not connected to {0}")]
    NotConnected(String),

    #[error("Server {0} already exists")]
    ServerExists(String),

    #[error("Server {0} does not exist")]
    UnknownServer(String),

    #[error("Invalid endpoint for {server}: {reason}")]
    InvalidEndpoint { server: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a JSON-RPC error object.
    #[error("{server} returned error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("No connected servers")]
    NoConnectedServers,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Worker task for {0} was aborted")]
    TaskAborted(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
