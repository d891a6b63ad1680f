pub mod hooks;
mod instance;
pub mod manager;
pub mod network;
pub mod progress;
pub mod transport;

pub use instance::McpClient;
pub use manager::{ConnectOutcome, ConnectionManager};
pub use network::{ConnectionInfo, Delivery, ServerStatus};
