use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Payload {
    Connect { latency: u64 },
    Disconnect { reason: Option<String> },
    Delivered { timestamp: u64 },
    Failed { error: String },
}
