mod payload;

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
pub use payload::*;

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub server: String,
    pub payload: Payload
}

/// Sending half handed to the connection manager.
///
/// Sends never wait: when the receiver lags behind or is gone, the event is dropped
/// and a warning is logged so a slow consumer cannot stall connection work.
#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::Sender<Event>
}

pub fn channel(capacity: usize) -> (EventSink, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel::<Event>(capacity.max(1));
    (EventSink { sender: tx }, rx)
}

impl EventSink {
    pub fn send(&self, server: &str, payload: Payload) {
        let event = Event { server: server.to_owned(), payload };
        match self.sender.try_send(event) {
            Ok(_) => {},
            Err(TrySendError::Full(event)) => {
                warn!("Event queue full, dropping event for {}", event.server);
            },
            Err(TrySendError::Closed(_)) => {
                debug!("Event receiver closed");
            }
        }
    }
}

/// Drains `rx` into the log until every sender is dropped.
pub fn log_events(mut rx: mpsc::Receiver<Event>) -> tokio::task::JoinHandle<()> {
    let thread = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.payload {
                Payload::Connect { latency } => {
                    info!("{} connected ({latency}ms)", event.server);
                },
                Payload::Disconnect { reason } => {
                    info!("{} disconnected: {}", event.server,
                          reason.unwrap_or_else(|| "No reason provided.".to_owned()));
                },
                Payload::Delivered { timestamp } => {
                    debug!("Message delivered to {} at {timestamp}", event.server);
                },
                Payload::Failed { error } => {
                    warn!("{}: {error}", event.server);
                }
            }
        }
    });
    debug!("Event log thread started");
    thread
}
