use serde_json::Value;
use tokio::sync::mpsc;
use shared::protocol::{PING, WHOIS};
use shared::types::Action;

/// Outbound side of the bus. Cloneable and never blocks the caller.
#[derive(Clone)]
pub struct Dispatch {
    tx: mpsc::Sender<Action>,
}

impl Dispatch {
    pub fn new(tx: mpsc::Sender<Action>) -> Self {
        Self { tx }
    }

    /// Queue an action for publishing. Dropped if the transport is gone or
    /// has fallen behind.
    pub fn dispatch(&self, action: Action) {
        if let Err(e) = self.tx.try_send(action) {
            tracing::warn!("Dropping outbound action: {}", e);
        }
    }
}

/// Heartbeat probe addressed to `handle`
pub fn ping(handle: &str) -> Action {
    Action::new(PING, Value::String(handle.to_string()))
}

/// Identity probe addressed to `handle`
pub fn whois(handle: &str) -> Action {
    Action::new(WHOIS, Value::String(handle.to_string()))
}
