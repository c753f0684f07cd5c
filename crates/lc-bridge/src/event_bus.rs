use std::sync::{Arc, Mutex};

use crate::protocol::BridgeMessage;

/// Broadcast bus over flume channels.
///
/// Every subscriber gets each message published after it subscribed.
/// Clones share the same subscriber list.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Vec<flume::Sender<BridgeMessage>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> flume::Receiver<BridgeMessage> {
        let (tx, rx) = flume::unbounded();
        self.inner.lock().expect("EventBus lock poisoned").push(tx);
        rx
    }

    /// Publish to all current subscribers, pruning any whose receiver was
    /// dropped. Returns the number of subscribers that got the message.
    pub fn publish(&self, msg: BridgeMessage) -> usize {
        let mut senders = self.inner.lock().expect("EventBus lock poisoned");
        senders.retain(|tx| tx.send(msg.clone()).is_ok());
        tracing::trace!(
            kind = msg.kind(),
            case_id = ?msg.case_id(),
            delivered = senders.len(),
            "event published"
        );
        senders.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("EventBus lock poisoned").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
