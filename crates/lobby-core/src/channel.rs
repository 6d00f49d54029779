// Process-wide notification channel hub.
//
// The transport pushes raw inbound frames in with `dispatch`; every registered
// listener receives its own copy, in arrival order. Features register and
// remove only their own listeners by `ListenerId`. Outbound messages are
// queued on an unbounded channel drained by the transport writer, so sends
// never block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::protocol::OutboundMessage;

/// Events delivered to channel listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A raw text frame from the server.
    Message(String),
    /// The transport disconnected. No further messages follow.
    Closed,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("notification channel is closed")]
    Closed,

    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Receiving half of a listener registration.
#[derive(Debug)]
pub struct Listener {
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Next event, or `None` once the listener was removed from the hub.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.rx.try_recv().ok()
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(ListenerId, mpsc::UnboundedSender<ChannelEvent>)>,
}

struct Inner {
    outbound: mpsc::UnboundedSender<String>,
    registry: Mutex<Registry>,
    closed: AtomicBool,
}

/// Cloneable handle to the shared notification channel.
#[derive(Clone)]
pub struct NotificationChannel {
    inner: Arc<Inner>,
}

impl NotificationChannel {
    /// Create a hub. The returned receiver yields encoded outbound frames
    /// for the transport writer.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let channel = NotificationChannel {
            inner: Arc::new(Inner {
                outbound,
                registry: Mutex::new(Registry::default()),
                closed: AtomicBool::new(false),
            }),
        };
        (channel, outbound_rx)
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new listener. If the channel is already closed the
    /// listener receives `Closed` immediately.
    pub fn add_listener(&self) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.is_closed() {
            let _ = tx.send(ChannelEvent::Closed);
        }

        let mut registry = self.registry();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.listeners.push((id, tx));
        debug!(listener = id.0, "Registered channel listener");
        Listener { id, rx }
    }

    /// Remove the listener with `id`. Returns `false` if it was not
    /// registered. Other listeners are never touched.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registry = self.registry();
        let before = registry.listeners.len();
        registry.listeners.retain(|(lid, _)| *lid != id);
        let removed = registry.listeners.len() < before;
        if removed {
            debug!(listener = id.0, "Removed channel listener");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.registry().listeners.len()
    }

    /// Fan a raw inbound frame out to every listener.
    ///
    /// Listeners whose receiver was dropped are pruned.
    pub fn dispatch(&self, text: &str) {
        let mut registry = self.registry();
        registry
            .listeners
            .retain(|(_, tx)| tx.send(ChannelEvent::Message(text.to_string())).is_ok());
    }

    /// Mark the transport as disconnected and notify every listener.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Notification channel closed");
        let registry = self.registry();
        for (_, tx) in &registry.listeners {
            let _ = tx.send(ChannelEvent::Closed);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Queue a typed outbound message.
    pub fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let text = message.encode()?;
        self.send_raw(text)
    }

    /// Queue an already-encoded outbound frame.
    pub fn send_raw(&self, text: String) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.inner
            .outbound
            .send(text)
            .map_err(|_| ChannelError::Closed)
    }
}
