//! Event system for provenance operations
//!
//! Services emit an event after every committed write. Listeners get them
//! over a broadcast channel; with no subscriber the event is dropped.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::db::OwnerRef;

/// Provenance events emitted by services
#[derive(Debug, Clone)]
pub enum ProvenanceEvent {
    // Keystroke events
    KeystrokesAppended {
        owner: OwnerRef,
        accepted: usize,
        keystroke_count: i32,
    },

    // Document events
    DocumentCreated {
        id: String,
        author_id: String,
    },
    DocumentUpdated {
        id: String,
    },
    DocumentPublished {
        id: String,
        public_slug: String,
    },
    DocumentDeleted {
        id: String,
    },

    // Verification events
    VerificationCreated {
        id: String,
        public_id: String,
        status: String,
    },
    VerificationFinalized {
        id: String,
        status: String,
        keystroke_count: i32,
    },

    // Author events
    UserCreated {
        id: String,
    },
}

impl ProvenanceEvent {
    /// Short name used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            ProvenanceEvent::KeystrokesAppended { .. } => "keystrokes_appended",
            ProvenanceEvent::DocumentCreated { .. } => "document_created",
            ProvenanceEvent::DocumentUpdated { .. } => "document_updated",
            ProvenanceEvent::DocumentPublished { .. } => "document_published",
            ProvenanceEvent::DocumentDeleted { .. } => "document_deleted",
            ProvenanceEvent::VerificationCreated { .. } => "verification_created",
            ProvenanceEvent::VerificationFinalized { .. } => "verification_finalized",
            ProvenanceEvent::UserCreated { .. } => "user_created",
        }
    }
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &ProvenanceEvent);
}

/// Buffered events per subscriber before it starts lagging
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Event bus for broadcasting provenance events
pub struct EventBus {
    sender: broadcast::Sender<ProvenanceEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: ProvenanceEvent) {
        trace!(kind = event.kind(), "Emitting provenance event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProvenanceEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &ProvenanceEvent) {
        match event {
            ProvenanceEvent::KeystrokesAppended {
                owner,
                accepted,
                keystroke_count,
            } => {
                debug!(owner = %owner, accepted, keystroke_count, "Keystrokes appended");
            }
            ProvenanceEvent::DocumentPublished { id, public_slug } => {
                info!(id = %id, public_slug = %public_slug, "Document published");
            }
            ProvenanceEvent::DocumentDeleted { id } => {
                debug!(id = %id, "Document deleted");
            }
            ProvenanceEvent::VerificationFinalized {
                id,
                status,
                keystroke_count,
            } => {
                info!(id = %id, status = %status, keystroke_count, "Verification finalized");
            }
            other => {
                trace!(kind = other.kind(), event = ?other, "Provenance event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
