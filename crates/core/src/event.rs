//! Domain event system — decoupled communication between bounded contexts.
//!
//! The dispatcher and orchestrator publish events here; the supervisor task
//! in the binary subscribes and logs them. Publishing never blocks and never
//! fails when nobody listens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An addressed post was accepted for processing
    MessageReceived {
        channel: String,
        conversation_id: String,
        sender_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A post was not processed because its conversation queue was full
    MessageDropped {
        conversation_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool call was dispatched
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A reply was delivered to the channel
    ResponseSent {
        conversation_id: String,
        chunks: usize,
        with_file: bool,
        timestamp: DateTime<Utc>,
    },

    /// A turn ended without a reply
    TurnFailed {
        conversation_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
