//! Supervisory error channel: a task that reports domain events.

use relaybot_core::event::{DomainEvent, EventBus};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Spawn a task that logs every event published on `bus`.
///
/// The task ends when the bus is dropped.
pub fn spawn_supervisor(bus: &EventBus) -> JoinHandle<usize> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        let mut failures = 0;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if report(&event) {
                        failures += 1;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Supervisor fell behind, events skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!(failures, "Supervisor stopped");
        failures
    })
}

/// Log one event. Returns `true` for failures.
fn report(event: &DomainEvent) -> bool {
    match event {
        DomainEvent::MessageReceived {
            channel,
            conversation_id,
            sender_id,
            content_preview,
            ..
        } => {
            debug!(%channel, %conversation_id, %sender_id, preview = %content_preview, "Message received");
            false
        }
        DomainEvent::ToolExecuted {
            tool_name,
            success,
            duration_ms,
            ..
        } => {
            debug!(tool = %tool_name, success, duration_ms, "Tool executed");
            false
        }
        DomainEvent::ResponseSent {
            conversation_id,
            chunks,
            with_file,
            ..
        } => {
            debug!(%conversation_id, chunks, with_file, "Response sent");
            false
        }
        DomainEvent::MessageDropped {
            conversation_id,
            reason,
            ..
        } => {
            warn!(%conversation_id, %reason, "Message dropped");
            true
        }
        DomainEvent::TurnFailed {
            conversation_id,
            error_message,
            ..
        } => {
            error!(%conversation_id, error = %error_message, "Turn failed");
            true
        }
    }
}
