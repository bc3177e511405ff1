//! Per-conversation state.

use relaybot_core::history::HistoryBuffer;
use relaybot_core::message::{ConversationId, Message};
use relaybot_core::tool::ToolContext;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::OrchestrationError;
use crate::orchestrator::Orchestrator;

/// One conversation: its key and its history.
///
/// The history lock is held for a whole completion, so two replies in the
/// same conversation never interleave their appends.
#[derive(Debug)]
pub struct ConversationContext {
    id: ConversationId,
    history: Mutex<HistoryBuffer>,
}

impl ConversationContext {
    pub fn new(id: ConversationId, window: usize) -> Self {
        Self {
            id,
            history: Mutex::new(HistoryBuffer::new(window)),
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Run one completion for `user` against this conversation's history.
    pub async fn reply(
        &self,
        orchestrator: &Orchestrator,
        user: Message,
        ctx: &ToolContext,
        cancel: &CancellationToken,
    ) -> Result<String, OrchestrationError> {
        let mut history = self.history.lock().await;
        orchestrator.complete(&mut history, user, ctx, cancel).await
    }

    /// Number of committed messages.
    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    /// A copy of the committed log.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.history.lock().await.messages().to_vec()
    }
}
