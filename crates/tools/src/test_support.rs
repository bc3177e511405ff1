//! Shared test helpers for tool tests.

use async_trait::async_trait;
use relaybot_core::channel::{Channel, ChannelId, ChannelMessage, OutgoingFile};
use relaybot_core::error::ChannelError;
use relaybot_core::tool::ToolContext;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// A channel that records reactions and files, optionally failing every
/// delivery.
#[derive(Default)]
pub struct RecordingChannel {
    fail: bool,
    reactions: Mutex<Vec<(String, String, String)>>,
    files: Mutex<Vec<OutgoingFile>>,
}

impl RecordingChannel {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn reactions(&self) -> Vec<(String, String, String)> {
        self.reactions.lock().await.clone()
    }

    pub async fn files(&self) -> Vec<OutgoingFile> {
        self.files.lock().await.clone()
    }

    fn check(&self) -> Result<(), ChannelError> {
        if self.fail {
            Err(ChannelError::DeliveryFailed {
                channel: "recording".into(),
                reason: "simulated outage".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn id(&self) -> &ChannelId {
        static ID: std::sync::LazyLock<ChannelId> =
            std::sync::LazyLock::new(|| ChannelId("recording".into()));
        &ID
    }

    async fn start(&self) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn send(&self, _chat_id: &str, _content: &str) -> Result<(), ChannelError> {
        self.check()
    }

    async fn send_file(&self, _chat_id: &str, file: &OutgoingFile) -> Result<(), ChannelError> {
        self.check()?;
        self.files.lock().await.push(file.clone());
        Ok(())
    }

    async fn add_reaction(&self, chat_id: &str, message_id: &str, emoji: &str) -> Result<(), ChannelError> {
        self.check()?;
        self.reactions
            .lock()
            .await
            .push((chat_id.into(), message_id.into(), emoji.into()));
        Ok(())
    }
}

/// Tool context answering `msg-1` in `chat-1`.
pub fn context(channel: Arc<RecordingChannel>) -> ToolContext {
    ToolContext {
        channel,
        chat_id: "chat-1".into(),
        message_id: "msg-1".into(),
    }
}
