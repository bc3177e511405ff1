//! Channel trait — the abstraction over the chat platform.
//!
//! A Channel connects the relay to a messaging platform (Discord, the local
//! terminal). It yields inbound posts and delivers text, files and
//! reactions back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Unique identifier for a channel instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A post received from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// The channel adapter this post came through
    pub channel_id: ChannelId,

    /// Platform message ID (target for reactions)
    pub message_id: String,

    /// The room/DM the post was made in; replies go here
    pub chat_id: String,

    /// Author identifier (platform-specific user ID)
    pub sender_id: String,

    /// Human-readable author name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,

    /// Whether the author is a bot account
    #[serde(default)]
    pub sender_is_bot: bool,

    /// The raw text content
    pub content: String,

    /// Attached files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// User IDs mentioned in the post
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
}

/// An attachment on an inbound post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Download URL
    pub url: String,

    /// Original filename
    pub filename: String,

    /// Declared MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// File size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl Attachment {
    /// Whether the declared content type is a `text/*` media type.
    pub fn is_text(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/"))
    }
}

/// A file to deliver through a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    /// Filename shown to users; may be empty
    pub filename: String,

    pub bytes: Vec<u8>,
}

/// The core Channel trait.
///
/// Implementations handle platform-specific connection logic, message
/// formatting and authentication.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "discord", "cli").
    fn name(&self) -> &str;

    /// Unique ID for this channel instance.
    fn id(&self) -> &ChannelId;

    /// Start listening for inbound posts.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<ChannelMessage, ChannelError>>,
        ChannelError,
    >;

    /// Send one text message to a chat.
    async fn send(&self, chat_id: &str, content: &str) -> std::result::Result<(), ChannelError>;

    /// Send a file to a chat.
    async fn send_file(&self, chat_id: &str, file: &OutgoingFile) -> std::result::Result<(), ChannelError>;

    /// React to a message with an emoji.
    async fn add_reaction(
        &self,
        chat_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> std::result::Result<(), ChannelError>;

    /// Send a typing indicator (if the platform supports it).
    async fn send_typing(&self, _chat_id: &str) -> std::result::Result<(), ChannelError> {
        Ok(()) // No-op default
    }

    /// The bot's own user ID on this platform, used for mention gating.
    async fn bot_user_id(&self) -> Option<String> {
        None
    }

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    /// Health check — is the channel operational?
    async fn health_check(&self) -> std::result::Result<bool, ChannelError> {
        Ok(true)
    }
}

/// Downloads attachment bodies.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    /// Fetch the bytes behind `url`; `None` when the download fails.
    async fn fetch(&self, url: &str) -> Option<Vec<u8>>;
}
