//! Shared test helpers for orchestration tests.

use async_trait::async_trait;
use relaybot_core::channel::{
    AttachmentFetcher, Channel, ChannelId, ChannelMessage, OutgoingFile,
};
use relaybot_core::error::{ChannelError, ProviderError};
use relaybot_core::message::{Message, MessageToolCall};
use relaybot_core::provider::{FinishReason, Provider, ProviderRequest, ProviderResponse, Usage};
use relaybot_core::tool::ToolContext;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A provider that replays scripted results and records every request.
///
/// Panics if more calls are made than results provided.
pub struct ScriptedProvider {
    results: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(results: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        let mut results = results;
        results.reverse();
        Self {
            results: Mutex::new(results),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn responses(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.results
            .lock()
            .unwrap()
            .pop()
            .expect("ScriptedProvider: no more responses")
    }
}

/// A provider that never answers; used to exercise cancellation.
pub struct PendingProvider;

#[async_trait]
impl Provider for PendingProvider {
    fn name(&self) -> &str {
        "pending"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A plain `stop` response.
pub fn text_response(text: &str) -> ProviderResponse {
    finish_response(text, FinishReason::Stop)
}

/// A response with an arbitrary finish signal.
pub fn finish_response(text: &str, finish_reason: FinishReason) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        finish_reason,
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A `tool_calls` response requesting `calls` as `(id, name, arguments)`.
pub fn tool_call_response(calls: &[(&str, &str, &str)]) -> ProviderResponse {
    let tool_calls = calls
        .iter()
        .map(|(id, name, args)| MessageToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args.to_string(),
        })
        .collect();
    ProviderResponse {
        message: Message::assistant_with_tools("", tool_calls),
        finish_reason: FinishReason::ToolCalls,
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A channel that records everything delivered through it.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
    files: Mutex<Vec<(String, OutgoingFile)>>,
    reactions: Mutex<Vec<(String, String, String)>>,
    typing: Mutex<Vec<String>>,
    reject_uploads: bool,
}

impl RecordingChannel {
    /// A channel whose file uploads always fail.
    pub fn rejecting_uploads() -> Self {
        Self {
            reject_uploads: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text)| text).collect()
    }

    pub fn files(&self) -> Vec<(String, OutgoingFile)> {
        self.files.lock().unwrap().clone()
    }

    pub fn reactions(&self) -> Vec<(String, String, String)> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn typing(&self) -> Vec<String> {
        self.typing.lock().unwrap().clone()
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

    async fn send(&self, chat_id: &str, content: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push((chat_id.into(), content.into()));
        Ok(())
    }

    async fn send_file(&self, chat_id: &str, file: &OutgoingFile) -> Result<(), ChannelError> {
        if self.reject_uploads {
            return Err(ChannelError::DeliveryFailed {
                channel: "recording".into(),
                reason: "upload rejected".into(),
            });
        }
        self.files.lock().unwrap().push((chat_id.into(), file.clone()));
        Ok(())
    }

    async fn add_reaction(&self, chat_id: &str, message_id: &str, emoji: &str) -> Result<(), ChannelError> {
        self.reactions
            .lock()
            .unwrap()
            .push((chat_id.into(), message_id.into(), emoji.into()));
        Ok(())
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        self.typing.lock().unwrap().push(chat_id.into());
        Ok(())
    }
}

/// Serves attachment bodies from a fixed URL map.
#[derive(Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, Vec<u8>>,
}

impl StaticFetcher {
    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.into(), body.as_bytes().to_vec());
        self
    }
}

#[async_trait]
impl AttachmentFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        self.bodies.get(url).cloned()
    }
}

/// Tool context answering `msg-1` in `chat-1`.
pub fn tool_context(channel: Arc<RecordingChannel>) -> ToolContext {
    ToolContext {
        channel,
        chat_id: "chat-1".into(),
        message_id: "msg-1".into(),
    }
}

/// An inbound post in `chat_id` from a human user.
pub fn inbound(chat_id: &str, message_id: &str, content: &str) -> ChannelMessage {
    ChannelMessage {
        channel_id: ChannelId("recording".into()),
        message_id: message_id.into(),
        chat_id: chat_id.into(),
        sender_id: "user-7".into(),
        sender_name: Some("alice".into()),
        sender_is_bot: false,
        content: content.into(),
        attachments: vec![],
        mentions: vec![],
    }
}
