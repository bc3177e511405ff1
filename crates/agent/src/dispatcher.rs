//! Routing of inbound posts to per-conversation workers.
//!
//! Every conversation gets one bounded queue and one worker task. The worker
//! handles its posts strictly one after another, so a conversation's history
//! only ever sees one completion at a time, while separate conversations run
//! in parallel. The receive loop never waits on a worker: a full queue drops
//! the post and reports it on the event bus.

use relaybot_core::channel::{AttachmentFetcher, Channel, ChannelMessage, OutgoingFile};
use relaybot_core::error::ChannelError;
use relaybot_core::event::{DomainEvent, EventBus};
use relaybot_core::message::{ConversationId, Message};
use relaybot_core::tool::ToolContext;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunking::{self, DEFAULT_CHUNK_LIMIT, LINE_BOUNDARY};
use crate::conversation::ConversationContext;
use crate::error::OrchestrationError;
use crate::file_block::{self, DEFAULT_CHAR_BUDGET};
use crate::orchestrator::Orchestrator;

const PREVIEW_CHARS: usize = 80;

/// Decides whether a post is addressed to the bot.
#[derive(Debug, Clone, Default)]
pub struct AddressPolicy {
    /// Only posts in this chat are answered; any chat when unset
    pub channel_id: Option<String>,

    /// The bot's own user ID, matched against mentions
    pub bot_user_id: Option<String>,
}

impl AddressPolicy {
    pub fn new(channel_id: impl Into<String>, bot_user_id: Option<String>) -> Self {
        Self {
            channel_id: Some(channel_id.into()),
            bot_user_id,
        }
    }

    /// Answer every human post, wherever it comes from.
    pub fn open() -> Self {
        Self::default()
    }

    /// Bots are ignored. Otherwise the post must be in the home chat and
    /// either mention nobody or mention the bot.
    pub fn accepts(&self, msg: &ChannelMessage) -> bool {
        if msg.sender_is_bot {
            return false;
        }
        if self.channel_id.as_ref().is_some_and(|id| *id != msg.chat_id) {
            return false;
        }
        if msg.mentions.is_empty() {
            return true;
        }
        self.bot_user_id
            .as_ref()
            .is_some_and(|bot| msg.mentions.iter().any(|m| m == bot))
    }
}

/// Tunables of the dispatcher and its workers.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Posts that may wait per conversation before new ones are dropped
    pub queue_capacity: usize,

    /// History window `K` of each new conversation
    pub history_window: usize,

    /// Character budget of an inbound attachment block
    pub char_budget: usize,

    /// Maximum characters per outgoing message
    pub chunk_limit: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            history_window: relaybot_core::history::DEFAULT_BUFFER_SIZE,
            char_budget: DEFAULT_CHAR_BUDGET,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
        }
    }
}

/// State shared by every worker.
struct Shared {
    orchestrator: Arc<Orchestrator>,
    channel: Arc<dyn Channel>,
    fetcher: Arc<dyn AttachmentFetcher>,
    config: DispatcherConfig,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
}

pub struct Dispatcher {
    shared: Arc<Shared>,
    policy: AddressPolicy,
    queues: HashMap<ConversationId, mpsc::Sender<ChannelMessage>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        channel: Arc<dyn Channel>,
        fetcher: Arc<dyn AttachmentFetcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                orchestrator,
                channel,
                fetcher,
                config: DispatcherConfig::default(),
                event_bus,
                cancel: CancellationToken::new(),
            }),
            policy: AddressPolicy::open(),
            queues: HashMap::new(),
            workers: Vec::new(),
        }
    }

    /// Replace the configuration. Must be called before the first submit.
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.rebuild_shared(|shared| shared.config = config);
        self
    }

    pub fn with_policy(mut self, policy: AddressPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use an externally owned token to cancel in-flight completions.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.rebuild_shared(|shared| shared.cancel = cancel);
        self
    }

    fn rebuild_shared(&mut self, update: impl FnOnce(&mut Shared)) {
        let mut shared = Shared {
            orchestrator: self.shared.orchestrator.clone(),
            channel: self.shared.channel.clone(),
            fetcher: self.shared.fetcher.clone(),
            config: self.shared.config.clone(),
            event_bus: self.shared.event_bus.clone(),
            cancel: self.shared.cancel.clone(),
        };
        update(&mut shared);
        self.shared = Arc::new(shared);
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Number of conversations seen so far.
    pub fn conversation_count(&self) -> usize {
        self.queues.len()
    }

    /// Consume a channel's inbound stream until it ends or the dispatcher
    /// is cancelled, then wait for the workers to drain.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Result<ChannelMessage, ChannelError>>) {
        let cancel = self.shared.cancel.clone();
        info!(channel = %self.shared.channel.name(), "Dispatcher started");

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = inbound.recv() => next,
            };
            match next {
                Some(Ok(msg)) => {
                    self.submit(msg);
                }
                Some(Err(e)) => warn!(error = %e, "Inbound channel error"),
                None => break,
            }
        }

        self.shutdown().await;
    }

    /// Queue a post on its conversation's worker.
    ///
    /// Returns `true` when the post was queued; `false` when it is not
    /// addressed to the bot or its queue is full.
    pub fn submit(&mut self, msg: ChannelMessage) -> bool {
        if !self.policy.accepts(&msg) {
            debug!(chat_id = %msg.chat_id, sender = %msg.sender_id, "Ignoring post not addressed to the bot");
            return false;
        }

        let conversation_id = conversation_key(&msg);
        self.shared.event_bus.publish(DomainEvent::MessageReceived {
            channel: msg.channel_id.0.clone(),
            conversation_id: conversation_id.0.clone(),
            sender_id: msg.sender_id.clone(),
            content_preview: msg.content.chars().take(PREVIEW_CHARS).collect(),
            timestamp: chrono::Utc::now(),
        });

        let sender = self.queue_for(&conversation_id);
        match sender.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(conversation_id = %conversation_id, "Conversation queue full, dropping post");
                self.drop_event(&conversation_id, "queue full");
                false
            }
            Err(TrySendError::Closed(msg)) => {
                // The worker is gone; start a fresh one with an empty history.
                warn!(conversation_id = %conversation_id, "Conversation worker exited, restarting");
                self.queues.remove(&conversation_id);
                self.workers.retain(|worker| !worker.is_finished());
                let sender = self.queue_for(&conversation_id);
                if sender.try_send(msg).is_ok() {
                    true
                } else {
                    self.drop_event(&conversation_id, "worker unavailable");
                    false
                }
            }
        }
    }

    fn drop_event(&self, conversation_id: &ConversationId, reason: &str) {
        self.shared.event_bus.publish(DomainEvent::MessageDropped {
            conversation_id: conversation_id.0.clone(),
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn queue_for(&mut self, conversation_id: &ConversationId) -> mpsc::Sender<ChannelMessage> {
        if let Some(sender) = self.queues.get(conversation_id) {
            return sender.clone();
        }

        let (tx, rx) = mpsc::channel(self.shared.config.queue_capacity.max(1));
        let worker = Worker {
            context: ConversationContext::new(conversation_id.clone(), self.shared.config.history_window),
            shared: self.shared.clone(),
        };
        debug!(conversation_id = %conversation_id, "Starting conversation worker");
        self.workers.push(tokio::spawn(worker.run(rx)));
        self.queues.insert(conversation_id.clone(), tx.clone());
        tx
    }

    /// Close every queue and wait for the workers to finish what they hold.
    pub async fn shutdown(mut self) {
        self.queues.clear();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                error!(error = %e, "Conversation worker panicked");
            }
        }
        info!("Dispatcher stopped");
    }
}

/// Conversations are keyed by adapter and chat.
fn conversation_key(msg: &ChannelMessage) -> ConversationId {
    ConversationId(format!("{}:{}", msg.channel_id.0, msg.chat_id))
}

/// What reached the channel for one reply.
struct Delivery {
    chunks: usize,
    with_file: bool,
    file_error: Option<ChannelError>,
}

struct Worker {
    context: ConversationContext,
    shared: Arc<Shared>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<ChannelMessage>) {
        while let Some(msg) = rx.recv().await {
            self.handle(msg).await;
        }
        debug!(conversation_id = %self.context.id(), "Conversation worker finished");
    }

    async fn handle(&self, msg: ChannelMessage) {
        let shared = &self.shared;
        let conversation_id = self.context.id().0.clone();

        if let Err(e) = shared.channel.send_typing(&msg.chat_id).await {
            debug!(error = %e, "Typing indicator failed");
        }

        let mut content = msg.content.clone();
        if let Some(block) =
            file_block::encode_inbound(&msg.attachments, shared.fetcher.as_ref(), shared.config.char_budget).await
        {
            content = file_block::merge_with_user_text(&content, &block);
        }

        let ctx = ToolContext {
            channel: shared.channel.clone(),
            chat_id: msg.chat_id.clone(),
            message_id: msg.message_id.clone(),
        };

        let result = self
            .context
            .reply(&shared.orchestrator, Message::user(content), &ctx, &shared.cancel)
            .await;

        let reply = match result {
            Ok(reply) => reply,
            Err(OrchestrationError::Cancelled) => {
                info!(conversation_id = %conversation_id, "Turn cancelled");
                return;
            }
            Err(e) => {
                error!(
                    conversation_id = %conversation_id,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Turn failed"
                );
                self.report_failure(&conversation_id, e.to_string());
                return;
            }
        };

        match self.deliver(&msg.chat_id, &reply).await {
            Ok(delivery) => {
                if let Some(e) = &delivery.file_error {
                    self.report_failure(&conversation_id, format!("reply sent without its file: {e}"));
                }
                info!(
                    conversation_id = %conversation_id,
                    chunks = delivery.chunks,
                    with_file = delivery.with_file,
                    "Reply delivered"
                );
                shared.event_bus.publish(DomainEvent::ResponseSent {
                    conversation_id,
                    chunks: delivery.chunks,
                    with_file: delivery.with_file,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => {
                error!(conversation_id = %conversation_id, error = %e, "Reply delivery failed");
                self.report_failure(&conversation_id, e.to_string());
            }
        }
    }

    /// Send the embedded file (if any), then the text in chunks.
    ///
    /// A failed upload does not hold back the text; it is returned in
    /// [`Delivery::file_error`] instead.
    async fn deliver(&self, chat_id: &str, reply: &str) -> Result<Delivery, ChannelError> {
        let channel = &self.shared.channel;
        let decoded = file_block::decode_outbound(reply);

        let mut with_file = false;
        let mut file_error = None;
        if let Some(file) = decoded.file {
            let outgoing = OutgoingFile {
                filename: file.filename,
                bytes: file.content.into_bytes(),
            };
            match channel.send_file(chat_id, &outgoing).await {
                Ok(()) => with_file = true,
                Err(e) => {
                    warn!(filename = %outgoing.filename, error = %e, "File upload failed, sending text only");
                    file_error = Some(e);
                }
            }
        }

        let chunks = chunking::split(&decoded.text, self.shared.config.chunk_limit, LINE_BOUNDARY);
        for chunk in &chunks {
            channel.send(chat_id, chunk).await?;
        }

        Ok(Delivery {
            chunks: chunks.len(),
            with_file,
            file_error,
        })
    }

    fn report_failure(&self, conversation_id: &str, error_message: String) {
        self.shared.event_bus.publish(DomainEvent::TurnFailed {
            conversation_id: conversation_id.to_string(),
            error_message,
            timestamp: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use relaybot_core::channel::Attachment;
    use relaybot_core::provider::FinishReason;
    use relaybot_core::tool::ToolRegistry;

    fn dispatcher(provider: Arc<dyn relaybot_core::Provider>, channel: Arc<RecordingChannel>) -> (Dispatcher, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        let orch = Orchestrator::new(provider, "gpt-4o", Arc::new(ToolRegistry::new()), bus.clone());
        let dispatcher = Dispatcher::new(
            Arc::new(orch),
            channel,
            Arc::new(StaticFetcher::default().with("https://cdn/log", "E: disk full")),
            bus.clone(),
        );
        (dispatcher, bus)
    }

    fn mentioning(mut msg: ChannelMessage, ids: &[&str]) -> ChannelMessage {
        msg.mentions = ids.iter().map(|s| s.to_string()).collect();
        msg
    }

    #[test]
    fn policy_ignores_bots() {
        let mut msg = inbound("100", "1", "hi");
        msg.sender_is_bot = true;
        assert!(!AddressPolicy::open().accepts(&msg));
    }

    #[test]
    fn policy_requires_home_channel() {
        let policy = AddressPolicy::new("100", Some("bot".into()));
        assert!(policy.accepts(&inbound("100", "1", "hi")));
        assert!(!policy.accepts(&inbound("200", "1", "hi")));
    }

    #[test]
    fn policy_answers_only_when_unaddressed_or_mentioned() {
        let policy = AddressPolicy::new("100", Some("bot".into()));
        assert!(policy.accepts(&mentioning(inbound("100", "1", "hi"), &["bot"])));
        assert!(policy.accepts(&mentioning(inbound("100", "1", "hi"), &["someone", "bot"])));
        assert!(!policy.accepts(&mentioning(inbound("100", "1", "hi"), &["someone"])));
    }

    #[test]
    fn policy_without_bot_identity_ignores_mentions() {
        let policy = AddressPolicy::new("100", None);
        assert!(!policy.accepts(&mentioning(inbound("100", "1", "hi"), &["someone"])));
    }

    #[tokio::test]
    async fn reply_is_chunked_and_delivered() {
        let long = format!("{}\n{}", "a".repeat(10), "b".repeat(10));
        let provider = Arc::new(ScriptedProvider::responses(vec![text_response(&long)]));
        let channel = Arc::new(RecordingChannel::default());
        let (dispatcher, bus) = dispatcher(provider, channel.clone());
        let mut events = bus.subscribe();
        let mut dispatcher = dispatcher.with_config(DispatcherConfig {
            chunk_limit: 12,
            ..DispatcherConfig::default()
        });

        assert!(dispatcher.submit(inbound("100", "1", "hi")));
        dispatcher.shutdown().await;

        assert_eq!(channel.typing(), vec!["100"]);
        assert_eq!(channel.sent_texts(), vec!["a".repeat(10), format!("\n{}", "b".repeat(10))]);

        let mut sent = None;
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::ResponseSent { chunks, with_file, .. } = event.as_ref() {
                sent = Some((*chunks, *with_file));
            }
        }
        assert_eq!(sent, Some((2, false)));
    }

    #[tokio::test]
    async fn embedded_file_is_sent_before_text() {
        let provider = Arc::new(ScriptedProvider::responses(vec![text_response(
            "### FILE ###\n#FILENAME=out.txt\nhello\n### FILE END ###\ndone",
        )]));
        let channel = Arc::new(RecordingChannel::default());
        let (mut dispatcher, _bus) = dispatcher(provider, channel.clone());

        dispatcher.submit(inbound("100", "1", "give me a file"));
        dispatcher.shutdown().await;

        let files = channel.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1.filename, "out.txt");
        assert_eq!(files[0].1.bytes, b"hello");
        assert_eq!(channel.sent_texts(), vec!["done"]);
    }

    #[tokio::test]
    async fn failed_upload_still_sends_text() {
        let provider = Arc::new(ScriptedProvider::responses(vec![text_response(
            "### FILE ###\n#FILENAME=out.txt\nhello\n### FILE END ###\nhere you go",
        )]));
        let channel = Arc::new(RecordingChannel::rejecting_uploads());
        let (mut dispatcher, bus) = dispatcher(provider, channel.clone());
        let mut events = bus.subscribe();

        dispatcher.submit(inbound("100", "1", "give me a file"));
        dispatcher.shutdown().await;

        assert!(channel.files().is_empty());
        assert_eq!(channel.sent_texts(), vec!["here you go"]);

        let mut failed = false;
        let mut sent = None;
        while let Ok(event) = events.try_recv() {
            match event.as_ref() {
                DomainEvent::TurnFailed { error_message, .. } => {
                    failed = error_message.contains("without its file");
                }
                DomainEvent::ResponseSent { chunks, with_file, .. } => sent = Some((*chunks, *with_file)),
                _ => {}
            }
        }
        assert!(failed);
        assert_eq!(sent, Some((1, false)));
    }

    #[tokio::test]
    async fn text_attachments_reach_the_model() {
        let provider = Arc::new(ScriptedProvider::responses(vec![text_response("Free some space.")]));
        let channel = Arc::new(RecordingChannel::default());
        let (mut dispatcher, _bus) = dispatcher(provider.clone(), channel);

        let mut msg = inbound("100", "1", "install fails");
        msg.attachments = vec![Attachment {
            url: "https://cdn/log".into(),
            filename: "install.log".into(),
            content_type: Some("text/plain".into()),
            size_bytes: Some(12),
        }];
        dispatcher.submit(msg);
        dispatcher.shutdown().await;

        let request = &provider.requests()[0];
        let user = request.messages.last().unwrap();
        assert_eq!(
            user.content,
            "install fails\n### FILE ###\n#FILENAME=install.log\nE: disk full\n\n### FILE END ###"
        );
    }

    #[tokio::test]
    async fn same_conversation_is_serialized() {
        let provider = Arc::new(ScriptedProvider::responses(vec![
            text_response("one"),
            text_response("two"),
        ]));
        let channel = Arc::new(RecordingChannel::default());
        let (mut dispatcher, _bus) = dispatcher(provider.clone(), channel.clone());

        dispatcher.submit(inbound("100", "1", "first"));
        dispatcher.submit(inbound("100", "2", "second"));
        assert_eq!(dispatcher.conversation_count(), 1);
        dispatcher.shutdown().await;

        assert_eq!(channel.sent_texts(), vec!["one", "two"]);
        let second: Vec<_> = provider.requests()[1]
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(&second[1..], &["first", "one", "second"]);
    }

    #[tokio::test]
    async fn separate_chats_get_separate_histories() {
        let provider = Arc::new(ScriptedProvider::responses(vec![
            text_response("one"),
            text_response("two"),
        ]));
        let channel = Arc::new(RecordingChannel::default());
        let (mut dispatcher, _bus) = dispatcher(provider.clone(), channel);

        dispatcher.submit(inbound("100", "1", "first"));
        dispatcher.submit(inbound("200", "2", "second"));
        assert_eq!(dispatcher.conversation_count(), 2);
        dispatcher.shutdown().await;

        for request in provider.requests() {
            // preamble + the single user message of that chat
            assert_eq!(request.messages.len(), 2);
        }
    }

    #[tokio::test]
    async fn dead_worker_is_replaced_and_its_handle_released() {
        // An empty script makes the provider panic, taking the worker down.
        let provider = Arc::new(ScriptedProvider::responses(vec![]));
        let channel = Arc::new(RecordingChannel::default());
        let (mut dispatcher, _bus) = dispatcher(provider.clone(), channel);

        assert!(dispatcher.submit(inbound("100", "1", "first")));
        while !dispatcher.workers[0].is_finished() {
            tokio::task::yield_now().await;
        }

        assert!(dispatcher.submit(inbound("100", "2", "second")));
        assert_eq!(dispatcher.workers.len(), 1);
        assert_eq!(dispatcher.conversation_count(), 1);

        dispatcher.shutdown().await;
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn full_queue_drops_post_and_reports_it() {
        let channel = Arc::new(RecordingChannel::default());
        let (dispatcher, bus) = dispatcher(Arc::new(PendingProvider), channel);
        let mut events = bus.subscribe();
        let mut dispatcher = dispatcher.with_config(DispatcherConfig {
            queue_capacity: 1,
            ..DispatcherConfig::default()
        });

        // The worker has not run yet, so the first post fills the queue.
        assert!(dispatcher.submit(inbound("100", "1", "first")));
        assert!(!dispatcher.submit(inbound("100", "2", "second")));

        dispatcher.cancellation_token().cancel();
        dispatcher.shutdown().await;

        let mut dropped = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event.as_ref(), DomainEvent::MessageDropped { .. }) {
                dropped += 1;
            }
        }
        assert_eq!(dropped, 1);
    }

    #[tokio::test]
    async fn failed_turn_sends_nothing_and_reports() {
        let provider = Arc::new(ScriptedProvider::responses(vec![finish_response(
            "cut",
            FinishReason::Length,
        )]));
        let channel = Arc::new(RecordingChannel::default());
        let (mut dispatcher, bus) = dispatcher(provider, channel.clone());
        let mut events = bus.subscribe();

        dispatcher.submit(inbound("100", "1", "question"));
        dispatcher.shutdown().await;

        assert!(channel.sent().is_empty());
        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event.as_ref(), DomainEvent::TurnFailed { .. }) {
                failed = true;
            }
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn run_consumes_stream_until_closed() {
        let provider = Arc::new(ScriptedProvider::responses(vec![text_response("pong")]));
        let channel = Arc::new(RecordingChannel::default());
        let (dispatcher, _bus) = dispatcher(provider, channel.clone());

        let (tx, rx) = mpsc::channel(4);
        tx.send(Err(ChannelError::InvalidPayload("garbage".into()))).await.unwrap();
        tx.send(Ok(inbound("100", "1", "ping"))).await.unwrap();
        drop(tx);

        dispatcher
            .with_policy(AddressPolicy::new("100", None))
            .run(rx)
            .await;

        assert_eq!(channel.sent_texts(), vec!["pong"]);
    }
}
