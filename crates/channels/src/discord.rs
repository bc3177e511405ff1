//! Discord channel adapter.
//!
//! Outbound traffic (messages, file uploads, reactions, typing) goes straight
//! to the Discord REST API. Inbound `MESSAGE_CREATE` events arrive through a
//! gateway relay that POSTs them to the HTTP gateway, which verifies the
//! relay signature and hands them to [`DiscordChannel::inject_event`].

use async_trait::async_trait;
use regex::Regex;
use relaybot_core::channel::{Attachment, Channel, ChannelId, ChannelMessage, OutgoingFile};
use relaybot_core::error::ChannelError;
use serde::Deserialize;
use std::sync::LazyLock;
use tokio::sync::{OnceCell, mpsc};
use tracing::{debug, info, warn};

/// Discord REST API root.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Maximum length of one Discord message.
pub const MESSAGE_LIMIT: usize = 2000;

/// Filename used when a file arrives without one.
const FALLBACK_FILENAME: &str = "file.txt";

/// User, role and nickname mentions.
static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?\d+>|<@&\d+>").expect("valid mention pattern"));

/// Remove user and role pings from outbound text.
pub fn strip_mentions(input: &str) -> String {
    MENTION_PATTERN.replace_all(input, "").into_owned()
}

/// Discord channel configuration.
#[derive(Clone)]
pub struct DiscordConfig {
    /// Bot token from the Discord Developer Portal.
    pub bot_token: String,
    /// The channel the bot answers in.
    pub channel_id: u64,
    /// The bot's own user ID. Looked up via `/users/@me` when unset.
    pub bot_user_id: Option<String>,
    /// HMAC secret shared with the inbound relay. `None` = unsigned.
    pub relay_secret: Option<String>,
    /// REST API root, overridable for tests.
    pub api_base: String,
}

impl DiscordConfig {
    pub fn new(bot_token: impl Into<String>, channel_id: u64) -> Self {
        Self {
            bot_token: bot_token.into(),
            channel_id,
            bot_user_id: None,
            relay_secret: None,
            api_base: DISCORD_API_BASE.into(),
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &"[REDACTED]")
            .field("channel_id", &self.channel_id)
            .field("bot_user_id", &self.bot_user_id)
            .field(
                "relay_secret",
                &self.relay_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// A Discord `MESSAGE_CREATE` payload, as forwarded by the relay.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordMessageEvent {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub content: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub attachments: Vec<DiscordAttachment>,
    #[serde(default)]
    pub mentions: Vec<DiscordUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordAttachment {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl From<DiscordMessageEvent> for ChannelMessage {
    fn from(event: DiscordMessageEvent) -> Self {
        ChannelMessage {
            channel_id: ChannelId("discord".into()),
            message_id: event.id,
            chat_id: event.channel_id,
            sender_id: event.author.id,
            sender_name: event.author.username,
            sender_is_bot: event.author.bot,
            content: event.content,
            attachments: event
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    url: a.url,
                    filename: a.filename,
                    content_type: a.content_type,
                    size_bytes: a.size,
                })
                .collect(),
            mentions: event.mentions.into_iter().map(|u| u.id).collect(),
        }
    }
}

/// Discord channel adapter.
pub struct DiscordChannel {
    config: DiscordConfig,
    channel_id: ChannelId,
    client: reqwest::Client,
    bot_user_id: OnceCell<String>,
    inject_tx: tokio::sync::Mutex<Option<mpsc::Sender<Result<ChannelMessage, ChannelError>>>>,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ChannelError::NotConfigured(format!("HTTP client: {e}")))?;

        let bot_user_id = OnceCell::new_with(config.bot_user_id.clone());

        Ok(Self {
            config,
            channel_id: ChannelId("discord".into()),
            client,
            bot_user_id,
            inject_tx: tokio::sync::Mutex::new(None),
        })
    }

    /// The channel the bot is configured to answer in.
    pub fn home_channel(&self) -> u64 {
        self.config.channel_id
    }

    /// Decode a relayed event body.
    pub fn parse_event(body: &[u8]) -> Result<ChannelMessage, ChannelError> {
        serde_json::from_slice::<DiscordMessageEvent>(body)
            .map(ChannelMessage::from)
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))
    }

    /// Verify and inject a relayed event (called by the HTTP handler).
    pub async fn inject_event(&self, body: &[u8], signature: Option<&str>) -> Result<(), ChannelError> {
        if !self.validate_signature(body, signature.unwrap_or_default()) {
            warn!("Rejected relayed Discord event with bad signature");
            return Err(ChannelError::InvalidSignature);
        }
        let msg = Self::parse_event(body)?;
        self.inject_message(msg).await
    }

    /// Inject a message as if it came from Discord.
    pub async fn inject_message(&self, msg: ChannelMessage) -> Result<(), ChannelError> {
        let guard = self.inject_tx.lock().await;
        if let Some(tx) = guard.as_ref() {
            tx.send(Ok(msg))
                .await
                .map_err(|_| ChannelError::ConnectionLost("Message channel closed".into()))
        } else {
            Err(ChannelError::ConnectionLost("Channel not started".into()))
        }
    }

    /// Validate an HMAC-SHA256 signature of a relayed event.
    ///
    /// Accepts `sha256=<hex_digest>` or a bare hex digest. Without a
    /// configured secret every payload is accepted.
    pub fn validate_signature(&self, payload: &[u8], signature: &str) -> bool {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let secret = match &self.config.relay_secret {
            None => return true,
            Some(secret) if secret.is_empty() => return true,
            Some(secret) => secret,
        };

        let sig_hex = signature.strip_prefix("sha256=").unwrap_or(signature);
        let Ok(provided_bytes) = hex::decode(sig_hex) else {
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(payload);

        // Constant-time comparison
        mac.verify_slice(&provided_bytes).is_ok()
    }

    /// Build an API URL from path segments; segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ChannelError> {
        let mut url = reqwest::Url::parse(&self.config.api_base)
            .map_err(|e| ChannelError::NotConfigured(format!("Discord API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ChannelError::NotConfigured("Discord API base cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("Bot {}", self.config.bot_token))
    }

    /// Map a non-success response to a delivery failure.
    async fn check(response: reqwest::Response, what: &str) -> Result<(), ChannelError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::DeliveryFailed {
            channel: "discord".into(),
            reason: format!("{what}: HTTP {}: {body}", status.as_u16()),
        })
    }

    fn transport_error(e: reqwest::Error) -> ChannelError {
        ChannelError::DeliveryFailed {
            channel: "discord".into(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    fn id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        info!(channel_id = self.config.channel_id, "Discord channel starting");
        let (tx, rx) = mpsc::channel(64);
        *self.inject_tx.lock().await = Some(tx);
        Ok(rx)
    }

    async fn send(&self, chat_id: &str, content: &str) -> Result<(), ChannelError> {
        let content = strip_mentions(content);
        if content.trim().is_empty() {
            debug!(chat_id = %chat_id, "Skipping empty Discord message");
            return Ok(());
        }

        let url = self.endpoint(&["channels", chat_id, "messages"])?;
        let body = serde_json::json!({
            "content": content,
            "allowed_mentions": { "parse": [] },
        });

        debug!(chat_id = %chat_id, content_len = content.len(), "Discord send");
        let response = self
            .authorized(self.client.post(url))
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::check(response, "send message").await
    }

    async fn send_file(&self, chat_id: &str, file: &OutgoingFile) -> Result<(), ChannelError> {
        let filename = if file.filename.trim().is_empty() {
            FALLBACK_FILENAME.to_string()
        } else {
            file.filename.clone()
        };

        let url = self.endpoint(&["channels", chat_id, "messages"])?;
        let payload = serde_json::json!({
            "attachments": [{ "id": 0, "filename": filename }],
        });
        let form = reqwest::multipart::Form::new()
            .text("payload_json", payload.to_string())
            .part(
                "files[0]",
                reqwest::multipart::Part::bytes(file.bytes.clone()).file_name(filename.clone()),
            );

        debug!(chat_id = %chat_id, filename = %filename, bytes = file.bytes.len(), "Discord file upload");
        let response = self
            .authorized(self.client.post(url))
            .multipart(form)
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::check(response, "upload file").await
    }

    async fn add_reaction(
        &self,
        chat_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChannelError> {
        let url = self.endpoint(&[
            "channels", chat_id, "messages", message_id, "reactions", emoji, "@me",
        ])?;
        let response = self
            .authorized(self.client.put(url))
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::check(response, "add reaction").await
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        let url = self.endpoint(&["channels", chat_id, "typing"])?;
        let response = self
            .authorized(self.client.post(url))
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::check(response, "typing").await
    }

    async fn bot_user_id(&self) -> Option<String> {
        let lookup = self
            .bot_user_id
            .get_or_try_init(|| async {
                let url = self.endpoint(&["users", "@me"])?;
                let response = self
                    .authorized(self.client.get(url))
                    .send()
                    .await
                    .map_err(Self::transport_error)?;
                let me: DiscordUser = response
                    .error_for_status()
                    .map_err(Self::transport_error)?
                    .json()
                    .await
                    .map_err(Self::transport_error)?;
                info!(bot_user_id = %me.id, "Resolved Discord bot user");
                Ok::<_, ChannelError>(me.id)
            })
            .await;

        match lookup {
            Ok(id) => Some(id.clone()),
            Err(e) => {
                warn!(error = %e, "Could not resolve Discord bot user ID");
                None
            }
        }
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        info!("Discord channel stopping");
        *self.inject_tx.lock().await = None;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, ChannelError> {
        Ok(!self.config.bot_token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DiscordConfig {
        DiscordConfig {
            bot_user_id: Some("999".into()),
            ..DiscordConfig::new("test-discord-token", 42)
        }
    }

    fn sign(secret: &str, payload: &[u8]) -> String {
        use hmac::{Hmac, Mac};
        let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    const EVENT: &str = r#"{
        "id": "1001",
        "channel_id": "42",
        "content": "<@999> my install fails",
        "author": { "id": "7", "username": "alice" },
        "attachments": [
            { "url": "https://cdn.discordapp.com/a/log.txt", "filename": "log.txt",
              "content_type": "text/plain; charset=utf-8", "size": 120 }
        ],
        "mentions": [ { "id": "999", "username": "relaybot", "bot": true } ]
    }"#;

    #[test]
    fn channel_name_and_id() {
        let ch = DiscordChannel::new(test_config()).unwrap();
        assert_eq!(ch.name(), "discord");
        assert_eq!(ch.id().0, "discord");
        assert_eq!(ch.home_channel(), 42);
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", test_config());
        assert!(!debug.contains("test-discord-token"));
    }

    #[test]
    fn strips_user_and_role_mentions() {
        assert_eq!(strip_mentions("hi <@123> and <@!456>"), "hi  and ");
        assert_eq!(strip_mentions("ping <@&789>!"), "ping !");
        assert_eq!(strip_mentions("<#42> stays"), "<#42> stays");
        assert_eq!(strip_mentions("no pings"), "no pings");
    }

    #[test]
    fn parses_relayed_event() {
        let msg = DiscordChannel::parse_event(EVENT.as_bytes()).unwrap();
        assert_eq!(msg.message_id, "1001");
        assert_eq!(msg.chat_id, "42");
        assert_eq!(msg.sender_id, "7");
        assert_eq!(msg.sender_name.as_deref(), Some("alice"));
        assert!(!msg.sender_is_bot);
        assert_eq!(msg.mentions, vec!["999".to_string()]);
        assert_eq!(msg.attachments.len(), 1);
        assert!(msg.attachments[0].is_text());
        assert_eq!(msg.attachments[0].size_bytes, Some(120));
    }

    #[test]
    fn malformed_event_is_invalid_payload() {
        let err = DiscordChannel::parse_event(b"{\"id\": 1}").unwrap_err();
        assert!(matches!(err, ChannelError::InvalidPayload(_)));
    }

    #[test]
    fn signature_validation() {
        let ch = DiscordChannel::new(DiscordConfig {
            relay_secret: Some("s3cret".into()),
            ..test_config()
        })
        .unwrap();
        let payload = EVENT.as_bytes();
        assert!(ch.validate_signature(payload, &sign("s3cret", payload)));
        assert!(!ch.validate_signature(payload, &sign("wrong", payload)));
        assert!(!ch.validate_signature(payload, "sha256=not-hex"));
        assert!(!ch.validate_signature(payload, ""));
    }

    #[test]
    fn no_secret_accepts_everything() {
        let ch = DiscordChannel::new(test_config()).unwrap();
        assert!(ch.validate_signature(b"anything", ""));
    }

    #[test]
    fn endpoints_are_percent_encoded() {
        let ch = DiscordChannel::new(test_config()).unwrap();
        let url = ch
            .endpoint(&["channels", "42", "messages", "1001", "reactions", "❤️", "@me"])
            .unwrap();
        assert!(url.as_str().starts_with("https://discord.com/api/v10/channels/42/messages/1001/reactions/%E2%9D%A4"));
        assert!(url.as_str().ends_with("/@me"));
    }

    #[tokio::test]
    async fn configured_bot_user_id_skips_lookup() {
        let ch = DiscordChannel::new(test_config()).unwrap();
        assert_eq!(ch.bot_user_id().await.as_deref(), Some("999"));
    }

    #[tokio::test]
    async fn inject_before_start_fails() {
        let ch = DiscordChannel::new(test_config()).unwrap();
        let err = ch.inject_event(EVENT.as_bytes(), None).await.unwrap_err();
        assert!(matches!(err, ChannelError::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn start_inject_and_receive() {
        let ch = DiscordChannel::new(test_config()).unwrap();
        let mut rx = ch.start().await.unwrap();

        ch.inject_event(EVENT.as_bytes(), None).await.unwrap();
        let received = rx.recv().await.unwrap().unwrap();
        assert_eq!(received.content, "<@999> my install fails");

        ch.stop().await.unwrap();
        assert!(ch.inject_event(EVENT.as_bytes(), None).await.is_err());
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_parsing() {
        let ch = DiscordChannel::new(DiscordConfig {
            relay_secret: Some("s3cret".into()),
            ..test_config()
        })
        .unwrap();
        let _rx = ch.start().await.unwrap();
        let err = ch.inject_event(b"not json", Some("sha256=00")).await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidSignature));
    }
}
