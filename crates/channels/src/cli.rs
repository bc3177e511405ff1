//! CLI channel — interactive terminal-based chat.
//!
//! This is the simplest channel: reads from stdin, writes to stdout.
//! Used by `relaybot chat`. Files the model sends are written to the output
//! directory; reactions are printed.

use async_trait::async_trait;
use relaybot_core::channel::{Channel, ChannelId, ChannelMessage, OutgoingFile};
use relaybot_core::error::ChannelError;
use std::path::{Path, PathBuf};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

/// Chat ID of the single terminal conversation.
pub const CLI_CHAT_ID: &str = "cli_session";

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    id: ChannelId,
    output_dir: PathBuf,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::with_output_dir(".")
    }

    /// Write received files into `dir` instead of the working directory.
    pub fn with_output_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            id: ChannelId("cli".into()),
            output_dir: dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where a received file lands. Only the final path component of the
    /// model-chosen name is used.
    fn file_target(&self, filename: &str) -> PathBuf {
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("file.txt");
        self.output_dir.join(name)
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let channel_id = self.id.clone();

        tokio::spawn(async move {
            let stdin = io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();
            let mut counter: u64 = 0;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }

                        // Check for exit commands
                        if matches!(
                            line.as_str(),
                            "exit" | "quit" | "/exit" | "/quit" | ":q"
                        ) {
                            break;
                        }

                        counter += 1;
                        let msg = ChannelMessage {
                            channel_id: channel_id.clone(),
                            message_id: counter.to_string(),
                            chat_id: CLI_CHAT_ID.into(),
                            sender_id: "local_user".into(),
                            sender_name: Some("User".into()),
                            sender_is_bot: false,
                            content: line,
                            attachments: vec![],
                            mentions: vec![],
                        };

                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, _chat_id: &str, content: &str) -> Result<(), ChannelError> {
        println!("{content}");
        Ok(())
    }

    async fn send_file(&self, _chat_id: &str, file: &OutgoingFile) -> Result<(), ChannelError> {
        let target = self.file_target(&file.filename);
        tokio::fs::write(&target, &file.bytes)
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: "cli".into(),
                reason: format!("{}: {e}", target.display()),
            })?;
        info!(path = %target.display(), bytes = file.bytes.len(), "Saved file from assistant");
        println!("[file saved: {}]", target.display());
        Ok(())
    }

    async fn add_reaction(
        &self,
        _chat_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChannelError> {
        println!("[reacted {emoji} to message {message_id}]");
        Ok(())
    }
}
