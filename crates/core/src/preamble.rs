//! Preamble — the instruction text prepended to every provider request.
//!
//! The preamble is never stored in the conversation history. It is rebuilt
//! for each request and its role depends on the model family: reasoning
//! models (`o1*`) reject `system` messages, so they get the same text as an
//! `assistant` message instead.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::message::Message;

/// Built-in preamble used when no preamble file is configured.
pub const DEFAULT_PREAMBLE: &str = concat!(
    "You are a help-desk assistant in a chat server. ",
    "Users ask you to troubleshoot installations and explain error messages; ",
    "they may attach log or configuration files.\n",
    "\n",
    "Attached files arrive inside a block that starts with a line `### FILE ###` ",
    "and ends with a line `### FILE END ###`. Each file starts with a line ",
    "`#FILENAME=<name>`.\n",
    "\n",
    "When you want to hand the user a file (a corrected config, a script, a long log excerpt), ",
    "put it in your reply using the same block: `### FILE ###`, then `#FILENAME=<name>`, ",
    "then the content, then `### FILE END ###`. Only one file block per reply.\n",
    "\n",
    "Keep messages short and to the point. No huge paragraphs unless explicitly requested.",
);

/// Model-name prefix of the reasoning family.
const REASONING_PREFIX: &str = "o1";

/// Capability class of a model, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// General-purpose chat models: system role and tool calling supported.
    Chat,
    /// Reasoning models: no system role, no tool declarations.
    Reasoning,
}

impl ModelFamily {
    /// Classify a model by its name prefix.
    pub fn of(model: &str) -> Self {
        if model.starts_with(REASONING_PREFIX) {
            Self::Reasoning
        } else {
            Self::Chat
        }
    }

    /// Whether tool declarations may be sent to this family.
    pub fn supports_tools(self) -> bool {
        matches!(self, Self::Chat)
    }

    /// Whether this family accepts a `system` role message.
    pub fn supports_system_role(self) -> bool {
        matches!(self, Self::Chat)
    }
}

/// Instruction text prepended to each request.
#[derive(Debug, Clone)]
pub struct Preamble {
    text: String,
    source: Option<PathBuf>,
}

impl Preamble {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
        }
    }

    /// Load the preamble from `path`, or fall back to [`DEFAULT_PREAMBLE`].
    ///
    /// An unreadable file is an error: a misconfigured preamble must stop
    /// startup rather than silently run with the default.
    pub fn load(path: Option<&Path>) -> std::io::Result<Self> {
        let Some(path) = path else {
            debug!("No preamble file configured, using built-in preamble");
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)?;
        debug!(file = %path.display(), len = text.len(), "Loaded preamble file");
        Ok(Self {
            text: text.trim().to_string(),
            source: Some(path.to_path_buf()),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The file this preamble was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// The preamble as a message suitable for `model`.
    pub fn message_for(&self, model: &str) -> Message {
        if ModelFamily::of(model).supports_system_role() {
            Message::system(&self.text)
        } else {
            Message::assistant(&self.text)
        }
    }

    /// Rough token estimate (4 chars per token).
    pub fn estimated_tokens(&self) -> usize {
        self.text.len() / 4
    }
}

impl Default for Preamble {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE)
    }
}
