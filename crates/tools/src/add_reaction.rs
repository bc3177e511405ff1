//! Add-reaction tool — reacts to the post being answered.
//!
//! Takes no arguments. Delivery failures become the failure text so the
//! model can mention it, they never abort the turn.

use async_trait::async_trait;
use relaybot_core::error::ToolError;
use relaybot_core::tool::{Tool, ToolArguments, ToolContext, ToolKind};
use tracing::warn;

/// Red heart.
pub const HEART: &str = "\u{2764}\u{fe0f}";

pub struct AddReactionTool {
    emoji: String,
}

impl AddReactionTool {
    pub fn new() -> Self {
        Self::with_emoji(HEART)
    }

    pub fn with_emoji(emoji: impl Into<String>) -> Self {
        Self {
            emoji: emoji.into(),
        }
    }
}

impl Default for AddReactionTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for AddReactionTool {
    fn kind(&self) -> ToolKind {
        ToolKind::AddReaction
    }

    fn description(&self) -> &str {
        "Add a heart reaction to the message."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, ctx: &ToolContext, _arguments: &ToolArguments) -> Result<String, ToolError> {
        match ctx
            .channel
            .add_reaction(&ctx.chat_id, &ctx.message_id, &self.emoji)
            .await
        {
            Ok(()) => Ok("Added reaction.".into()),
            Err(e) => {
                warn!(message_id = %ctx.message_id, error = %e, "Reaction failed");
                Ok("Failed to add reaction.".into())
            }
        }
    }
}
