//! Built-in tool implementations for relaybot.
//!
//! The model can act on the conversation in two ways: react to the post it
//! is answering, and upload a file.

pub mod add_reaction;
pub mod send_file;

#[cfg(test)]
pub(crate) mod test_support;

use relaybot_core::tool::ToolRegistry;

pub use add_reaction::AddReactionTool;
pub use send_file::SendFileTool;

/// Create a registry holding every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(AddReactionTool::new()));
    registry.register(Box::new(SendFileTool));
    registry
}
