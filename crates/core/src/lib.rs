//! # relaybot core
//!
//! Domain types, traits, and error definitions for the relaybot chat relay.
//! This crate has **no framework dependencies**: it defines the domain model
//! that the provider, channel, tool and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (LLM provider, chat channel, attachment
//! downloader, tool handler) is a trait here. Implementations live in their
//! respective crates, which keeps the orchestration logic testable with
//! scripted mocks.

pub mod channel;
pub mod error;
pub mod event;
pub mod history;
pub mod message;
pub mod preamble;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use channel::{AttachmentFetcher, Channel, ChannelId, ChannelMessage, OutgoingFile};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use history::{HistoryBuffer, Turn};
pub use message::{ConversationId, Message, MessageToolCall, Role};
pub use preamble::{ModelFamily, Preamble};
pub use provider::{FinishReason, Provider, ProviderRequest, ProviderResponse};
pub use tool::{Tool, ToolArguments, ToolCall, ToolContext, ToolKind, ToolName, ToolOutcome, ToolRegistry};
