//! Conversation orchestration for relaybot.
//!
//! One addressed post flows through here as:
//!
//! 1. **Gate** the post ([`AddressPolicy`]) and queue it on its
//!    conversation's worker ([`Dispatcher`])
//! 2. **Encode** text attachments into an inline file block ([`file_block`])
//! 3. **Complete** against the provider, running tool calls until the model
//!    stops ([`Orchestrator`])
//! 4. **Decode** an embedded file out of the reply, then **split** the rest
//!    into transport-sized chunks ([`chunking`])
//!
//! Conversations are serialized: each has one worker and one history, and
//! different conversations run in parallel.

pub mod chunking;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod file_block;
pub mod orchestrator;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use conversation::ConversationContext;
pub use dispatcher::{AddressPolicy, Dispatcher, DispatcherConfig};
pub use error::OrchestrationError;
pub use file_block::{DecodedReply, FileSection};
pub use orchestrator::Orchestrator;
pub use supervisor::spawn_supervisor;
