//! LLM Provider implementations for relaybot.
//!
//! All providers implement the `relaybot_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
