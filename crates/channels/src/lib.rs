//! Chat channel implementations for relaybot.
//!
//! Each channel connects to a chat platform and relays posts to/from the
//! dispatcher. Channels are trait-based and platform-agnostic.
//!
//! Available channels:
//! - **Discord** — REST delivery plus a signed inbound event relay
//! - **CLI** — Interactive terminal chat (stdin/stdout)
//!
//! [`HttpFetcher`] downloads attachment bodies for either.

pub mod cli;
pub mod discord;
pub mod download;

pub use cli::CliChannel;
pub use discord::{DiscordChannel, DiscordConfig, strip_mentions};
pub use download::HttpFetcher;
