//! Error types for the relaybot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for relaybot operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Provider finish error: {0}")]
    Finish(#[from] ProviderFinishError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Transport-level failures talking to the completion provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether repeating the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_) | Self::NotConfigured(_) => false,
        }
    }
}

/// The provider finished a completion for a reason other than `stop` or
/// `tool_calls`. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderFinishError {
    #[error("Incomplete model output due to the max tokens parameter or token limit exceeded")]
    Length,

    #[error("Omitted content due to a content filter flag")]
    ContentFilter,

    #[error("Legacy function_call finish signal, deprecated in favor of tool calls")]
    LegacyFunctionCall,

    #[error("Unsupported finish signal: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid inbound payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid relay signature")]
    InvalidSignature,
}

/// Recoverable tool failures. These become textual tool results so the
/// model can adapt; they never abort the completion loop.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Missing required argument '{0}'")]
    MissingArgument(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Delivery failed: {0}")]
    Delivery(#[from] ChannelError),
}
