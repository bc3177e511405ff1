//! Outcome classification of one orchestration invocation.

use relaybot_core::error::{ProviderError, ProviderFinishError};
use thiserror::Error;

/// Why an orchestration invocation produced no reply.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Provider finished abnormally: {0}")]
    Finish(#[from] ProviderFinishError),

    #[error("Provider request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Exceeded the limit of {rounds} tool-call rounds")]
    RoundLimitExceeded { rounds: usize },

    #[error("Cancelled")]
    Cancelled,
}

impl OrchestrationError {
    /// Whether the same invocation could succeed if repeated later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Finish(_) | Self::RoundLimitExceeded { .. } | Self::Cancelled => false,
        }
    }

    /// Whether this outcome must be reported as a failure of the turn.
    /// Cancellation is a shutdown, not a failure.
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable() && !matches!(self, Self::Cancelled)
    }
}
