//! The completion loop.
//!
//! One invocation answers one user message:
//!
//! ```text
//! AWAITING_COMPLETION ──stop──────────────▶ DONE
//!        │  ▲          ──length/filter/..─▶ FAILED
//!  tool_calls│
//!        ▼  │
//! HANDLING_TOOL_CALLS
//! ```
//!
//! Everything appended during the invocation is staged in a [`Turn`] and
//! only reaches the history once the model stops normally.

use relaybot_core::error::ProviderFinishError;
use relaybot_core::event::{DomainEvent, EventBus};
use relaybot_core::history::{HistoryBuffer, Turn};
use relaybot_core::message::{Message, MessageToolCall, Role};
use relaybot_core::preamble::{ModelFamily, Preamble};
use relaybot_core::provider::{FinishReason, Provider, ProviderRequest, ToolDefinition};
use relaybot_core::tool::{ToolCall, ToolContext, ToolRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::OrchestrationError;

/// Default cap on tool-call rounds per invocation.
pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// Drives the provider and the tool registry for one conversation turn.
pub struct Orchestrator {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting; provider default when unset
    temperature: Option<f32>,

    /// Max tokens per completion; provider default when unset
    max_tokens: Option<u32>,

    tools: Arc<ToolRegistry>,

    preamble: Preamble,

    /// Maximum tool-call rounds per invocation
    max_rounds: usize,

    event_bus: Arc<EventBus>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            tools,
            preamble: Preamble::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            event_bus,
        }
    }

    pub fn with_preamble(mut self, preamble: Preamble) -> Self {
        self.preamble = preamble;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the maximum number of tool-call rounds.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Tool declarations for the active model; empty for families without
    /// tool calling.
    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        if ModelFamily::of(&self.model).supports_tools() {
            self.tools.definitions()
        } else {
            Vec::new()
        }
    }

    /// Answer `user` against `history` and return the reply text.
    ///
    /// On success the user message, every intermediate assistant/tool
    /// message and the final reply are committed to `history`. On any error
    /// `history` is left exactly as it was.
    pub async fn complete(
        &self,
        history: &mut HistoryBuffer,
        user: Message,
        ctx: &ToolContext,
        cancel: &CancellationToken,
    ) -> Result<String, OrchestrationError> {
        let preamble = self.preamble.message_for(&self.model);
        let tools = self.tool_definitions();

        let mut turn = history.begin_turn();
        turn.append(user);

        let mut rounds = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(OrchestrationError::Cancelled);
            }

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: without_orphaned_results(turn.windowed_view(preamble.clone())),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tools.clone(),
            };

            debug!(
                model = %self.model,
                round = rounds,
                messages = request.messages.len(),
                "Requesting completion"
            );

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(OrchestrationError::Cancelled),
                result = self.provider.complete(request) => result?,
            };

            match response.finish_reason {
                FinishReason::Stop => {
                    let text = response.message.content.clone();
                    turn.append(response.message);
                    let committed = turn.commit();
                    info!(
                        rounds,
                        committed,
                        reply_len = text.len(),
                        "Completion finished"
                    );
                    return Ok(text);
                }
                FinishReason::ToolCalls => {
                    rounds += 1;
                    if rounds > self.max_rounds {
                        warn!(max_rounds = self.max_rounds, "Tool-call round limit exceeded");
                        return Err(OrchestrationError::RoundLimitExceeded {
                            rounds: self.max_rounds,
                        });
                    }

                    let calls = response.message.tool_calls.clone();
                    turn.append(response.message);
                    self.run_tools(&mut turn, &calls, ctx).await;
                }
                FinishReason::Length => return Err(ProviderFinishError::Length.into()),
                FinishReason::ContentFilter => return Err(ProviderFinishError::ContentFilter.into()),
                FinishReason::FunctionCall => {
                    return Err(ProviderFinishError::LegacyFunctionCall.into());
                }
                FinishReason::Other(raw) => return Err(ProviderFinishError::Unsupported(raw).into()),
            }
        }
    }

    /// Dispatch every call of one round, staging exactly one result each.
    async fn run_tools(&self, turn: &mut Turn<'_>, calls: &[MessageToolCall], ctx: &ToolContext) {
        debug!(tool_count = calls.len(), "Executing tool calls");

        for call in calls {
            let parsed = ToolCall::from(call);
            let start = std::time::Instant::now();
            let outcome = self.tools.dispatch(&parsed, ctx).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            if !outcome.is_success() {
                warn!(tool = %call.name, outcome = %outcome.text(), "Tool call did not succeed");
            }

            self.event_bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: outcome.is_success(),
                duration_ms,
                timestamp: chrono::Utc::now(),
            });

            turn.append(Message::tool_result(&call.id, outcome.text()));
        }
    }
}

/// Drop tool results whose issuing assistant message fell out of the window.
///
/// Providers reject a `tool` message that does not answer a `tool_calls`
/// entry earlier in the same request.
fn without_orphaned_results(view: Vec<Message>) -> Vec<Message> {
    let issued: HashSet<String> = view
        .iter()
        .flat_map(|m| m.tool_calls.iter().map(|c| c.id.clone()))
        .collect();
    view.into_iter()
        .filter(|m| match (&m.role, &m.tool_call_id) {
            (Role::Tool, Some(id)) => issued.contains(id),
            (Role::Tool, None) => false,
            _ => true,
        })
        .collect()
}
