//! Tool trait and registry — the side effects the model may request.
//!
//! The capability set is closed: every tool is a [`ToolKind`] variant and the
//! registry maps kinds to handlers. Names coming back from the provider are
//! parsed into a [`ToolName`], where anything unrecognised is an explicit
//! [`ToolName::Unknown`] rather than a fall-through.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::channel::Channel;
use crate::error::ToolError;
use crate::message::MessageToolCall;
use crate::provider::ToolDefinition;

/// The closed set of tools this relay offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// React to the triggering post
    AddReaction,
    /// Upload a file to the conversation
    SendFile,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::AddReaction, ToolKind::SendFile];

    /// The wire name declared to the provider.
    pub fn name(self) -> &'static str {
        match self {
            Self::AddReaction => "add_reaction",
            Self::SendFile => "send_file",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A tool name as requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolName {
    Known(ToolKind),
    Unknown(String),
}

impl ToolName {
    pub fn parse(raw: &str) -> Self {
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.name() == raw)
            .map(Self::Known)
            .unwrap_or_else(|| Self::Unknown(raw.to_string()))
    }
}

/// String-to-string argument map of one tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArguments(HashMap<String, String>);

impl ToolArguments {
    /// Parse the JSON argument string sent by the provider.
    ///
    /// String values are taken as-is, other scalars are stringified, `null`
    /// is dropped. Anything that is not a JSON object yields an empty map so
    /// that required-argument checks report the problem.
    pub fn parse(raw: &str) -> Self {
        let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(raw) else {
            return Self::default();
        };

        let args = map
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            })
            .collect();
        Self(args)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Look up a required argument.
    pub fn require(&self, key: &str) -> Result<&str, ToolError> {
        self.get(key)
            .ok_or_else(|| ToolError::MissingArgument(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ToolArguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A parsed request to execute a tool.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Call ID (matches the LLM's tool_call.id)
    pub id: String,

    pub name: ToolName,

    pub arguments: ToolArguments,
}

impl From<&MessageToolCall> for ToolCall {
    fn from(call: &MessageToolCall) -> Self {
        Self {
            id: call.id.clone(),
            name: ToolName::parse(&call.name),
            arguments: ToolArguments::parse(&call.arguments),
        }
    }
}

/// What happened when a tool call was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The handler ran; text describes the result
    Success(String),
    /// The handler failed recoverably; text describes the failure
    Failure(String),
    /// No handler for this name
    Unhandled(String),
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Text recorded as the tool result in history.
    pub fn text(&self) -> String {
        match self {
            Self::Success(text) | Self::Failure(text) => text.clone(),
            Self::Unhandled(name) => format!("Unhandled tool: {name}"),
        }
    }
}

/// Where a tool's side effects land: the channel and post that triggered
/// the current turn.
#[derive(Clone)]
pub struct ToolContext {
    pub channel: Arc<dyn Channel>,

    /// Chat to deliver into
    pub chat_id: String,

    /// The post being answered (reaction target)
    pub message_id: String,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("channel", &self.channel.name())
            .field("chat_id", &self.chat_id)
            .field("message_id", &self.message_id)
            .finish()
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Which capability this handler implements.
    fn kind(&self) -> ToolKind;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool; the returned text becomes the tool result.
    async fn execute(&self, ctx: &ToolContext, arguments: &ToolArguments) -> Result<String, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.kind().name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Maps each [`ToolKind`] to its handler.
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a handler. Replaces any existing handler of the same kind.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.kind(), tool);
    }

    pub fn get(&self, kind: ToolKind) -> Option<&dyn Tool> {
        self.tools.get(&kind).map(|t| t.as_ref())
    }

    /// Tool definitions in [`ToolKind::ALL`] order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolKind::ALL
            .into_iter()
            .filter_map(|kind| self.tools.get(&kind))
            .map(|t| t.to_definition())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run one tool call. Handler errors are folded into the outcome; this
    /// never fails.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutcome {
        let kind = match &call.name {
            ToolName::Known(kind) => *kind,
            ToolName::Unknown(name) => return ToolOutcome::Unhandled(name.clone()),
        };

        let Some(tool) = self.tools.get(&kind) else {
            return ToolOutcome::Unhandled(kind.name().to_string());
        };

        match tool.execute(ctx, &call.arguments).await {
            Ok(output) => ToolOutcome::Success(output),
            Err(e) => ToolOutcome::Failure(format!("Error: {e}")),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
