// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Origin tag identifying a CLI-class client to the backend.
pub const ORIGIN_KIRO_CLI: &str = "KIRO_CLI";

/// The only chat trigger type the gateway sends.
pub const CHAT_TRIGGER_MANUAL: &str = "MANUAL";

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Root request body sent to the Q streaming endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QPayload {
    /// The conversation envelope.
    pub conversation_state: ConversationState,
}

/// The conversation envelope: history plus the current user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    /// Per-request conversation identifier.
    pub conversation_id: String,
    /// Strictly alternating user/assistant history, oldest first.
    pub history: Vec<HistoryEntry>,
    /// The message the model is asked to answer.
    pub current_message: CurrentMessage,
    /// Always [`CHAT_TRIGGER_MANUAL`].
    pub chat_trigger_type: String,
}

impl ConversationState {
    /// The role ("user" / "assistant") of each history entry, in order.
    pub fn role_sequence(&self) -> Vec<&'static str> {
        self.history
            .iter()
            .map(|e| match e {
                HistoryEntry::User(_) => "user",
                HistoryEntry::Assistant(_) => "assistant",
            })
            .collect()
    }
}

/// Wrapper for the current user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentMessage {
    /// The user message being answered.
    #[serde(rename = "userInputMessage")]
    pub user_input_message: UserInputMessage,
}

/// One history entry. The externally tagged representation matches the
/// backend's `{"userInputMessage": …}` / `{"assistantResponseMessage": …}`
/// objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum HistoryEntry {
    /// A user turn.
    #[serde(rename = "userInputMessage")]
    User(UserInputMessage),
    /// An assistant turn.
    #[serde(rename = "assistantResponseMessage")]
    Assistant(AssistantResponseMessage),
}

// ---------------------------------------------------------------------------
// User side
// ---------------------------------------------------------------------------

/// A user message in the backend format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserInputMessage {
    /// Flattened message text.
    pub content: String,
    /// Environment state, tools, and tool results.
    pub user_input_message_context: UserInputMessageContext,
    /// Always [`ORIGIN_KIRO_CLI`].
    pub origin: String,
    /// Mapped model id (present on the current message).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Image attachments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<QImage>>,
}

/// Context object carried by every user message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserInputMessageContext {
    /// Client environment description.
    pub env_state: EnvState,
    /// Tool definitions (current message only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<QTool>>,
    /// Results answering the preceding assistant's tool uses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<QToolResult>>,
}

/// Fixed environment state reported to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvState {
    /// Reported operating system.
    pub operating_system: String,
    /// Reported working directory.
    pub current_working_directory: String,
}

impl Default for EnvState {
    fn default() -> Self {
        Self {
            operating_system: "macos".into(),
            current_working_directory: "/".into(),
        }
    }
}

/// A tool result in the backend format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QToolResult {
    /// Id of the tool use this result answers.
    pub tool_use_id: String,
    /// Text parts of the result.
    pub content: Vec<QToolResultBlock>,
    /// Outcome of the tool execution.
    pub status: QToolResultStatus,
}

/// One text part of a tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QToolResultBlock {
    /// The text content.
    pub text: String,
}

/// Tool execution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QToolResultStatus {
    /// The tool ran to completion.
    Success,
    /// The tool failed or was cancelled.
    Error,
}

/// An image attachment in the backend format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QImage {
    /// Image format (media-type suffix, e.g. `png`).
    pub format: String,
    /// The image bytes.
    pub source: QImageSource,
}

/// Image byte container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QImageSource {
    /// Base64-encoded image data.
    pub bytes: String,
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// A tool definition in the backend format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum QTool {
    /// A regular tool with a JSON-Schema input specification.
    Spec {
        /// The tool specification.
        #[serde(rename = "toolSpecification")]
        tool_specification: ToolSpecification,
    },
    /// The server-side web-search tool, passed through by type tag.
    WebSearch {
        /// Variant tag, e.g. `web_search_20250305`.
        #[serde(rename = "type")]
        tool_type: String,
        /// Tool name.
        name: String,
        /// Optional use cap.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_uses: Option<u32>,
    },
}

/// Specification of a regular tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpecification {
    /// Tool name.
    pub name: String,
    /// Description (possibly truncated by the transcoder).
    pub description: String,
    /// JSON-Schema input wrapper.
    pub input_schema: InputSchema,
}

/// Input-schema wrapper (`{"json": <schema>}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSchema {
    /// The JSON Schema, preserved verbatim.
    pub json: Value,
}

// ---------------------------------------------------------------------------
// Assistant side
// ---------------------------------------------------------------------------

/// An assistant message in the backend format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssistantResponseMessage {
    /// Synthetic message identifier.
    pub message_id: String,
    /// Assistant text (thinking blocks re-wrapped in their tags).
    pub content: String,
    /// Tool invocations made in this turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_uses: Option<Vec<QToolUse>>,
}

impl AssistantResponseMessage {
    /// Create an assistant message with a fresh message id.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            content: content.into(),
            tool_uses: None,
        }
    }
}

/// One tool invocation recorded in an assistant history message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QToolUse {
    /// Tool-use identifier.
    pub tool_use_id: String,
    /// Tool name.
    pub name: String,
    /// Tool input, preserved verbatim.
    pub input: Value,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
