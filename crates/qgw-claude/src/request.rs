// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request-side Claude Messages API types.
//!
//! These mirror the subset of the Anthropic Messages API the gateway
//! transcodes: roles, content blocks (text / thinking / image / tool_use /
//! tool_result), tool definitions, and the thinking configuration in its
//! three accepted shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// ClaudeRequest
// ---------------------------------------------------------------------------

/// A Claude chat-completions request as accepted by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeRequest {
    /// Model identifier (short, dated, or `-thinking`-suffixed).
    pub model: String,
    /// Conversation messages, oldest first.
    pub messages: Vec<ClaudeMessage>,
    /// Maximum tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Tool definitions available to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ClaudeTool>>,
    /// Whether the client wants an SSE response.
    #[serde(default)]
    pub stream: bool,
    /// System prompt (plain string or text blocks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    /// Extended-thinking configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

fn default_max_tokens() -> u32 {
    4096
}

// ---------------------------------------------------------------------------
// Messages and content blocks
// ---------------------------------------------------------------------------

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user turn (may carry tool results).
    User,
    /// Assistant turn (may carry tool uses).
    Assistant,
}

/// A single message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessage {
    /// Message role.
    pub role: Role,
    /// Plain text or a sequence of content blocks.
    pub content: MessageContent,
}

impl ClaudeMessage {
    /// Convenience constructor for a plain-text message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Convenience constructor for a block-list message.
    pub fn blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// The message's blocks, or an empty slice for plain-text content.
    pub fn content_blocks(&self) -> &[ContentBlock] {
        match &self.content {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        }
    }
}

/// Message content: a bare string or a block list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Structured content blocks.
    Blocks(Vec<ContentBlock>),
}

/// One content block inside a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// A text block.
    Text {
        /// The text content.
        text: String,
    },
    /// An extended-thinking block.
    Thinking {
        /// The model's reasoning text.
        thinking: String,
        /// Signature attached by the producing API, carried opaquely.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// An image block (user messages only).
    Image {
        /// The image source data.
        source: ImageSource,
    },
    /// A tool invocation (assistant messages only).
    ToolUse {
        /// Unique tool-use identifier.
        id: String,
        /// Name of the tool to invoke.
        name: String,
        /// JSON input for the tool, preserved verbatim.
        #[serde(default = "default_tool_input")]
        input: Value,
    },
    /// A tool result (user messages only).
    ToolResult {
        /// ID of the tool use this result answers.
        tool_use_id: String,
        /// Result content: a string or a loose block list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<ToolResultContent>,
        /// Explicit outcome, when the client sets one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ToolResultStatus>,
        /// Legacy error flag; consulted only when `status` is absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Any block type this gateway does not transcode.
    #[serde(other)]
    Unknown,
}

fn default_tool_input() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Image source for an image content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Base64-encoded image data.
    Base64 {
        /// MIME type (e.g. `image/png`).
        media_type: String,
        /// Base64-encoded image bytes.
        data: String,
    },
}

/// Tool-result content: clients send either a bare string or a loosely
/// typed list of parts (text blocks, `{"text": …}` objects, bare strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    /// A bare string.
    Text(String),
    /// A list of loosely typed parts.
    Parts(Vec<Value>),
}

/// Explicit tool-result outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    /// The tool ran to completion.
    Success,
    /// The tool failed or was cancelled.
    Error,
}

// ---------------------------------------------------------------------------
// System prompt
// ---------------------------------------------------------------------------

/// System prompt: a plain string or a sequence of text blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    /// A bare string.
    Text(String),
    /// A list of text blocks.
    Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// Flatten the system prompt into one newline-joined string.
    pub fn flatten(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .map(|b| match b {
                    SystemBlock::Text { text } => text.as_str(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// One block of a block-list system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemBlock {
    /// A text system-prompt block.
    Text {
        /// The system prompt text.
        text: String,
    },
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// A tool definition in the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeTool {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// Variant tag; web-search tools carry e.g. `web_search_20250305`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    /// Use cap for the web-search variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
}

impl ClaudeTool {
    /// Returns `true` for the server-side web-search tool variant.
    pub fn is_web_search(&self) -> bool {
        self.tool_type
            .as_deref()
            .is_some_and(|t| t.starts_with("web_search"))
    }
}

// ---------------------------------------------------------------------------
// Thinking configuration
// ---------------------------------------------------------------------------

/// Extended-thinking configuration in its three accepted wire shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThinkingConfig {
    /// `"thinking": true`
    Flag(bool),
    /// `"thinking": "enabled"`
    Mode(String),
    /// `"thinking": {"type": "enabled", "budget_tokens": 16000}`
    Config {
        /// `type` discriminator, e.g. `"enabled"`.
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        /// Explicit boolean switch.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
        /// Thinking token budget; any positive value enables.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        budget_tokens: Option<f64>,
    },
}

impl ThinkingConfig {
    /// Whether this configuration turns thinking mode on.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Flag(b) => *b,
            Self::Mode(s) => s.eq_ignore_ascii_case("enabled"),
            Self::Config {
                kind,
                enabled,
                budget_tokens,
            } => {
                if kind.as_deref().is_some_and(|k| k.eq_ignore_ascii_case("enabled")) {
                    return true;
                }
                if let Some(flag) = enabled {
                    return *flag;
                }
                budget_tokens.is_some_and(|b| b > 0.0)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
