// SPDX-License-Identifier: MIT OR Apache-2.0
//! Streaming-response Claude types: the SSE event sequence and its wire
//! framing, plus the assembled non-streaming response shape.
//!
//! Constructors mirror the event payloads of the Anthropic streaming API
//! exactly (null `stop_reason` in `message_start`, empty-object tool input
//! in `content_block_start`, and so on), so a transcript of
//! [`StreamEvent::to_sse`] outputs is a valid Claude SSE body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

/// Token usage reported with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of input tokens consumed.
    pub input_tokens: u32,
    /// Number of output tokens generated.
    pub output_tokens: u32,
}

// ---------------------------------------------------------------------------
// Stream events
// ---------------------------------------------------------------------------

/// One event in the Claude streaming sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Initial message metadata at stream start.
    MessageStart {
        /// The initial (empty-content) message object.
        message: MessageStartBody,
    },
    /// Keep-alive ping.
    Ping {},
    /// A new content block begins.
    ContentBlockStart {
        /// Zero-based block index.
        index: u32,
        /// The initial content block.
        content_block: StartBlock,
    },
    /// Incremental update to a content block.
    ContentBlockDelta {
        /// Index of the block being updated.
        index: u32,
        /// The incremental payload.
        delta: Delta,
    },
    /// A content block has finished.
    ContentBlockStop {
        /// Index of the completed block.
        index: u32,
    },
    /// Message-level metadata update (stop reason and usage).
    MessageDelta {
        /// The message-level delta.
        delta: MessageDelta,
        /// Output-token usage.
        usage: OutputUsage,
    },
    /// The message stream has ended.
    MessageStop {},
}

/// Message body carried by `message_start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageStartBody {
    /// Message identifier (the gateway uses the conversation id).
    pub id: String,
    /// Always `"message"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Always `"assistant"`.
    pub role: String,
    /// Initially empty content list.
    pub content: Vec<Value>,
    /// Model that is generating the response.
    pub model: String,
    /// Null until the message completes.
    pub stop_reason: Option<String>,
    /// Null until the message completes.
    pub stop_sequence: Option<String>,
    /// Usage snapshot (output tokens still zero).
    pub usage: Usage,
}

/// Initial content block carried by `content_block_start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartBlock {
    /// An (initially empty) text block.
    Text {
        /// Always the empty string at start.
        text: String,
    },
    /// An (initially empty) thinking block.
    Thinking {
        /// Always the empty string at start.
        thinking: String,
    },
    /// A tool-use block with its id and name.
    ToolUse {
        /// Tool-use identifier from the upstream event.
        id: String,
        /// Tool name.
        name: String,
        /// Always the empty object at start.
        input: Value,
    },
}

/// Incremental payload carried by `content_block_delta`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    /// Incremental visible text.
    TextDelta {
        /// The text fragment.
        text: String,
    },
    /// Incremental thinking text.
    ThinkingDelta {
        /// The thinking fragment.
        thinking: String,
    },
    /// Incremental JSON for a tool-use input.
    InputJsonDelta {
        /// Partial JSON string.
        partial_json: String,
    },
}

/// Message-level delta carried by `message_delta`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageDelta {
    /// Why the model stopped (`end_turn` or `tool_use` here).
    pub stop_reason: Option<String>,
    /// Always null for this gateway.
    pub stop_sequence: Option<String>,
}

/// Usage fragment carried by `message_delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputUsage {
    /// Output tokens generated so far.
    pub output_tokens: u32,
}

impl StreamEvent {
    /// Build a `message_start` event with zero output tokens.
    pub fn message_start(id: &str, model: &str, input_tokens: u32) -> Self {
        Self::MessageStart {
            message: MessageStartBody {
                id: id.to_string(),
                kind: "message".into(),
                role: "assistant".into(),
                content: Vec::new(),
                model: model.to_string(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage {
                    input_tokens,
                    output_tokens: 0,
                },
            },
        }
    }

    /// Build a keep-alive `ping`.
    pub fn ping() -> Self {
        Self::Ping {}
    }

    /// Build a `content_block_start` for an empty text block.
    pub fn text_block_start(index: u32) -> Self {
        Self::ContentBlockStart {
            index,
            content_block: StartBlock::Text {
                text: String::new(),
            },
        }
    }

    /// Build a `content_block_start` for an empty thinking block.
    pub fn thinking_block_start(index: u32) -> Self {
        Self::ContentBlockStart {
            index,
            content_block: StartBlock::Thinking {
                thinking: String::new(),
            },
        }
    }

    /// Build a `content_block_start` for a tool-use block.
    pub fn tool_use_start(index: u32, id: &str, name: &str) -> Self {
        Self::ContentBlockStart {
            index,
            content_block: StartBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: Value::Object(serde_json::Map::new()),
            },
        }
    }

    /// Build a text `content_block_delta`.
    pub fn text_delta(index: u32, text: impl Into<String>) -> Self {
        Self::ContentBlockDelta {
            index,
            delta: Delta::TextDelta { text: text.into() },
        }
    }

    /// Build a thinking `content_block_delta`.
    pub fn thinking_delta(index: u32, thinking: impl Into<String>) -> Self {
        Self::ContentBlockDelta {
            index,
            delta: Delta::ThinkingDelta {
                thinking: thinking.into(),
            },
        }
    }

    /// Build an `input_json_delta` for an open tool-use block.
    pub fn input_json_delta(index: u32, partial_json: impl Into<String>) -> Self {
        Self::ContentBlockDelta {
            index,
            delta: Delta::InputJsonDelta {
                partial_json: partial_json.into(),
            },
        }
    }

    /// Build a `content_block_stop`.
    pub fn block_stop(index: u32) -> Self {
        Self::ContentBlockStop { index }
    }

    /// Build a `message_delta` carrying the stop reason and output tokens.
    pub fn message_delta(stop_reason: &str, output_tokens: u32) -> Self {
        Self::MessageDelta {
            delta: MessageDelta {
                stop_reason: Some(stop_reason.to_string()),
                stop_sequence: None,
            },
            usage: OutputUsage { output_tokens },
        }
    }

    /// Build a `message_stop`.
    pub fn message_stop() -> Self {
        Self::MessageStop {}
    }

    /// The SSE event name for this event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::Ping {} => "ping",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop {} => "message_stop",
        }
    }

    /// Render this event as an SSE frame (`event: <name>\ndata: <json>\n\n`).
    pub fn to_sse(&self) -> String {
        // Serialisation of these shapes cannot fail; fall back to an empty
        // object rather than panicking mid-stream.
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".into());
        format!("event: {}\ndata: {}\n\n", self.event_name(), json)
    }
}

// ---------------------------------------------------------------------------
// ClaudeResponse (non-streaming)
// ---------------------------------------------------------------------------

/// A complete (non-streaming) Claude response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaudeResponse {
    /// Message identifier.
    pub id: String,
    /// Always `"message"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Always `"assistant"`.
    pub role: String,
    /// Content blocks in order.
    pub content: Vec<Value>,
    /// Model that generated the response.
    pub model: String,
    /// Why the model stopped.
    pub stop_reason: Option<String>,
    /// Stop sequence that fired, if any.
    pub stop_sequence: Option<String>,
    /// Token usage.
    pub usage: Usage,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
