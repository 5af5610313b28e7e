// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod request;
pub mod stream;

/// Tag opening an inline thinking span in assistant text.
pub const THINKING_START_TAG: &str = "<thinking>";

/// Tag closing an inline thinking span in assistant text.
pub const THINKING_END_TAG: &str = "</thinking>";

pub use request::{
    ClaudeMessage, ClaudeRequest, ClaudeTool, ContentBlock, ImageSource, MessageContent, Role,
    SystemBlock, SystemPrompt, ThinkingConfig, ToolResultContent, ToolResultStatus,
};
pub use stream::{
    ClaudeResponse, Delta, MessageDelta, MessageStartBody, OutputUsage, StartBlock, StreamEvent,
    Usage,
};
