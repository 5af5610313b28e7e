// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content-block extraction shared by history construction and the
//! current-message path.

use qgw_amazonq::{QImage, QImageSource, QToolResult, QToolResultBlock, QToolResultStatus};
use qgw_claude::{
    ContentBlock, ImageSource, MessageContent, THINKING_END_TAG, THINKING_START_TAG,
    ToolResultContent, ToolResultStatus,
};
use serde_json::Value;

/// Fallback text for an empty tool result that did not fail.
pub(crate) const EMPTY_RESULT_OK: &str = "Command executed successfully";

/// Fallback text for an empty tool result that failed or was cancelled.
pub(crate) const EMPTY_RESULT_ERR: &str = "Tool use was cancelled by the user";

/// Re-wrap thinking text in the tags the backend expects.
pub(crate) fn wrap_thinking(text: &str) -> String {
    format!("{THINKING_START_TAG}{text}{THINKING_END_TAG}")
}

/// Flatten message content into text, newline-joining text blocks and
/// re-wrapping thinking blocks. Tool and image blocks contribute nothing.
pub(crate) fn extract_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(s) => s.clone(),
        MessageContent::Blocks(blocks) => {
            let mut parts = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => parts.push(text.clone()),
                    ContentBlock::Thinking { thinking, .. } => parts.push(wrap_thinking(thinking)),
                    _ => {}
                }
            }
            parts.join("\n")
        }
    }
}

/// Collect base64 image blocks into the backend image format.
pub(crate) fn extract_images(content: &MessageContent) -> Option<Vec<QImage>> {
    let MessageContent::Blocks(blocks) = content else {
        return None;
    };
    let images: Vec<QImage> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Image {
                source: ImageSource::Base64 { media_type, data },
            } => {
                let format = media_type
                    .rsplit_once('/')
                    .map_or_else(|| "png".to_string(), |(_, suffix)| suffix.to_string());
                Some(QImage {
                    format,
                    source: QImageSource { bytes: data.clone() },
                })
            }
            _ => None,
        })
        .collect();
    if images.is_empty() { None } else { Some(images) }
}

/// Fold one `tool_result` block into the accumulated result list.
///
/// Duplicate `toolUseId`s merge their content and escalate to `error` if
/// any instance errored. Empty content is replaced by a fallback message
/// chosen by the result's outcome.
pub(crate) fn push_tool_result(
    results: &mut Vec<QToolResult>,
    tool_use_id: &str,
    content: Option<&ToolResultContent>,
    status: Option<ToolResultStatus>,
    is_error: Option<bool>,
) {
    let mut blocks = match content {
        None => Vec::new(),
        Some(ToolResultContent::Text(s)) => vec![QToolResultBlock { text: s.clone() }],
        Some(ToolResultContent::Parts(parts)) => parts.iter().filter_map(part_text).collect(),
    };

    let errored = matches!(status, Some(ToolResultStatus::Error)) || is_error.unwrap_or(false);
    if !blocks.iter().any(|b| !b.text.trim().is_empty()) {
        let fallback = if errored { EMPTY_RESULT_ERR } else { EMPTY_RESULT_OK };
        blocks = vec![QToolResultBlock {
            text: fallback.to_string(),
        }];
    }

    let resolved = match status {
        Some(ToolResultStatus::Error) => QToolResultStatus::Error,
        Some(ToolResultStatus::Success) => QToolResultStatus::Success,
        None if is_error.unwrap_or(false) => QToolResultStatus::Error,
        None => QToolResultStatus::Success,
    };

    if let Some(existing) = results.iter_mut().find(|r| r.tool_use_id == tool_use_id) {
        existing.content.extend(blocks);
        if resolved == QToolResultStatus::Error {
            existing.status = QToolResultStatus::Error;
        }
    } else {
        results.push(QToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: blocks,
            status: resolved,
        });
    }
}

/// Text carried by one loosely typed tool-result part.
fn part_text(part: &Value) -> Option<QToolResultBlock> {
    let text = match part {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("text") {
                map.get("text").and_then(Value::as_str).unwrap_or("").to_string()
            } else {
                map.get("text").and_then(Value::as_str)?.to_string()
            }
        }
        _ => return None,
    };
    Some(QToolResultBlock { text })
}
