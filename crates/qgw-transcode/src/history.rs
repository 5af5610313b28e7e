// SPDX-License-Identifier: MIT OR Apache-2.0
//! Two-pass history normalization.
//!
//! Pass 1 converts each Claude message to the backend shape, tracking
//! tool-use emission order so the following user message's tool results
//! can be reordered to match. Pass 2 enforces role alternation: histories
//! that already alternate are kept as-is, otherwise consecutive user
//! messages are merged. A user message carrying tool results always
//! flushes pending merges first so tool-result adjacency survives.

use crate::content::{extract_images, extract_text, push_tool_result, wrap_thinking};
use crate::{THINKING_HINT, append_thinking_hint};
use qgw_amazonq::{
    AssistantResponseMessage, HistoryEntry, ORIGIN_KIRO_CLI, QImage, QToolResult, QToolUse,
    UserInputMessage, UserInputMessageContext,
};
use qgw_claude::{ClaudeMessage, ContentBlock, MessageContent, Role};
use qgw_error::GatewayError;
use std::collections::HashSet;
use tracing::{debug, info};

/// Reorder `tool_results` to match the emission order of the preceding
/// assistant message's tool uses. Results whose id is not in the order
/// list keep their relative position at the tail.
pub fn reorder_tool_results(results: Vec<QToolResult>, order: &[String]) -> Vec<QToolResult> {
    if order.is_empty() || results.is_empty() {
        return results;
    }

    let mut remaining = results;
    let mut ordered = Vec::with_capacity(remaining.len());
    for id in order {
        if let Some(pos) = remaining.iter().position(|r| &r.tool_use_id == id) {
            ordered.push(remaining.remove(pos));
        }
    }
    ordered.extend(remaining);
    ordered
}

/// Convert history messages (everything except the current one) into the
/// backend's alternating form.
pub fn process_history(messages: &[ClaudeMessage], thinking_enabled: bool) -> Vec<HistoryEntry> {
    let mut raw: Vec<HistoryEntry> = Vec::new();
    let mut seen_tool_use_ids: HashSet<String> = HashSet::new();
    let mut last_tool_use_order: Vec<String> = Vec::new();

    // Pass 1: per-message conversion.
    for msg in messages {
        match msg.role {
            Role::User => {
                let images = extract_images(&msg.content);
                let mut text_parts: Vec<String> = Vec::new();
                let mut tool_results: Vec<QToolResult> = Vec::new();

                match &msg.content {
                    MessageContent::Text(s) => text_parts.push(s.clone()),
                    MessageContent::Blocks(blocks) => {
                        for block in blocks {
                            match block {
                                ContentBlock::Text { text } => text_parts.push(text.clone()),
                                ContentBlock::Thinking { thinking, .. } => {
                                    text_parts.push(wrap_thinking(thinking));
                                }
                                ContentBlock::ToolResult {
                                    tool_use_id,
                                    content,
                                    status,
                                    is_error,
                                } => push_tool_result(
                                    &mut tool_results,
                                    tool_use_id,
                                    content.as_ref(),
                                    *status,
                                    *is_error,
                                ),
                                _ => {}
                            }
                        }
                    }
                }

                let mut text = text_parts.join("\n");
                if thinking_enabled {
                    text = append_thinking_hint(&text);
                }

                if !tool_results.is_empty() && !last_tool_use_order.is_empty() {
                    tool_results = reorder_tool_results(tool_results, &last_tool_use_order);
                    info!(count = tool_results.len(), "reordered tool results to match tool-use order");
                }

                raw.push(HistoryEntry::User(UserInputMessage {
                    content: text,
                    user_input_message_context: UserInputMessageContext {
                        env_state: Default::default(),
                        tools: None,
                        tool_results: if tool_results.is_empty() {
                            None
                        } else {
                            Some(tool_results)
                        },
                    },
                    origin: ORIGIN_KIRO_CLI.into(),
                    model_id: None,
                    images,
                }));
            }
            Role::Assistant => {
                let text = extract_text(&msg.content);
                let mut entry = AssistantResponseMessage::new(text);

                last_tool_use_order.clear();
                let mut tool_uses = Vec::new();
                for block in msg.content_blocks() {
                    if let ContentBlock::ToolUse { id, name, input } = block
                        && !seen_tool_use_ids.contains(id)
                    {
                        seen_tool_use_ids.insert(id.clone());
                        last_tool_use_order.push(id.clone());
                        tool_uses.push(QToolUse {
                            tool_use_id: id.clone(),
                            name: name.clone(),
                            input: input.clone(),
                        });
                    }
                }
                if !tool_uses.is_empty() {
                    entry.tool_uses = Some(tool_uses);
                }

                raw.push(HistoryEntry::Assistant(entry));
            }
        }
    }

    // Fast path: already alternating.
    if !has_consecutive_same_role(&raw) {
        debug!("history already alternates, skipping merge");
        return raw;
    }

    // Pass 2: merge runs of consecutive user messages.
    info!("consecutive same-role messages detected, merging");
    let mut history: Vec<HistoryEntry> = Vec::new();
    let mut pending: Vec<UserInputMessage> = Vec::new();

    for entry in raw {
        match entry {
            HistoryEntry::User(user) => {
                let has_results = user
                    .user_input_message_context
                    .tool_results
                    .as_ref()
                    .is_some_and(|r| !r.is_empty());
                if has_results {
                    // Flush first so tool results stay adjacent to the
                    // assistant message they answer.
                    flush_pending(&mut pending, &mut history);
                    history.push(HistoryEntry::User(user));
                } else {
                    pending.push(user);
                }
            }
            HistoryEntry::Assistant(asst) => {
                flush_pending(&mut pending, &mut history);
                history.push(HistoryEntry::Assistant(asst));
            }
        }
    }
    flush_pending(&mut pending, &mut history);

    history
}

fn flush_pending(pending: &mut Vec<UserInputMessage>, history: &mut Vec<HistoryEntry>) {
    if !pending.is_empty() {
        let merged = merge_user_messages(std::mem::take(pending));
        history.push(HistoryEntry::User(merged));
    }
}

fn has_consecutive_same_role(entries: &[HistoryEntry]) -> bool {
    entries
        .windows(2)
        .any(|w| matches!(w, [HistoryEntry::User(_), HistoryEntry::User(_)] | [HistoryEntry::Assistant(_), HistoryEntry::Assistant(_)]))
}

/// Merge consecutive user messages into one.
///
/// Text contents are joined by blank lines with the thinking hint stripped
/// from each source and re-appended once iff any source carried it. Tool
/// results union in source order. Only the images of the last two
/// image-carrying sources survive.
pub fn merge_user_messages(messages: Vec<UserInputMessage>) -> UserInputMessage {
    let mut contents: Vec<String> = Vec::new();
    let mut had_hint = false;
    let mut all_tool_results: Vec<QToolResult> = Vec::new();
    let mut image_groups: Vec<Vec<QImage>> = Vec::new();
    let mut base_context: Option<UserInputMessageContext> = None;
    let mut base_origin: Option<String> = None;
    let mut base_model: Option<String> = None;

    for mut msg in messages {
        if let Some(results) = msg.user_input_message_context.tool_results.take() {
            all_tool_results.extend(results);
        }
        if base_context.is_none() {
            base_context = Some(msg.user_input_message_context);
        }
        if base_origin.is_none() {
            base_origin = Some(msg.origin);
        }
        if base_model.is_none() {
            base_model = msg.model_id;
        }

        if msg.content.contains(THINKING_HINT) {
            had_hint = true;
        }
        let cleaned = msg.content.replace(THINKING_HINT, "");
        let cleaned = cleaned.trim();
        if !cleaned.is_empty() {
            contents.push(cleaned.to_string());
        }

        if let Some(images) = msg.images
            && !images.is_empty()
        {
            image_groups.push(images);
        }
    }

    let mut merged_content = contents.join("\n\n");
    if had_hint {
        merged_content = append_thinking_hint(&merged_content);
    }

    let mut context = base_context.unwrap_or_default();
    if !all_tool_results.is_empty() {
        context.tool_results = Some(all_tool_results);
    }

    let kept_images: Vec<QImage> = image_groups
        .into_iter()
        .rev()
        .take(2)
        .rev()
        .flatten()
        .collect();

    UserInputMessage {
        content: merged_content,
        user_input_message_context: context,
        origin: base_origin.unwrap_or_else(|| ORIGIN_KIRO_CLI.into()),
        model_id: base_model,
        images: if kept_images.is_empty() {
            None
        } else {
            Some(kept_images)
        },
    }
}

/// Post-assembly invariant: two consecutive entries of the same role are a
/// transcoder bug.
pub fn validate_alternation(history: &[HistoryEntry]) -> Result<(), GatewayError> {
    let mut prev: Option<&'static str> = None;
    for (idx, entry) in history.iter().enumerate() {
        let role = match entry {
            HistoryEntry::User(_) => "user",
            HistoryEntry::Assistant(_) => "assistant",
        };
        if prev == Some(role) {
            return Err(GatewayError::MalformedHistory(format!(
                "message {idx} violates alternation: consecutive {role} messages"
            )));
        }
        prev = Some(role);
    }
    Ok(())
}
