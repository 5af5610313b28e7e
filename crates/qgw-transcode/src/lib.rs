// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod content;
pub mod guard;
pub mod history;
pub mod model;
pub mod tools;

pub use guard::detect_tool_call_loop;
pub use history::{process_history, reorder_tool_results, validate_alternation};
pub use model::{DEFAULT_MODEL, map_model_name};
pub use tools::{PairingAudit, audit_tool_pairing, convert_tool};

use content::{extract_images, push_tool_result, wrap_thinking};
use guard::LOOP_THRESHOLD;
use qgw_amazonq::{
    CHAT_TRIGGER_MANUAL, ConversationState, CurrentMessage, ORIGIN_KIRO_CLI, QPayload, QTool,
    QToolResult, UserInputMessage, UserInputMessageContext,
};
use qgw_claude::{ClaudeRequest, ClaudeTool, ContentBlock, MessageContent, Role, ThinkingConfig};
use qgw_error::GatewayError;
use tracing::info;
use uuid::Uuid;

/// Hint appended to user text when thinking mode is enabled.
pub const THINKING_HINT: &str =
    "<thinking_mode>interleaved</thinking_mode><max_thinking_length>16000</max_thinking_length>";

/// Append the thinking hint exactly once.
///
/// Idempotent: text already ending in the hint (modulo trailing
/// whitespace) is returned unchanged. A newline separates the hint from
/// preceding text unless the text is already line-terminated.
pub fn append_thinking_hint(text: &str) -> String {
    if text.trim_end().ends_with(THINKING_HINT) {
        return text.to_string();
    }
    if text.is_empty() {
        return THINKING_HINT.to_string();
    }
    let separator = if text.ends_with('\n') || text.ends_with('\r') {
        ""
    } else {
        "\n"
    };
    format!("{text}{separator}{THINKING_HINT}")
}

/// Current local time in the backend's context-entry format:
/// weekday, then ISO-8601 with millisecond precision and local offset.
pub fn current_timestamp() -> String {
    let now = chrono::Local::now();
    format!(
        "{}, {}",
        now.format("%A"),
        now.format("%Y-%m-%dT%H:%M:%S%.3f%:z")
    )
}

/// Build the Q payload for a Claude request.
///
/// Fails with [`GatewayError::LoopDetected`] when the recent history shows
/// a degenerate tool-call loop and with [`GatewayError::MalformedHistory`]
/// when the assembled history does not alternate (a transcoder bug).
pub fn convert_request(
    req: &ClaudeRequest,
    conversation_id: Option<Uuid>,
) -> Result<QPayload, GatewayError> {
    let conversation_id = conversation_id.unwrap_or_else(Uuid::new_v4).to_string();

    if let Some(reason) = guard::detect_tool_call_loop(&req.messages, LOOP_THRESHOLD) {
        return Err(GatewayError::LoopDetected(reason));
    }

    let mut thinking_enabled = req
        .thinking
        .as_ref()
        .is_some_and(ThinkingConfig::is_enabled);

    let (model_id, model_requests_thinking) = model::map_model_name(&req.model);
    if model_requests_thinking && !thinking_enabled {
        thinking_enabled = true;
        info!("enabling thinking mode from model suffix");
    }
    info!(
        requested = %model::sanitize_model_name(&req.model),
        mapped = %model_id,
        "model mapping"
    );

    let audit = tools::audit_tool_pairing(&req.messages, req.tools.as_deref());

    let mut aq_tools: Vec<QTool> = Vec::new();
    let mut long_desc_tools: Vec<(&str, &str)> = Vec::new();
    for tool in req.tools.iter().flatten() {
        if let Some(desc) = over_limit_description(tool) {
            long_desc_tools.push((&tool.name, desc));
        }
        aq_tools.push(tools::convert_tool(tool));
    }
    aq_tools.extend(audit.placeholder_tools);

    // Current message: the last Claude user message.
    let last = req.messages.last();
    let mut prompt_content = String::new();
    let mut tool_results: Vec<QToolResult> = Vec::new();
    let mut has_tool_result = false;
    let mut images = None;

    if let Some(msg) = last
        && msg.role == Role::User
    {
        images = extract_images(&msg.content);
        match &msg.content {
            MessageContent::Text(s) => prompt_content = s.clone(),
            MessageContent::Blocks(blocks) => {
                let mut text_parts: Vec<String> = Vec::new();
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
                        } => {
                            has_tool_result = true;
                            push_tool_result(
                                &mut tool_results,
                                tool_use_id,
                                content.as_ref(),
                                *status,
                                *is_error,
                            );
                        }
                        _ => {}
                    }
                }
                prompt_content = text_parts.join("\n");
            }
        }
    }

    // Reorder against the immediately preceding assistant's tool_use order.
    if !tool_results.is_empty() {
        let order = preceding_tool_use_order(req);
        if !order.is_empty() {
            tool_results = history::reorder_tool_results(tool_results, &order);
            info!(count = tool_results.len(), "reordered current-message tool results");
        }
    }

    let formatted_content = format_current_content(
        &prompt_content,
        has_tool_result,
        req,
        &long_desc_tools,
        thinking_enabled,
    );

    let history_msgs = if req.messages.len() > 1 {
        &req.messages[..req.messages.len() - 1]
    } else {
        &[]
    };
    let aq_history = history::process_history(history_msgs, thinking_enabled);
    history::validate_alternation(&aq_history)?;

    let user_input_message = UserInputMessage {
        content: formatted_content,
        user_input_message_context: UserInputMessageContext {
            env_state: Default::default(),
            tools: if aq_tools.is_empty() {
                None
            } else {
                Some(aq_tools)
            },
            tool_results: if tool_results.is_empty() {
                None
            } else {
                Some(tool_results)
            },
        },
        origin: ORIGIN_KIRO_CLI.into(),
        model_id: Some(model_id),
        images,
    };

    Ok(QPayload {
        conversation_state: ConversationState {
            conversation_id,
            history: aq_history,
            current_message: CurrentMessage { user_input_message },
            chat_trigger_type: CHAT_TRIGGER_MANUAL.into(),
        },
    })
}

/// The full description of a tool whose spec will be truncated, if any.
fn over_limit_description(tool: &ClaudeTool) -> Option<&str> {
    tool.description
        .as_deref()
        .filter(|d| d.chars().count() > tools::DESC_LIMIT)
}

/// Tool-use ids of the last assistant message before the current one, in
/// emission order.
fn preceding_tool_use_order(req: &ClaudeRequest) -> Vec<String> {
    if req.messages.len() < 2 {
        return Vec::new();
    }
    for msg in req.messages[..req.messages.len() - 1].iter().rev() {
        if msg.role == Role::Assistant {
            return msg
                .content_blocks()
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { id, .. } => Some(id.clone()),
                    _ => None,
                })
                .collect();
        }
    }
    Vec::new()
}

/// Assemble the framed sections of the current message.
///
/// Section order: tool documentation, system prompt, context entry, user
/// message. A current message consisting solely of tool results suppresses
/// everything but the tool documentation. The thinking hint, when enabled,
/// lands once at the very end, outside all framed sections.
fn format_current_content(
    prompt_content: &str,
    has_tool_result: bool,
    req: &ClaudeRequest,
    long_desc_tools: &[(&str, &str)],
    thinking_enabled: bool,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !long_desc_tools.is_empty() {
        let docs: String = long_desc_tools
            .iter()
            .map(|(name, desc)| format!("Tool: {name}\nFull Description:\n{desc}\n"))
            .collect();
        sections.push(format!(
            "--- TOOL DOCUMENTATION BEGIN ---\n{docs}--- TOOL DOCUMENTATION END ---"
        ));
    }

    let only_tool_results = has_tool_result && prompt_content.is_empty();
    if !only_tool_results {
        if let Some(system) = &req.system {
            let sys_text = system.flatten();
            if !sys_text.is_empty() {
                sections.push(format!(
                    "--- SYSTEM PROMPT BEGIN ---\n{sys_text}\n--- SYSTEM PROMPT END ---"
                ));
            }
        }
        sections.push(format!(
            "--- CONTEXT ENTRY BEGIN ---\nCurrent time: {}\n--- CONTEXT ENTRY END ---",
            current_timestamp()
        ));
        sections.push(format!(
            "--- USER MESSAGE BEGIN ---\n{prompt_content}\n--- USER MESSAGE END ---"
        ));
    }

    let mut formatted = sections.join("\n\n");
    if thinking_enabled {
        formatted = append_thinking_hint(&formatted);
    }
    formatted
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
