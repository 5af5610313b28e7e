// SPDX-License-Identifier: MIT OR Apache-2.0
//! Degenerate tool-call loop detection.
//!
//! The backend will happily keep answering the same tool call forever; the
//! guard refuses to forward a request whose recent history shows the same
//! tool invoked with the same input in consecutive assistant turns.

use qgw_claude::{ClaudeMessage, ContentBlock, Role};
use serde_json::Value;

/// Consecutive identical calls required to trip the guard.
pub(crate) const LOOP_THRESHOLD: u32 = 3;

/// Messages examined from the end of the conversation.
const LOOKBACK: usize = 10;

/// Serialize a JSON value with object keys sorted at every level, so
/// equality is independent of client key ordering.
pub(crate) fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Scan the last [`LOOKBACK`] messages for a run of identical assistant
/// tool calls. Any user message resets the run. Returns a description of
/// the loop when the run reaches `threshold`.
pub fn detect_tool_call_loop(messages: &[ClaudeMessage], threshold: u32) -> Option<String> {
    let start = messages.len().saturating_sub(LOOKBACK);
    let mut consecutive = 0u32;
    let mut last_call: Option<(String, String)> = None;

    for msg in &messages[start..] {
        match msg.role {
            Role::Assistant => {
                for block in msg.content_blocks() {
                    if let ContentBlock::ToolUse { name, input, .. } = block {
                        let call = (name.clone(), canonical_json(input));
                        if last_call.as_ref() == Some(&call) {
                            consecutive += 1;
                        } else {
                            consecutive = 1;
                            last_call = Some(call);
                        }
                    }
                }
            }
            Role::User => {
                consecutive = 0;
                last_call = None;
            }
        }
    }

    if consecutive >= threshold
        && let Some((name, _)) = last_call
    {
        return Some(format!(
            "tool '{name}' called {consecutive} times consecutively with the same input"
        ));
    }
    None
}
