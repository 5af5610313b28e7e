// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tool conversion, pairing audit, and placeholder synthesis.

use qgw_claude::{ClaudeMessage, ClaudeTool, ContentBlock, Role};
use qgw_amazonq::{InputSchema, QTool, ToolSpecification};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Descriptions longer than this are truncated in the tool spec.
pub(crate) const DESC_LIMIT: usize = 10240;

/// Characters kept when a description is truncated.
const DESC_KEEP: usize = 10100;

/// Convert one Claude tool into the backend format.
///
/// Web-search tools pass through by type tag; regular tools become a
/// `toolSpecification`. An over-long description is truncated with a
/// pointer to the TOOL DOCUMENTATION prelude section, where the full text
/// is carried instead.
pub fn convert_tool(tool: &ClaudeTool) -> QTool {
    if tool.is_web_search() {
        return QTool::WebSearch {
            tool_type: tool.tool_type.clone().unwrap_or_default(),
            name: tool.name.clone(),
            max_uses: tool.max_uses,
        };
    }

    let mut description = tool.description.clone().unwrap_or_default();
    if description.chars().count() > DESC_LIMIT {
        description = description.chars().take(DESC_KEEP).collect();
        description.push_str("\n\n...(Full description provided in TOOL DOCUMENTATION section)");
    }

    QTool::Spec {
        tool_specification: ToolSpecification {
            name: tool.name.clone(),
            description,
            input_schema: InputSchema {
                json: tool.input_schema.clone().unwrap_or(Value::Null),
            },
        },
    }
}

/// Outcome of the tool-use/tool-result pairing audit.
#[derive(Debug, Default)]
pub struct PairingAudit {
    /// Assistant `tool_use` ids never answered by a `tool_result`.
    pub orphan_tool_use_ids: BTreeSet<String>,
    /// User `tool_result` ids with no matching `tool_use`.
    pub orphan_tool_result_ids: BTreeSet<String>,
    /// Auto-synthesized specs for tool names used in history but absent
    /// from the current tool list.
    pub placeholder_tools: Vec<QTool>,
}

/// Audit pairing across the whole message list.
///
/// Orphans in either direction are logged but tolerated; missing tool
/// definitions get placeholder specs so the backend schema stays
/// consistent with the history.
pub fn audit_tool_pairing(messages: &[ClaudeMessage], tools: Option<&[ClaudeTool]>) -> PairingAudit {
    let mut tool_use_ids = BTreeSet::new();
    let mut tool_use_names: BTreeMap<String, String> = BTreeMap::new();
    let mut tool_result_ids = BTreeSet::new();

    let defined: BTreeSet<&str> = tools
        .unwrap_or_default()
        .iter()
        .map(|t| t.name.as_str())
        .collect();

    for msg in messages {
        for block in msg.content_blocks() {
            match (msg.role, block) {
                (Role::Assistant, ContentBlock::ToolUse { id, name, .. }) => {
                    tool_use_ids.insert(id.clone());
                    tool_use_names.insert(id.clone(), name.clone());
                }
                (Role::User, ContentBlock::ToolResult { tool_use_id, .. }) => {
                    tool_result_ids.insert(tool_use_id.clone());
                }
                _ => {}
            }
        }
    }

    let orphan_tool_use_ids: BTreeSet<String> =
        tool_use_ids.difference(&tool_result_ids).cloned().collect();
    let orphan_tool_result_ids: BTreeSet<String> =
        tool_result_ids.difference(&tool_use_ids).cloned().collect();

    if !orphan_tool_use_ids.is_empty() {
        warn!(ids = ?orphan_tool_use_ids, "orphan tool_use without results");
    }
    if !orphan_tool_result_ids.is_empty() {
        warn!(ids = ?orphan_tool_result_ids, "orphan tool_result without uses");
    }

    let used_names: BTreeSet<&str> = tool_use_names.values().map(String::as_str).collect();
    let placeholder_tools = used_names
        .difference(&defined)
        .map(|name| {
            info!(tool = name, "generating placeholder tool definition");
            QTool::Spec {
                tool_specification: ToolSpecification {
                    name: (*name).to_string(),
                    description: format!(
                        "[Auto-generated placeholder] Tool '{name}' was used in conversation \
                         history but not defined in current request."
                    ),
                    input_schema: InputSchema {
                        json: json!({"type": "object", "properties": {}}),
                    },
                },
            }
        })
        .collect();

    PairingAudit {
        orphan_tool_use_ids,
        orphan_tool_result_ids,
        placeholder_tools,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qgw_claude::MessageContent;
    use serde_json::json;

    fn msg(role: &str, content: Value) -> ClaudeMessage {
        serde_json::from_value(json!({"role": role, "content": content})).unwrap()
    }

    fn tool(name: &str) -> ClaudeTool {
        ClaudeTool {
            name: name.into(),
            description: Some(format!("The {name} tool")),
            input_schema: Some(json!({"type": "object"})),
            tool_type: None,
            max_uses: None,
        }
    }

    #[test]
    fn regular_tool_becomes_specification() {
        let q = convert_tool(&tool("grep"));
        match q {
            QTool::Spec { tool_specification } => {
                assert_eq!(tool_specification.name, "grep");
                assert_eq!(tool_specification.input_schema.json["type"], "object");
            }
            other => panic!("expected Spec, got {other:?}"),
        }
    }

    #[test]
    fn web_search_passes_through() {
        let ws = ClaudeTool {
            name: "web_search".into(),
            description: None,
            input_schema: None,
            tool_type: Some("web_search_20250305".into()),
            max_uses: Some(8),
        };
        match convert_tool(&ws) {
            QTool::WebSearch {
                tool_type,
                name,
                max_uses,
            } => {
                assert_eq!(tool_type, "web_search_20250305");
                assert_eq!(name, "web_search");
                assert_eq!(max_uses, Some(8));
            }
            other => panic!("expected WebSearch, got {other:?}"),
        }
    }

    #[test]
    fn long_description_is_truncated_with_pointer() {
        let mut t = tool("verbose");
        t.description = Some("d".repeat(20_000));
        match convert_tool(&t) {
            QTool::Spec { tool_specification } => {
                let desc = tool_specification.description;
                assert!(desc.chars().count() < 10_200);
                assert!(desc.contains("TOOL DOCUMENTATION"));
            }
            other => panic!("expected Spec, got {other:?}"),
        }
    }

    #[test]
    fn missing_schema_serializes_as_null() {
        let mut t = tool("bare");
        t.input_schema = None;
        match convert_tool(&t) {
            QTool::Spec { tool_specification } => {
                assert_eq!(tool_specification.input_schema.json, Value::Null);
            }
            other => panic!("expected Spec, got {other:?}"),
        }
    }

    #[test]
    fn audit_finds_orphans_both_ways() {
        let messages = vec![
            msg(
                "assistant",
                json!([{"type": "tool_use", "id": "tu_answered", "name": "grep", "input": {}},
                       {"type": "tool_use", "id": "tu_orphan", "name": "grep", "input": {}}]),
            ),
            msg(
                "user",
                json!([{"type": "tool_result", "tool_use_id": "tu_answered", "content": "hit"},
                       {"type": "tool_result", "tool_use_id": "tu_stray", "content": "??"}]),
            ),
        ];
        let audit = audit_tool_pairing(&messages, Some(&[tool("grep")]));
        assert!(audit.orphan_tool_use_ids.contains("tu_orphan"));
        assert!(!audit.orphan_tool_use_ids.contains("tu_answered"));
        assert!(audit.orphan_tool_result_ids.contains("tu_stray"));
        assert!(audit.placeholder_tools.is_empty());
    }

    #[test]
    fn undefined_tools_get_placeholders() {
        let messages = vec![msg(
            "assistant",
            json!([{"type": "tool_use", "id": "tu_1", "name": "forgotten_tool", "input": {}}]),
        )];
        let audit = audit_tool_pairing(&messages, None);
        assert_eq!(audit.placeholder_tools.len(), 1);
        match &audit.placeholder_tools[0] {
            QTool::Spec { tool_specification } => {
                assert_eq!(tool_specification.name, "forgotten_tool");
                assert!(tool_specification.description.contains("placeholder"));
                assert_eq!(
                    tool_specification.input_schema.json,
                    json!({"type": "object", "properties": {}})
                );
            }
            other => panic!("expected Spec, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_messages_are_ignored() {
        let messages = vec![
            ClaudeMessage {
                role: Role::User,
                content: MessageContent::Text("hello".into()),
            },
            ClaudeMessage {
                role: Role::Assistant,
                content: MessageContent::Text("hi".into()),
            },
        ];
        let audit = audit_tool_pairing(&messages, None);
        assert!(audit.orphan_tool_use_ids.is_empty());
        assert!(audit.orphan_tool_result_ids.is_empty());
        assert!(audit.placeholder_tools.is_empty());
    }
}
