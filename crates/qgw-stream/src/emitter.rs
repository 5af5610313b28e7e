// SPDX-License-Identifier: MIT OR Apache-2.0
//! The streaming state machine: Amazon Q events in, Claude events out.
//!
//! One [`StreamEmitter`] lives for exactly one upstream request. Each call
//! to [`handle_event`](StreamEmitter::handle_event) returns the batch of
//! Claude events the input produced; [`finish`](StreamEmitter::finish)
//! closes the sequence when the upstream ends without an explicit
//! `assistantResponseEnd` and is a no-op after one.

use crate::quote::{QuoteState, find_real_tag, pending_tag_suffix};
use crate::tokens::SharedTokenCounter;
use qgw_claude::{
    ClaudeResponse, Delta, StartBlock, StreamEvent, THINKING_END_TAG, THINKING_START_TAG, Usage,
};
use qgw_eventstream::UpstreamEvent;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Which content block is currently open, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    None,
    Text,
    Thinking,
    ToolUse,
}

// ---------------------------------------------------------------------------
// StreamEmitter
// ---------------------------------------------------------------------------

/// Streaming emitter state for one response.
pub struct StreamEmitter {
    model: String,
    input_tokens: u32,
    conversation_id: Option<String>,
    token_counter: Option<SharedTokenCounter>,

    block_index: i32,
    open_block: OpenBlock,
    message_start_sent: bool,
    response_ended: bool,

    // Client-visible text, for output-token accounting.
    response_buffer: String,

    // Tool-use scratch.
    current_tool_use_id: Option<String>,
    tool_input_buffer: String,
    all_tool_inputs: String,
    has_tool_use: bool,

    // Thinking extraction.
    think_buffer: String,
    pending_start_tag_chars: usize,
    quote_state: QuoteState,
}

impl StreamEmitter {
    /// Create an emitter for one response.
    pub fn new(model: impl Into<String>, input_tokens: u32, conversation_id: Option<String>) -> Self {
        Self {
            model: model.into(),
            input_tokens,
            conversation_id,
            token_counter: None,
            block_index: -1,
            open_block: OpenBlock::None,
            message_start_sent: false,
            response_ended: false,
            response_buffer: String::new(),
            current_tool_use_id: None,
            tool_input_buffer: String::new(),
            all_tool_inputs: String::new(),
            has_tool_use: false,
            think_buffer: String::new(),
            pending_start_tag_chars: 0,
            quote_state: QuoteState::new(),
        }
    }

    /// Attach a token counter for output-usage reporting.
    #[must_use]
    pub fn with_token_counter(mut self, counter: SharedTokenCounter) -> Self {
        self.token_counter = Some(counter);
        self
    }

    /// Process one upstream event, returning the Claude events it yields.
    pub fn handle_event(&mut self, event: &UpstreamEvent) -> Vec<StreamEvent> {
        if self.response_ended {
            return Vec::new();
        }

        let mut out = Vec::new();
        match event.event_type.as_str() {
            "initial-response" => self.on_initial_response(&event.payload, &mut out),
            "assistantResponseEvent" => self.on_assistant_response(&event.payload, &mut out),
            "toolUseEvent" => self.on_tool_use(&event.payload, &mut out),
            "assistantResponseEnd" => self.on_response_end(&mut out),
            other => debug!(event_type = other, "ignoring unknown upstream event"),
        }
        out
    }

    /// Close the sequence if the upstream ended without an explicit end
    /// event. No-op once the response has ended.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.response_ended {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.on_response_end(&mut out);
        out
    }

    /// The conversation id in effect (set from the first
    /// `initial-response` when the payload carries one).
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    // -- event handlers ---------------------------------------------------

    fn on_initial_response(&mut self, payload: &Value, out: &mut Vec<StreamEvent>) {
        if self.message_start_sent {
            return;
        }
        let conv_id = payload
            .get("conversationId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.conversation_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.conversation_id = Some(conv_id.clone());
        out.push(StreamEvent::message_start(&conv_id, &self.model, self.input_tokens));
        self.message_start_sent = true;
        out.push(StreamEvent::ping());
    }

    fn on_assistant_response(&mut self, payload: &Value, out: &mut Vec<StreamEvent>) {
        // A text event while a tool block is open closes the tool block.
        if self.current_tool_use_id.is_some() {
            self.close_open_block(out);
            self.current_tool_use_id = None;
        }

        let content = payload.get("content").and_then(Value::as_str).unwrap_or("");
        if content.is_empty() {
            return;
        }
        self.think_buffer.push_str(content);
        self.drain_think_buffer(out);
    }

    fn on_tool_use(&mut self, payload: &Value, out: &mut Vec<StreamEvent>) {
        let tool_use_id = payload.get("toolUseId").and_then(Value::as_str);
        let name = payload.get("name").and_then(Value::as_str);
        let stop = payload.get("stop").and_then(Value::as_bool).unwrap_or(false);

        if self.current_tool_use_id.is_none()
            && let (Some(id), Some(name)) = (tool_use_id, name)
        {
            self.close_open_block(out);
            self.block_index += 1;
            out.push(StreamEvent::tool_use_start(self.index(), id, name));
            self.open_block = OpenBlock::ToolUse;
            self.current_tool_use_id = Some(id.to_string());
            self.tool_input_buffer.clear();
            self.has_tool_use = true;
        }

        if self.current_tool_use_id.is_some()
            && let Some(fragment) = input_fragment(payload.get("input"))
        {
            self.tool_input_buffer.push_str(&fragment);
            out.push(StreamEvent::input_json_delta(self.index(), fragment));
        }

        if stop && self.current_tool_use_id.is_some() {
            self.all_tool_inputs.push_str(&self.tool_input_buffer);
            self.tool_input_buffer.clear();
            self.close_open_block(out);
            self.current_tool_use_id = None;
        }
    }

    fn on_response_end(&mut self, out: &mut Vec<StreamEvent>) {
        self.close_open_block(out);
        self.response_ended = true;

        let output_tokens = self.count_output_tokens();
        let stop_reason = if self.has_tool_use { "tool_use" } else { "end_turn" };
        out.push(StreamEvent::message_delta(stop_reason, output_tokens));
        out.push(StreamEvent::message_stop());
    }

    // -- thinking extraction ----------------------------------------------

    fn drain_think_buffer(&mut self, out: &mut Vec<StreamEvent>) {
        while !self.think_buffer.is_empty() {
            if self.pending_start_tag_chars > 0 {
                if self.think_buffer.len() < self.pending_start_tag_chars {
                    self.pending_start_tag_chars -= self.think_buffer.len();
                    self.think_buffer.clear();
                    break;
                }
                let n = self.pending_start_tag_chars;
                drop_head(&mut self.think_buffer, n);
                self.pending_start_tag_chars = 0;
                continue;
            }

            if self.open_block == OpenBlock::Thinking {
                if !self.drain_inside_thinking(out) {
                    break;
                }
            } else if !self.drain_outside_thinking(out) {
                break;
            }
        }
    }

    /// Outer state: look for a real start tag. Returns false when the loop
    /// should wait for more input.
    fn drain_outside_thinking(&mut self, out: &mut Vec<StreamEvent>) -> bool {
        match find_real_tag(&self.think_buffer, THINKING_START_TAG, 0, &self.quote_state) {
            None => {
                let pending = pending_tag_suffix(&self.think_buffer, THINKING_START_TAG);
                if pending == self.think_buffer.len() && pending > 0 {
                    // The whole buffer may be a tag prefix: open the
                    // thinking block now and swallow the rest of the tag
                    // as it arrives.
                    self.close_open_block(out);
                    self.open_thinking_block(out);
                    self.quote_state.reset();
                    self.pending_start_tag_chars = THINKING_START_TAG.len() - pending;
                    self.think_buffer.clear();
                    return false;
                }
                let emit_len = self.think_buffer.len() - pending;
                if emit_len > 0 {
                    let chunk: String = self.think_buffer[..emit_len].to_string();
                    self.emit_text(&chunk, out);
                    drop_head(&mut self.think_buffer, emit_len);
                }
                // The retained suffix waits for the next chunk.
                false
            }
            Some(tag_at) => {
                if tag_at > 0 {
                    let before: String = self.think_buffer[..tag_at].to_string();
                    self.emit_text(&before, out);
                }
                drop_head(&mut self.think_buffer, tag_at + THINKING_START_TAG.len());
                self.quote_state.reset();
                self.close_open_block(out);
                self.open_thinking_block(out);
                true
            }
        }
    }

    /// Inner state: look for a real end tag. Returns false when the loop
    /// should wait for more input.
    fn drain_inside_thinking(&mut self, out: &mut Vec<StreamEvent>) -> bool {
        match find_real_tag(&self.think_buffer, THINKING_END_TAG, 0, &self.quote_state) {
            None => {
                let pending = pending_tag_suffix(&self.think_buffer, THINKING_END_TAG);
                let emit_len = self.think_buffer.len() - pending;
                if emit_len > 0 {
                    let chunk: String = self.think_buffer[..emit_len].to_string();
                    out.push(StreamEvent::thinking_delta(self.index(), chunk));
                    drop_head(&mut self.think_buffer, emit_len);
                }
                false
            }
            Some(tag_at) => {
                if tag_at > 0 {
                    let chunk: String = self.think_buffer[..tag_at].to_string();
                    out.push(StreamEvent::thinking_delta(self.index(), chunk));
                }
                drop_head(&mut self.think_buffer, tag_at + THINKING_END_TAG.len());
                self.close_open_block(out);
                true
            }
        }
    }

    // -- block bookkeeping ------------------------------------------------

    fn index(&self) -> u32 {
        self.block_index.max(0) as u32
    }

    fn close_open_block(&mut self, out: &mut Vec<StreamEvent>) {
        if self.open_block != OpenBlock::None {
            out.push(StreamEvent::block_stop(self.index()));
            self.open_block = OpenBlock::None;
        }
    }

    fn open_thinking_block(&mut self, out: &mut Vec<StreamEvent>) {
        self.block_index += 1;
        out.push(StreamEvent::thinking_block_start(self.index()));
        self.open_block = OpenBlock::Thinking;
    }

    /// Emit visible text, opening a text block when none is open. Text
    /// emitted to the client advances the persistent quote state; thinking
    /// text never does.
    fn emit_text(&mut self, text: &str, out: &mut Vec<StreamEvent>) {
        if text.is_empty() {
            return;
        }
        if self.open_block != OpenBlock::Text {
            self.close_open_block(out);
            self.block_index += 1;
            out.push(StreamEvent::text_block_start(self.index()));
            self.open_block = OpenBlock::Text;
        }
        self.response_buffer.push_str(text);
        out.push(StreamEvent::text_delta(self.index(), text));
        self.quote_state.update(text);
    }

    fn count_output_tokens(&self) -> u32 {
        match &self.token_counter {
            None => 0,
            Some(counter) => {
                counter.count_tokens(&self.response_buffer)
                    + counter.count_tokens(&self.all_tool_inputs)
            }
        }
    }
}

/// Serialize a tool-input field into the fragment to stream onward.
fn input_fragment(input: Option<&Value>) -> Option<String> {
    match input {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(other) => serde_json::to_string(other).ok(),
    }
}

/// Drop `n` bytes from the head of `buf`, rounding up to the next char
/// boundary (tag matches are ASCII, so rounding only ever triggers on
/// malformed interleavings).
fn drop_head(buf: &mut String, n: usize) {
    let mut cut = n.min(buf.len());
    while cut < buf.len() && !buf.is_char_boundary(cut) {
        cut += 1;
    }
    buf.drain(..cut);
}

// ---------------------------------------------------------------------------
// Non-streaming assembly
// ---------------------------------------------------------------------------

/// Fold an emitted event sequence into a complete (non-streaming) Claude
/// response.
pub fn assemble_response(events: &[StreamEvent], fallback_model: &str) -> ClaudeResponse {
    let mut response = ClaudeResponse {
        id: Uuid::new_v4().to_string(),
        kind: "message".into(),
        role: "assistant".into(),
        content: Vec::new(),
        model: fallback_model.to_string(),
        stop_reason: None,
        stop_sequence: None,
        usage: Usage::default(),
    };

    let mut open: Option<(StartBlock, String)> = None;

    for event in events {
        match event {
            StreamEvent::MessageStart { message } => {
                response.id = message.id.clone();
                response.model = message.model.clone();
                response.usage.input_tokens = message.usage.input_tokens;
            }
            StreamEvent::ContentBlockStart { content_block, .. } => {
                open = Some((content_block.clone(), String::new()));
            }
            StreamEvent::ContentBlockDelta { delta, .. } => {
                if let Some((_, buf)) = open.as_mut() {
                    match delta {
                        Delta::TextDelta { text } => buf.push_str(text),
                        Delta::ThinkingDelta { thinking } => buf.push_str(thinking),
                        Delta::InputJsonDelta { partial_json } => buf.push_str(partial_json),
                    }
                }
            }
            StreamEvent::ContentBlockStop { .. } => {
                if let Some((block, buf)) = open.take() {
                    response.content.push(finish_block(block, buf));
                }
            }
            StreamEvent::MessageDelta { delta, usage } => {
                response.stop_reason = delta.stop_reason.clone();
                response.usage.output_tokens = usage.output_tokens;
            }
            StreamEvent::Ping {} | StreamEvent::MessageStop {} => {}
        }
    }

    response
}

fn finish_block(block: StartBlock, buf: String) -> Value {
    match block {
        StartBlock::Text { .. } => serde_json::json!({"type": "text", "text": buf}),
        StartBlock::Thinking { .. } => serde_json::json!({"type": "thinking", "thinking": buf}),
        StartBlock::ToolUse { id, name, .. } => {
            let input: Value =
                serde_json::from_str(&buf).unwrap_or(Value::Object(serde_json::Map::new()));
            serde_json::json!({"type": "tool_use", "id": id, "name": name, "input": input})
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
