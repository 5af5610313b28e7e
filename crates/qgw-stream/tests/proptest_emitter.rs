// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property tests: however the upstream text is chunked, the emitted
//! text deltas reassemble to the input with real thinking spans removed,
//! the thinking deltas reassemble to the spans' interiors, and the event
//! sequence stays well formed.

use proptest::prelude::*;
use qgw_claude::{Delta, StreamEvent};
use qgw_eventstream::UpstreamEvent;
use qgw_stream::StreamEmitter;
use serde_json::json;

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Thinking(String),
}

fn segment() -> impl Strategy<Value = Segment> {
    // Quote characters and '<' are exercised by the unit tests; here the
    // interesting dimension is chunk boundaries slicing through tags.
    let body = "[a-z ]{0,24}";
    prop_oneof![
        body.prop_map(Segment::Text),
        body.prop_map(Segment::Thinking),
    ]
}

fn render(segments: &[Segment]) -> (String, String, String) {
    let mut full = String::new();
    let mut expected_text = String::new();
    let mut expected_thinking = String::new();
    for seg in segments {
        match seg {
            Segment::Text(s) => {
                full.push_str(s);
                expected_text.push_str(s);
            }
            Segment::Thinking(s) => {
                full.push_str("<thinking>");
                full.push_str(s);
                full.push_str("</thinking>");
                expected_thinking.push_str(s);
            }
        }
    }
    (full, expected_text, expected_thinking)
}

fn run_chunked(full: &str, sizes: &[usize]) -> Vec<StreamEvent> {
    let mut emitter = StreamEmitter::new("claude-sonnet-4.5", 0, None);
    let mut out = emitter.handle_event(&UpstreamEvent::new(
        "initial-response",
        json!({"conversationId": "c-prop"}),
    ));
    let bytes = full.as_bytes();
    let mut offset = 0;
    let mut i = 0;
    while offset < bytes.len() {
        let size = sizes[i % sizes.len()].clamp(1, bytes.len() - offset);
        let chunk = std::str::from_utf8(&bytes[offset..offset + size]).unwrap();
        out.extend(emitter.handle_event(&UpstreamEvent::new(
            "assistantResponseEvent",
            json!({"content": chunk}),
        )));
        offset += size;
        i += 1;
    }
    out.extend(emitter.handle_event(&UpstreamEvent::new("assistantResponseEnd", json!({}))));
    out
}

fn collect(events: &[StreamEvent]) -> (String, String) {
    let mut text = String::new();
    let mut thinking = String::new();
    for event in events {
        if let StreamEvent::ContentBlockDelta { delta, .. } = event {
            match delta {
                Delta::TextDelta { text: t } => text.push_str(t),
                Delta::ThinkingDelta { thinking: t } => thinking.push_str(t),
                Delta::InputJsonDelta { .. } => {}
            }
        }
    }
    (text, thinking)
}

fn assert_well_formed(events: &[StreamEvent]) {
    let mut open: Option<u32> = None;
    let mut last_index: Option<u32> = None;
    let mut message_started = false;
    let mut message_stopped = false;
    for event in events {
        assert!(!message_stopped, "event after message_stop");
        match event {
            StreamEvent::MessageStart { .. } => {
                assert!(!message_started, "duplicate message_start");
                message_started = true;
            }
            StreamEvent::ContentBlockStart { index, .. } => {
                assert!(open.is_none(), "nested content_block_start");
                assert!(last_index.is_none_or(|last| *index == last + 1));
                open = Some(*index);
                last_index = Some(*index);
            }
            StreamEvent::ContentBlockDelta { index, .. } => {
                assert_eq!(open, Some(*index), "delta outside its block");
            }
            StreamEvent::ContentBlockStop { index } => {
                assert_eq!(open.take(), Some(*index), "unbalanced stop");
            }
            StreamEvent::MessageDelta { .. } => {
                assert!(open.is_none(), "message_delta with open block");
            }
            StreamEvent::MessageStop {} => message_stopped = true,
            StreamEvent::Ping {} => {}
        }
    }
    assert!(message_started && message_stopped);
}

proptest! {
    #[test]
    fn chunking_is_invisible(
        segments in proptest::collection::vec(segment(), 0..6),
        sizes in proptest::collection::vec(1usize..32, 1..6),
    ) {
        let (full, expected_text, expected_thinking) = render(&segments);
        let events = run_chunked(&full, &sizes);
        let (text, thinking) = collect(&events);
        prop_assert_eq!(text, expected_text);
        prop_assert_eq!(thinking, expected_thinking);
        assert_well_formed(&events);
    }

    #[test]
    fn single_chunk_equals_many_chunks(
        segments in proptest::collection::vec(segment(), 1..5),
    ) {
        let (full, _, _) = render(&segments);
        if full.is_empty() {
            return Ok(());
        }
        let one = collect(&run_chunked(&full, &[full.len()]));
        let many = collect(&run_chunked(&full, &[1]));
        prop_assert_eq!(one, many);
    }
}
