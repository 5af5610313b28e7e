// SPDX-License-Identifier: MIT OR Apache-2.0
//! Quote-aware tag scanning.
//!
//! The upstream model emits raw text in which `<thinking>` may appear as a
//! literal inside quoted strings or code spans. Only tags outside quotes
//! delimit real thinking blocks. [`QuoteState`] tracks the four quoting
//! contexts across chunk boundaries; triple backtick outranks the others,
//! and a backslash escapes the following quote character.

/// Persistent quote state carried across streaming chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuoteState {
    /// Inside `'…'`.
    pub in_single: bool,
    /// Inside `"…"`.
    pub in_double: bool,
    /// Inside `` `…` ``.
    pub in_backtick: bool,
    /// Inside ```` ```…``` ````.
    pub in_triple_backtick: bool,
}

impl QuoteState {
    /// A fresh, outside-everything state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the cursor is inside any quoting context.
    pub fn is_inside_quotes(&self) -> bool {
        self.in_single || self.in_double || self.in_backtick || self.in_triple_backtick
    }

    /// Advance the state by scanning `text` left to right.
    pub fn update(&mut self, text: &str) {
        *self = self.scan(text.as_bytes(), text.len());
    }

    /// Whether `pos` (a byte offset) in `text` is inside quotes, computed
    /// from the persisted state without mutating it.
    pub fn check_at_position(&self, text: &str, pos: usize) -> bool {
        self.scan(text.as_bytes(), pos).is_inside_quotes()
    }

    /// Reset to the outside-everything state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Scan `bytes` up to (not including) `until`, returning the resulting
    /// state. Lookahead for the triple-backtick and escape rules may read
    /// past `until` but never past the end of the chunk.
    fn scan(&self, bytes: &[u8], until: usize) -> Self {
        let mut state = *self;
        let mut i = 0usize;
        while i < until {
            if i + 3 <= bytes.len() && &bytes[i..i + 3] == b"```" {
                state.in_triple_backtick = !state.in_triple_backtick;
                i += 3;
                continue;
            }
            let ch = bytes[i];
            if ch == b'\\'
                && i + 1 < bytes.len()
                && matches!(bytes[i + 1], b'"' | b'\'' | b'`' | b'\\')
            {
                i += 2;
                continue;
            }
            match ch {
                b'`' if !state.in_triple_backtick && !state.in_single && !state.in_double => {
                    state.in_backtick = !state.in_backtick;
                }
                b'"' if !state.in_single && !state.in_backtick && !state.in_triple_backtick => {
                    state.in_double = !state.in_double;
                }
                b'\'' if !state.in_double && !state.in_backtick && !state.in_triple_backtick => {
                    state.in_single = !state.in_single;
                }
                _ => {}
            }
            i += 1;
        }
        state
    }
}

/// Find `tag` in `text` at or after `start`, skipping occurrences that are
/// inside quotes under the persisted `state`. Returns the byte offset of
/// the first real occurrence.
pub fn find_real_tag(text: &str, tag: &str, start: usize, state: &QuoteState) -> Option<usize> {
    let mut pos = start;
    while let Some(rel) = text.get(pos..)?.find(tag) {
        let idx = pos + rel;
        if !state.check_at_position(text, idx) {
            return Some(idx);
        }
        pos = idx + 1;
    }
    None
}

/// Length of the longest suffix of `buffer` that is a strict prefix of
/// `tag`: the bytes that must be held back because they may complete
/// into the tag on the next chunk.
pub fn pending_tag_suffix(buffer: &str, tag: &str) -> usize {
    if buffer.is_empty() || tag.is_empty() {
        return 0;
    }
    let buf = buffer.as_bytes();
    let tag = tag.as_bytes();
    let max_len = buf.len().min(tag.len() - 1);
    for len in (1..=max_len).rev() {
        if buf[buf.len() - len..] == tag[..len] {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use qgw_claude::{THINKING_END_TAG, THINKING_START_TAG};

    fn inside_after(text: &str) -> bool {
        let mut state = QuoteState::new();
        state.update(text);
        state.is_inside_quotes()
    }

    // -- QuoteState::update ---------------------------------------------

    #[test]
    fn plain_text_stays_outside() {
        assert!(!inside_after("nothing quoted here"));
    }

    #[test]
    fn double_quotes_toggle() {
        assert!(inside_after("say \"hello"));
        assert!(!inside_after("say \"hello\""));
    }

    #[test]
    fn single_quotes_toggle() {
        assert!(inside_after("it's"));
        assert!(!inside_after("'done'"));
    }

    #[test]
    fn backtick_span() {
        assert!(inside_after("see `code"));
        assert!(!inside_after("see `code`"));
    }

    #[test]
    fn triple_backtick_takes_precedence() {
        let mut state = QuoteState::new();
        state.update("```rust\nlet s = \"unclosed;\n");
        // Inside a fence the double quote does not toggle.
        assert!(state.in_triple_backtick);
        assert!(!state.in_double);
        state.update("```");
        assert!(!state.is_inside_quotes());
    }

    #[test]
    fn escaped_quotes_do_not_toggle() {
        assert!(!inside_after(r#"a \" b"#));
        assert!(!inside_after(r"c \' d"));
        assert!(!inside_after(r"e \` f"));
    }

    #[test]
    fn escaped_backslash_consumes_pair() {
        // The backslash pair is consumed; the following quote toggles.
        assert!(inside_after(r#"x \\" y"#));
    }

    #[test]
    fn single_inside_double_is_literal() {
        assert!(!inside_after("\"it's fine\""));
    }

    #[test]
    fn state_persists_across_chunks() {
        let mut state = QuoteState::new();
        state.update("start \"un");
        state.update("finished");
        assert!(state.in_double);
        state.update("\" closed");
        assert!(!state.is_inside_quotes());
    }

    // -- check_at_position ----------------------------------------------

    #[test]
    fn check_matches_update_history() {
        // At every position, the stateless check agrees with the state an
        // update over the prefix would produce.
        let text = r#"a "b" `c` 'd' e\" still "open"#;
        let base = QuoteState::new();
        for pos in 0..=text.len() {
            let mut prefix_state = QuoteState::new();
            prefix_state.update(&text[..pos]);
            assert_eq!(
                base.check_at_position(text, pos),
                prefix_state.is_inside_quotes(),
                "position {pos}"
            );
        }
    }

    #[test]
    fn check_is_pure() {
        let state = QuoteState::new();
        let _ = state.check_at_position("\"quoted\"", 3);
        assert_eq!(state, QuoteState::new());
    }

    #[test]
    fn check_respects_persisted_state() {
        let mut state = QuoteState::new();
        state.update("\"open");
        // Position 0 of the next chunk is still inside the open string.
        assert!(state.check_at_position("more", 0));
    }

    // -- find_real_tag ---------------------------------------------------

    #[test]
    fn finds_bare_tag() {
        let state = QuoteState::new();
        assert_eq!(
            find_real_tag("before <thinking> after", THINKING_START_TAG, 0, &state),
            Some(7)
        );
    }

    #[test]
    fn skips_quoted_tag() {
        let state = QuoteState::new();
        let text = "say \"<thinking>\" literally";
        assert_eq!(find_real_tag(text, THINKING_START_TAG, 0, &state), None);
    }

    #[test]
    fn skips_code_span_tag_then_finds_real_one() {
        let state = QuoteState::new();
        let text = "`<thinking>` and then <thinking>";
        assert_eq!(find_real_tag(text, THINKING_START_TAG, 0, &state), Some(22));
    }

    #[test]
    fn respects_carried_state() {
        let mut state = QuoteState::new();
        state.update("\"chunk one opened ");
        // The whole next chunk is inside the unclosed string.
        assert_eq!(
            find_real_tag("<thinking>", THINKING_START_TAG, 0, &state),
            None
        );
    }

    #[test]
    fn start_offset_is_honored() {
        let state = QuoteState::new();
        let text = "<thinking> and <thinking>";
        assert_eq!(find_real_tag(text, THINKING_START_TAG, 1, &state), Some(15));
    }

    // -- pending_tag_suffix ----------------------------------------------

    #[test]
    fn detects_partial_tag_suffix() {
        assert_eq!(pending_tag_suffix("text <th", THINKING_START_TAG), 3);
        assert_eq!(pending_tag_suffix("text <thinking", THINKING_START_TAG), 9);
        assert_eq!(pending_tag_suffix("<", THINKING_START_TAG), 1);
    }

    #[test]
    fn full_tag_is_not_a_pending_suffix() {
        // A complete tag is found by find_real_tag, never held back.
        assert_eq!(pending_tag_suffix("<thinking>", THINKING_START_TAG), 0);
    }

    #[test]
    fn no_suffix_when_text_diverges() {
        assert_eq!(pending_tag_suffix("text <x", THINKING_START_TAG), 0);
        assert_eq!(pending_tag_suffix("", THINKING_START_TAG), 0);
    }

    #[test]
    fn end_tag_suffixes() {
        assert_eq!(pending_tag_suffix("body </think", THINKING_END_TAG), 7);
        assert_eq!(pending_tag_suffix("body <", THINKING_END_TAG), 1);
    }
}
