// SPDX-License-Identifier: MIT OR Apache-2.0
//! Push-style state-machine decoder with byte-level error recovery.
//!
//! Feed arbitrary byte chunks with [`EventStreamDecoder::feed`]; complete,
//! checksum-verified frames come back in order. Corruption transitions the
//! decoder to `Recovering`, where it scans for the next plausible prelude
//! (length in bounds and prelude CRC matching). After `max_errors`
//! consecutive faults the decoder stops for good and discards all further
//! input.

use crate::crc32c::crc32c;
use crate::frame::{Frame, MAX_FRAME_LEN, MIN_FRAME_LEN, PRELUDE_LEN, decode_frame};
use tracing::{info, warn};

/// Error budget when the decoder is used standalone.
pub const DEFAULT_MAX_ERRORS: u32 = 3;

/// Error budget when the decoder is driven by a live upstream stream.
pub const STREAMING_MAX_ERRORS: u32 = 5;

/// Buffer size beyond which an unrecovered buffer is truncated.
const RECOVERY_BUFFER_CAP: usize = 16 * 1024;

/// Bytes kept when the recovery buffer is truncated.
const RECOVERY_KEEP: usize = 1024;

// ---------------------------------------------------------------------------
// DecoderState
// ---------------------------------------------------------------------------

/// Decoder lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for enough bytes to start a frame.
    Ready,
    /// A frame parse is in progress.
    Parsing,
    /// Scanning for the next valid prelude after a fault.
    Recovering,
    /// Error budget exhausted; all further input is discarded.
    Stopped,
}

// ---------------------------------------------------------------------------
// EventStreamDecoder
// ---------------------------------------------------------------------------

/// Incremental Event Stream decoder.
#[derive(Debug)]
pub struct EventStreamDecoder {
    state: DecoderState,
    buf: Vec<u8>,
    /// One head byte is dropped per fault, not per recovery attempt, so
    /// slow chunk arrival cannot eat into the next valid frame.
    pending_head_drop: bool,
    error_count: u32,
    max_errors: u32,
    validate_crc: bool,
    messages_parsed: u64,
    crc_errors: u64,
    discarded_bytes: u64,
}

impl Default for EventStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

enum ParseOutcome {
    Frame(Frame),
    NeedMore,
    Fault,
}

impl EventStreamDecoder {
    /// Create a decoder with the standalone error budget and CRC checks on.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(DEFAULT_MAX_ERRORS, true)
    }

    /// Create a decoder with an explicit error budget and CRC toggle.
    #[must_use]
    pub fn with_options(max_errors: u32, validate_crc: bool) -> Self {
        Self {
            state: DecoderState::Ready,
            buf: Vec::new(),
            pending_head_drop: false,
            error_count: 0,
            max_errors,
            validate_crc,
            messages_parsed: 0,
            crc_errors: 0,
            discarded_bytes: 0,
        }
    }

    /// Feed a chunk of bytes and collect every frame that completes.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        if self.state == DecoderState::Stopped {
            self.discarded_bytes += data.len() as u64;
            return Vec::new();
        }

        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            if self.state == DecoderState::Recovering {
                if !self.try_recover() {
                    break;
                }
                self.state = DecoderState::Ready;
            }

            if self.buf.len() < PRELUDE_LEN {
                break;
            }

            self.state = DecoderState::Parsing;
            match self.try_parse() {
                ParseOutcome::NeedMore => {
                    self.state = DecoderState::Ready;
                    break;
                }
                ParseOutcome::Frame(frame) => {
                    self.state = DecoderState::Ready;
                    self.error_count = 0;
                    self.messages_parsed += 1;
                    frames.push(frame);
                }
                ParseOutcome::Fault => {
                    self.error_count += 1;
                    if self.error_count >= self.max_errors {
                        warn!(max_errors = self.max_errors, "error budget exhausted, decoder stopped");
                        self.discarded_bytes += self.buf.len() as u64;
                        self.buf.clear();
                        self.state = DecoderState::Stopped;
                        break;
                    }
                    self.state = DecoderState::Recovering;
                    self.pending_head_drop = true;
                }
            }
        }

        frames
    }

    fn try_parse(&mut self) -> ParseOutcome {
        let total_length =
            u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;

        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total_length) {
            warn!(total_length, "invalid frame length");
            return ParseOutcome::Fault;
        }
        if self.buf.len() < total_length {
            return ParseOutcome::NeedMore;
        }

        match decode_frame(&self.buf[..total_length], self.validate_crc) {
            Ok(frame) => {
                self.buf.drain(..total_length);
                ParseOutcome::Frame(frame)
            }
            Err(err) => {
                if err.is_crc() {
                    self.crc_errors += 1;
                }
                warn!(%err, "frame parse fault");
                ParseOutcome::Fault
            }
        }
    }

    /// Drop one byte, then scan for the next offset whose candidate length
    /// is in bounds and whose prelude CRC verifies. The prelude probe runs
    /// even with `validate_crc` off; it is the resync heuristic, not frame
    /// validation.
    fn try_recover(&mut self) -> bool {
        if self.buf.len() < PRELUDE_LEN {
            return false;
        }

        if self.pending_head_drop {
            self.buf.remove(0);
            self.discarded_bytes += 1;
            self.pending_head_drop = false;
        }

        let mut i = 0usize;
        while i + PRELUDE_LEN <= self.buf.len() {
            let candidate = u32::from_be_bytes([
                self.buf[i],
                self.buf[i + 1],
                self.buf[i + 2],
                self.buf[i + 3],
            ]) as usize;
            if (MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&candidate) {
                let wire_crc = u32::from_be_bytes([
                    self.buf[i + 8],
                    self.buf[i + 9],
                    self.buf[i + 10],
                    self.buf[i + 11],
                ]);
                if crc32c(&self.buf[i..i + 8]) == wire_crc {
                    self.discarded_bytes += i as u64;
                    self.buf.drain(..i);
                    info!(offset = i, "recovered stream sync");
                    return true;
                }
            }
            i += 1;
        }

        if self.buf.len() > RECOVERY_BUFFER_CAP {
            let drop = self.buf.len() - RECOVERY_KEEP;
            self.discarded_bytes += drop as u64;
            self.buf.drain(..drop);
        }

        false
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Whether the decoder has stopped for good.
    pub fn is_stopped(&self) -> bool {
        self.state == DecoderState::Stopped
    }

    /// Frames successfully parsed so far.
    pub fn messages_parsed(&self) -> u64 {
        self.messages_parsed
    }

    /// Checksum mismatches observed so far.
    pub fn crc_errors(&self) -> u64 {
        self.crc_errors
    }

    /// Bytes dropped by recovery, truncation, or the stopped state.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }

    /// Bytes buffered but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Reset to a fresh decoder, keeping the configuration.
    pub fn reset(&mut self) {
        self.state = DecoderState::Ready;
        self.buf.clear();
        self.pending_head_drop = false;
        self.error_count = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame;
    use crate::header::{HeaderValue, Headers};
    use serde_json::json;

    fn frame_bytes(event_type: &str, payload: serde_json::Value) -> Vec<u8> {
        let mut h = Headers::new();
        h.push(":event-type", HeaderValue::String(event_type.into()));
        h.push(":message-type", HeaderValue::String("event".into()));
        encode_frame(&h, &serde_json::to_vec(&payload).unwrap())
    }

    #[test]
    fn single_frame_one_shot() {
        let wire = frame_bytes("assistantResponseEvent", json!({"content": "Hi"}));
        let mut dec = EventStreamDecoder::new();
        let frames = dec.feed(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_type(), Some("assistantResponseEvent"));
        assert_eq!(dec.messages_parsed(), 1);
        assert_eq!(dec.crc_errors(), 0);
        assert_eq!(dec.state(), DecoderState::Ready);
        assert_eq!(dec.buffered_len(), 0);
    }

    #[test]
    fn byte_at_a_time_equals_one_shot() {
        let mut wire = frame_bytes("a", json!({"n": 1}));
        wire.extend(frame_bytes("b", json!({"n": 2})));

        let mut one_shot = EventStreamDecoder::new();
        let all = one_shot.feed(&wire);

        let mut trickle = EventStreamDecoder::new();
        let mut collected = Vec::new();
        for b in &wire {
            collected.extend(trickle.feed(std::slice::from_ref(b)));
        }

        assert_eq!(all, collected);
        assert_eq!(all.len(), 2);
        assert_eq!(trickle.messages_parsed(), 2);
    }

    #[test]
    fn garbage_byte_between_frames_is_recovered() {
        let f1 = frame_bytes("first", json!({"n": 1}));
        let f2 = frame_bytes("second", json!({"n": 2}));
        let mut wire = f1.clone();
        wire.push(0xAB);
        wire.extend(&f2);

        let mut dec = EventStreamDecoder::new();
        let mut frames = Vec::new();
        for chunk in wire.chunks(7) {
            frames.extend(dec.feed(chunk));
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event_type(), Some("first"));
        assert_eq!(frames[1].event_type(), Some("second"));
        assert_eq!(dec.messages_parsed(), 2);
        assert!(dec.crc_errors() <= 1);
        assert!(!dec.is_stopped());
    }

    #[test]
    fn corrupted_frame_is_skipped_then_stream_resumes() {
        let mut bad = frame_bytes("bad", json!({"x": "corrupt me"}));
        let len = bad.len();
        bad[len - 6] ^= 0xFF; // flip a payload byte so the message CRC fails
        let good = frame_bytes("good", json!({"x": "ok"}));

        let mut wire = bad;
        wire.extend(&good);

        let mut dec = EventStreamDecoder::new();
        let frames = dec.feed(&wire);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_type(), Some("good"));
        assert_eq!(dec.crc_errors(), 1);
        assert!(dec.discarded_bytes() > 0);
    }

    #[test]
    fn stops_after_error_budget() {
        // A corrupted frame faults on its message CRC; recovery then locks
        // onto the next frame's valid prelude, so each frame burns one unit
        // of the error budget.
        fn corrupted() -> Vec<u8> {
            let mut f = frame_bytes("bad", json!({"x": "corrupt this payload"}));
            let len = f.len();
            f[len - 6] ^= 0xFF;
            f
        }

        let mut wire = Vec::new();
        for _ in 0..3 {
            wire.extend(corrupted());
        }

        let mut dec = EventStreamDecoder::with_options(3, true);
        let frames = dec.feed(&wire);
        assert!(frames.is_empty());
        assert!(dec.is_stopped());
        assert_eq!(dec.crc_errors(), 3);

        // Further input is discarded wholesale.
        let before = dec.discarded_bytes();
        let wire = frame_bytes("late", json!({}));
        assert!(dec.feed(&wire).is_empty());
        assert_eq!(dec.discarded_bytes(), before + wire.len() as u64);
    }

    #[test]
    fn crc_checks_can_be_disabled() {
        let mut wire = frame_bytes("ev", json!({"k": 1}));
        let len = wire.len();
        wire[len - 6] ^= 0xFF;

        let mut strict = EventStreamDecoder::new();
        assert!(strict.feed(&wire).is_empty());
        assert_eq!(strict.crc_errors(), 1);

        let mut relaxed = EventStreamDecoder::with_options(3, false);
        let frames = relaxed.feed(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(relaxed.crc_errors(), 0);
    }

    #[test]
    fn length_bounds_still_apply_without_crc() {
        let mut dec = EventStreamDecoder::with_options(3, false);
        let mut wire = frame_bytes("ev", json!({}));
        wire[0..4].copy_from_slice(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes());
        assert!(dec.feed(&wire).is_empty());
        assert_ne!(dec.state(), DecoderState::Ready);
    }

    #[test]
    fn recovery_buffer_is_bounded() {
        let mut dec = EventStreamDecoder::with_options(100, true);
        // A fault first, so the decoder enters recovery…
        dec.feed(&[0u8; 12]);
        // …then a long run of bytes that never recovers.
        let junk = vec![0u8; 40 * 1024];
        dec.feed(&junk);
        assert!(dec.buffered_len() <= RECOVERY_BUFFER_CAP);
    }

    #[test]
    fn accounting_balances() {
        let f1 = frame_bytes("a", json!({"n": 1}));
        let f2 = frame_bytes("b", json!({"n": 2}));
        let mut wire = f1.clone();
        wire.extend([0xDE, 0xAD, 0xBE]);
        wire.extend(&f2);

        let mut dec = EventStreamDecoder::new();
        let frames = dec.feed(&wire);
        assert_eq!(frames.len(), 2);

        let consumed_by_frames: u64 = frames.iter().map(|f| f.total_length as u64).sum();
        assert_eq!(
            consumed_by_frames + dec.discarded_bytes() + dec.buffered_len() as u64,
            wire.len() as u64
        );
    }

    #[test]
    fn reset_clears_state_but_keeps_counters() {
        let mut dec = EventStreamDecoder::new();
        dec.feed(&frame_bytes("a", json!({})));
        dec.feed(&[1, 2, 3]);
        dec.reset();
        assert_eq!(dec.state(), DecoderState::Ready);
        assert_eq!(dec.buffered_len(), 0);
        assert_eq!(dec.messages_parsed(), 1);
    }

    #[test]
    fn partial_frame_waits_for_more() {
        let wire = frame_bytes("ev", json!({"content": "hello world"}));
        let mut dec = EventStreamDecoder::new();
        assert!(dec.feed(&wire[..wire.len() - 1]).is_empty());
        assert_eq!(dec.state(), DecoderState::Ready);
        let frames = dec.feed(&wire[wire.len() - 1..]);
        assert_eq!(frames.len(), 1);
    }
}
