// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crc32c;
pub mod decoder;
pub mod frame;
pub mod header;

pub use crc32c::{crc32c, crc32c_update};
pub use decoder::{DEFAULT_MAX_ERRORS, DecoderState, EventStreamDecoder, STREAMING_MAX_ERRORS};
pub use frame::{
    Frame, FrameError, FramePayload, MAX_FRAME_LEN, MIN_FRAME_LEN, PRELUDE_LEN, decode_frame,
    encode_frame,
};
pub use header::{HeaderError, HeaderValue, Headers, encode_headers, parse_headers};

use serde_json::Value;

// ---------------------------------------------------------------------------
// UpstreamEvent
// ---------------------------------------------------------------------------

/// Event information extracted from a decoded [`Frame`].
///
/// This is the unit the streaming emitter consumes: the routing headers
/// pulled out by name plus the JSON payload (frames whose payload is not
/// JSON yield `None` and are skipped by the caller).
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEvent {
    /// The `:event-type` header, e.g. `assistantResponseEvent`.
    pub event_type: String,
    /// The `:message-type` header, when present.
    pub message_type: Option<String>,
    /// The `:content-type` header, when present.
    pub content_type: Option<String>,
    /// The decoded JSON payload.
    pub payload: Value,
}

impl UpstreamEvent {
    /// Extract the event from a frame.
    ///
    /// Returns `None` when the frame has no event type or no JSON payload;
    /// such frames carry nothing the emitter can act on.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let event_type = frame.event_type()?.to_string();
        let payload = frame.payload.as_json()?.clone();
        Some(Self {
            event_type,
            message_type: frame.message_type().map(str::to_string),
            content_type: frame.content_type().map(str::to_string),
            payload,
        })
    }

    /// Convenience constructor used by tests and fixtures.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            message_type: Some("event".into()),
            content_type: Some("application/json".into()),
            payload,
        }
    }
}
