// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-frame decode and encode for the AWS Event Stream wire format.
//!
//! Wire form (big-endian):
//! `total_length(4) | headers_length(4) | prelude_crc(4) | headers | payload | message_crc(4)`.
//! The prelude CRC covers the first 8 bytes; the message CRC covers every
//! byte before itself.

use crate::crc32c::crc32c;
use crate::header::{Headers, encode_headers, parse_headers};
use serde_json::Value;

/// Prelude length: two length words plus the prelude CRC.
pub const PRELUDE_LEN: usize = 12;

/// Smallest legal frame: a prelude plus an empty body and the message CRC.
pub const MIN_FRAME_LEN: usize = 16;

/// Largest frame the decoder will accept (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// FramePayload
// ---------------------------------------------------------------------------

/// A frame payload, decoded as JSON when it parses.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    /// The payload parsed as JSON.
    Json(Value),
    /// The payload did not parse; the raw bytes are retained.
    Bytes(Vec<u8>),
    /// The frame carried no payload.
    Empty,
}

impl FramePayload {
    fn from_bytes(data: &[u8]) -> Self {
        if data.is_empty() {
            return Self::Empty;
        }
        match serde_json::from_slice::<Value>(data) {
            Ok(v) => Self::Json(v),
            Err(_) => Self::Bytes(data.to_vec()),
        }
    }

    /// The decoded JSON value, if the payload parsed.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A decoded Event Stream frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Parsed header region, in wire order.
    pub headers: Headers,
    /// Decoded payload.
    pub payload: FramePayload,
    /// Total frame length on the wire.
    pub total_length: usize,
}

impl Frame {
    /// The `:event-type` header (with or without the leading colon).
    pub fn event_type(&self) -> Option<&str> {
        self.headers
            .get_str(":event-type")
            .or_else(|| self.headers.get_str("event-type"))
    }

    /// The `:message-type` header (with or without the leading colon).
    pub fn message_type(&self) -> Option<&str> {
        self.headers
            .get_str(":message-type")
            .or_else(|| self.headers.get_str("message-type"))
    }

    /// The `:content-type` header (with or without the leading colon).
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get_str(":content-type")
            .or_else(|| self.headers.get_str("content-type"))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Frame-level decode faults.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// `total_length` is outside `[16, 16 MiB]`.
    #[error("frame length {0} out of bounds")]
    LengthOutOfBounds(u64),
    /// Fewer bytes than `total_length` were supplied.
    #[error("truncated frame: need {needed} bytes, have {have}")]
    Truncated {
        /// Bytes the frame claims to span.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },
    /// Prelude CRC did not match.
    #[error("prelude CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    PreludeCrc {
        /// CRC carried on the wire.
        expected: u32,
        /// CRC computed over the prelude.
        computed: u32,
    },
    /// Message CRC did not match.
    #[error("message CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    MessageCrc {
        /// CRC carried on the wire.
        expected: u32,
        /// CRC computed over the message.
        computed: u32,
    },
    /// The header region runs past the end of the frame body.
    #[error("header region ({headers_length} bytes) exceeds frame bounds")]
    HeaderOverrun {
        /// Claimed header-region length.
        headers_length: usize,
    },
    /// The header region failed to parse.
    #[error(transparent)]
    Header(#[from] crate::header::HeaderError),
}

impl FrameError {
    /// Whether this fault is a checksum mismatch.
    pub fn is_crc(&self) -> bool {
        matches!(self, Self::PreludeCrc { .. } | Self::MessageCrc { .. })
    }
}

// ---------------------------------------------------------------------------
// Decode / encode
// ---------------------------------------------------------------------------

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Decode one complete frame from the front of `data`.
///
/// `data` must hold at least `total_length` bytes; the decoder checks
/// availability before calling this. When `validate_crc` is false the two
/// checksums are skipped but every length and type bound still applies.
pub fn decode_frame(data: &[u8], validate_crc: bool) -> Result<Frame, FrameError> {
    if data.len() < PRELUDE_LEN {
        return Err(FrameError::Truncated {
            needed: PRELUDE_LEN,
            have: data.len(),
        });
    }

    let total_length = read_u32(data, 0) as usize;
    if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total_length) {
        return Err(FrameError::LengthOutOfBounds(read_u32(data, 0) as u64));
    }
    if data.len() < total_length {
        return Err(FrameError::Truncated {
            needed: total_length,
            have: data.len(),
        });
    }

    let message = &data[..total_length];

    if validate_crc {
        let expected = read_u32(message, 8);
        let computed = crc32c(&message[0..8]);
        if expected != computed {
            return Err(FrameError::PreludeCrc { expected, computed });
        }

        let expected = read_u32(message, total_length - 4);
        let computed = crc32c(&message[..total_length - 4]);
        if expected != computed {
            return Err(FrameError::MessageCrc { expected, computed });
        }
    }

    let headers_length = read_u32(message, 4) as usize;
    if PRELUDE_LEN + headers_length + 4 > total_length {
        return Err(FrameError::HeaderOverrun { headers_length });
    }

    let headers = parse_headers(&message[PRELUDE_LEN..PRELUDE_LEN + headers_length])?;
    let payload = FramePayload::from_bytes(&message[PRELUDE_LEN + headers_length..total_length - 4]);

    Ok(Frame {
        headers,
        payload,
        total_length,
    })
}

/// Encode a frame with the given headers and payload bytes.
///
/// Used by tests and callers that fabricate upstream fixtures; the output
/// round-trips through [`decode_frame`].
pub fn encode_frame(headers: &Headers, payload: &[u8]) -> Vec<u8> {
    let header_bytes = encode_headers(headers);
    let total_length = PRELUDE_LEN + header_bytes.len() + payload.len() + 4;

    let mut out = Vec::with_capacity(total_length);
    out.extend_from_slice(&(total_length as u32).to_be_bytes());
    out.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    let prelude_crc = crc32c(&out);
    out.extend_from_slice(&prelude_crc.to_be_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(payload);
    let message_crc = crc32c(&out);
    out.extend_from_slice(&message_crc.to_be_bytes());
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderValue;
    use serde_json::json;

    fn event_headers(event_type: &str) -> Headers {
        let mut h = Headers::new();
        h.push(":event-type", HeaderValue::String(event_type.into()));
        h.push(":message-type", HeaderValue::String("event".into()));
        h
    }

    #[test]
    fn roundtrip_json_payload() {
        let payload = serde_json::to_vec(&json!({"content": "Hi"})).unwrap();
        let wire = encode_frame(&event_headers("assistantResponseEvent"), &payload);

        let frame = decode_frame(&wire, true).unwrap();
        assert_eq!(frame.total_length, wire.len());
        assert_eq!(frame.event_type(), Some("assistantResponseEvent"));
        assert_eq!(frame.message_type(), Some("event"));
        assert_eq!(frame.payload.as_json().unwrap()["content"], "Hi");
    }

    #[test]
    fn empty_payload() {
        let wire = encode_frame(&Headers::new(), b"");
        assert_eq!(wire.len(), MIN_FRAME_LEN);
        let frame = decode_frame(&wire, true).unwrap();
        assert_eq!(frame.payload, FramePayload::Empty);
    }

    #[test]
    fn non_json_payload_kept_as_bytes() {
        let wire = encode_frame(&Headers::new(), &[0xDE, 0xAD]);
        let frame = decode_frame(&wire, true).unwrap();
        assert_eq!(frame.payload, FramePayload::Bytes(vec![0xDE, 0xAD]));
    }

    #[test]
    fn corrupt_payload_fails_message_crc() {
        let mut wire = encode_frame(&Headers::new(), b"{\"a\":1}");
        let mid = wire.len() - 6;
        wire[mid] ^= 0xFF;
        let err = decode_frame(&wire, true).unwrap_err();
        assert!(matches!(err, FrameError::MessageCrc { .. }));
        assert!(err.is_crc());
    }

    #[test]
    fn corrupt_prelude_fails_prelude_crc() {
        let mut wire = encode_frame(&Headers::new(), b"{}");
        wire[5] ^= 0x01; // headers_length byte
        let err = decode_frame(&wire, true).unwrap_err();
        assert!(matches!(err, FrameError::PreludeCrc { .. }));
    }

    #[test]
    fn crc_validation_can_be_disabled() {
        let mut wire = encode_frame(&Headers::new(), b"{\"a\":1}");
        let mid = wire.len() - 6;
        wire[mid] ^= 0xFF;
        // Bounds still checked, checksums skipped.
        let frame = decode_frame(&wire, false).unwrap();
        assert!(matches!(frame.payload, FramePayload::Bytes(_) | FramePayload::Json(_)));
    }

    #[test]
    fn oversized_length_rejected() {
        let mut wire = encode_frame(&Headers::new(), b"{}");
        wire[0..4].copy_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());
        let err = decode_frame(&wire, false).unwrap_err();
        assert!(matches!(err, FrameError::LengthOutOfBounds(_)));
    }

    #[test]
    fn undersized_length_rejected() {
        let mut wire = encode_frame(&Headers::new(), b"{}");
        wire[0..4].copy_from_slice(&8u32.to_be_bytes());
        let err = decode_frame(&wire, false).unwrap_err();
        assert!(matches!(err, FrameError::LengthOutOfBounds(8)));
    }

    #[test]
    fn header_overrun_rejected() {
        let mut wire = encode_frame(&Headers::new(), b"{}");
        // Claim a header region larger than the frame body.
        wire[4..8].copy_from_slice(&1000u32.to_be_bytes());
        let err = decode_frame(&wire, false).unwrap_err();
        assert!(matches!(err, FrameError::HeaderOverrun { .. }));
    }

    #[test]
    fn truncated_input_reports_needed_bytes() {
        let wire = encode_frame(&event_headers("x"), b"{\"k\":true}");
        let err = decode_frame(&wire[..wire.len() - 3], true).unwrap_err();
        match err {
            FrameError::Truncated { needed, have } => {
                assert_eq!(needed, wire.len());
                assert_eq!(have, wire.len() - 3);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }
}
