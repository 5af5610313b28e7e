// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Client-side request faults (answered with a 4xx).
    Request,
    /// Faults reported by or observed on the upstream connection.
    Upstream,
    /// Wire-format faults in the upstream event stream.
    Protocol,
    /// Local I/O, configuration, and lifecycle faults.
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Request => "request",
            Self::Upstream => "upstream",
            Self::Protocol => "protocol",
            Self::Io => "io",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request body failed to parse or violates the Claude schema.
    InvalidInput,
    /// Repeated identical assistant tool calls; the request is refused.
    LoopDetected,
    /// Assembled history failed the role-alternation check.
    MalformedHistory,
    /// Upstream answered with a non-2xx status.
    UpstreamError,
    /// The event-stream decoder gave up on the upstream bytes.
    UpstreamProtocolError,
    /// I/O exceeded the configured deadline.
    Timeout,
    /// The client went away; resources were released.
    Cancelled,
    /// Reference template or other configuration is unusable.
    ConfigInvalid,
    /// OIDC flow or token refresh failed.
    AuthFailed,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput | Self::LoopDetected => ErrorCategory::Request,
            Self::UpstreamError | Self::Timeout | Self::AuthFailed => ErrorCategory::Upstream,
            Self::UpstreamProtocolError => ErrorCategory::Protocol,
            Self::MalformedHistory | Self::Cancelled | Self::ConfigInvalid => ErrorCategory::Io,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"LOOP_DETECTED"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::LoopDetected => "LOOP_DETECTED",
            Self::MalformedHistory => "MALFORMED_HISTORY",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::UpstreamProtocolError => "UPSTREAM_PROTOCOL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::AuthFailed => "AUTH_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

/// Unified gateway error.
///
/// Each variant corresponds to one [`ErrorCode`]; [`http_status`]
/// (GatewayError::http_status) gives the status the downstream surface
/// should answer with.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request body failed to parse or violates the Claude schema.
    #[error("invalid request: {0}")]
    InvalidInput(String),

    /// Repeated identical assistant tool calls; forwarding is refused.
    #[error("tool-call loop detected: {0}")]
    LoopDetected(String),

    /// Assembled history failed the role-alternation check. This indicates
    /// a transcoder bug rather than bad client input.
    #[error("malformed history: {0}")]
    MalformedHistory(String),

    /// Upstream answered with a non-2xx status.
    #[error("upstream error {status}: {body}")]
    Upstream {
        /// HTTP status returned by the upstream.
        status: u16,
        /// `x-amzn-requestid` header, when present.
        request_id: Option<String>,
        /// `x-amzn-errortype` header, when present.
        error_type: Option<String>,
        /// Up to 8 KiB of the diagnostic response body.
        body: String,
    },

    /// The event-stream decoder stopped after exhausting its error budget.
    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    /// I/O exceeded the configured deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The client went away. Never reported upward; the surface layer
    /// releases resources and drops this silently.
    #[error("request cancelled by client")]
    Cancelled,

    /// Reference template or other configuration is unusable.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// OIDC flow or token refresh failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),
}

impl GatewayError {
    /// The stable [`ErrorCode`] for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::LoopDetected(_) => ErrorCode::LoopDetected,
            Self::MalformedHistory(_) => ErrorCode::MalformedHistory,
            Self::Upstream { .. } => ErrorCode::UpstreamError,
            Self::UpstreamProtocol(_) => ErrorCode::UpstreamProtocolError,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::ConfigInvalid(_) => ErrorCode::ConfigInvalid,
            Self::AuthFailed(_) => ErrorCode::AuthFailed,
        }
    }

    /// Shorthand for `self.code().category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// HTTP status the downstream surface should answer with.
    ///
    /// Upstream statuses in the 4xx/5xx range pass through unchanged;
    /// anything else maps to 502.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::LoopDetected(_) => 400,
            Self::Upstream { status, .. } => {
                if (400..=599).contains(status) {
                    *status
                } else {
                    502
                }
            }
            Self::UpstreamProtocol(_) => 502,
            Self::Timeout(_) => 504,
            Self::AuthFailed(_) => 401,
            // Client is gone; nobody reads this status.
            Self::Cancelled => 499,
            Self::MalformedHistory(_) | Self::ConfigInvalid(_) => 500,
        }
    }

    /// Whether this error should be reported to the caller at all.
    ///
    /// [`GatewayError::Cancelled`] is not: the client has disconnected.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Convenience alias used across the gateway crates.
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
