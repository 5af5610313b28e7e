// SPDX-License-Identifier: MIT OR Apache-2.0
//! Token-counting seam.
//!
//! The gateway does not ship a tokenizer; the host wires one in when it
//! has one. Without a counter the emitter reports zero output tokens.

use std::sync::Arc;

/// Counts tokens in emitted text for usage reporting.
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`.
    fn count_tokens(&self, text: &str) -> u32;
}

/// Shared handle to a token counter.
pub type SharedTokenCounter = Arc<dyn TokenCounter>;

impl<F> TokenCounter for F
where
    F: Fn(&str) -> u32 + Send + Sync,
{
    fn count_tokens(&self, text: &str) -> u32 {
        self(text)
    }
}
