// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod emitter;
pub mod quote;
pub mod tokens;

pub use emitter::{StreamEmitter, assemble_response};
pub use quote::{QuoteState, find_real_tag, pending_tag_suffix};
pub use tokens::{SharedTokenCounter, TokenCounter};
