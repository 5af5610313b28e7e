// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod accounts;
pub mod cancel;
pub mod dispatch;
pub mod oidc;
pub mod template;

pub use accounts::{AccountStatus, AccountStore, MemoryAccountStore};
pub use cancel::CancelToken;
pub use dispatch::{Dispatcher, QEventStream};
pub use oidc::{DeviceAuthorization, OidcClient, TokenSet};
pub use template::RequestTemplate;
