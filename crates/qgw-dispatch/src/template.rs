// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reference request template.
//!
//! The upstream endpoint expects a CLI-class client; the exact header
//! strings are captured from a reference client into a JSON file shaped
//! `[url, headers, body]`. Only the url and headers are used; the body
//! slot is replaced by the transcoded payload.

use qgw_error::GatewayError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// Headers owned by the transport layer, never forwarded from the template.
const HOP_BY_HOP: &[&str] = &["content-length", "host", "connection", "transfer-encoding"];

/// The upstream URL and header set captured from a reference client.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    /// Q streaming endpoint URL.
    pub url: String,
    headers: BTreeMap<String, String>,
}

impl RequestTemplate {
    /// Load a template from a JSON file holding `[url, headers, body]`.
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::ConfigInvalid(format!("cannot read template {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
    }

    /// Parse a template from its JSON text.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let (url, headers, _body): (String, BTreeMap<String, String>, Value) =
            serde_json::from_str(raw)
                .map_err(|e| GatewayError::ConfigInvalid(format!("malformed template: {e}")))?;
        if url.is_empty() {
            return Err(GatewayError::ConfigInvalid("template url is empty".into()));
        }
        Ok(Self { url, headers })
    }

    /// Build a template directly from parts (used by tests).
    pub fn from_parts(url: impl Into<String>, headers: BTreeMap<String, String>) -> Self {
        Self {
            url: url.into(),
            headers,
        }
    }

    /// Produce the header set for one upstream request: template headers
    /// minus hop-by-hop entries, with a fresh `amz-sdk-invocation-id` and
    /// the caller's bearer token overriding whatever the template carried.
    pub fn merge_headers(&self, bearer_token: &str) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = self
            .headers
            .iter()
            .filter(|(name, _)| {
                let lower = name.to_lowercase();
                !HOP_BY_HOP.contains(&lower.as_str())
                    && lower != "authorization"
                    && lower != "amz-sdk-invocation-id"
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        merged.push(("Authorization".into(), format!("Bearer {bearer_token}")));
        merged.push(("amz-sdk-invocation-id".into(), Uuid::new_v4().to_string()));
        merged
    }
}
