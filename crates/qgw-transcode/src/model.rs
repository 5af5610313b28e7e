// SPDX-License-Identifier: MIT OR Apache-2.0
//! Model-name normalization and mapping to the backend's short ids.

use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info, warn};

/// Model used whenever the requested one is unknown or rejected.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4.5";

/// Short names the backend accepts directly.
const VALID_MODELS: &[&str] = &["claude-sonnet-4.5", "claude-haiku-4.5", "claude-opus-4.5"];

/// Dated and legacy names mapped to short names. Claude 3.5 models are
/// folded into Sonnet 4.5; the backend no longer serves them.
const CANONICAL_TO_SHORT: &[(&str, &str)] = &[
    ("claude-sonnet-4-20250514", "claude-sonnet-4.5"),
    ("claude-sonnet-4-5-20250929", "claude-sonnet-4.5"),
    ("claude-haiku-4-5-20251001", "claude-haiku-4.5"),
    ("claude-opus-4-5-20251101", "claude-opus-4.5"),
    ("claude-3-5-sonnet-20241022", "claude-sonnet-4.5"),
    ("claude-3-5-sonnet-20240620", "claude-sonnet-4.5"),
    ("claude-3-5-haiku-20241022", "claude-sonnet-4.5"),
    ("claude-sonnet-4-5", "claude-sonnet-4.5"),
    ("claude-haiku-4-5", "claude-haiku-4.5"),
    ("claude-opus-4-5", "claude-opus-4.5"),
];

const MAX_MODEL_NAME_LEN: usize = 100;
const WARNED_CAP: usize = 128;

/// Map a requested model name to a backend model id.
///
/// Normalizes (trim, lower-case, length cap), strips a trailing
/// `-thinking` suffix, and resolves short names, canonical aliases, and
/// the `auto` pseudo-model. Returns the mapped id and whether the name
/// requested thinking mode via its suffix.
pub fn map_model_name(requested: &str) -> (String, bool) {
    let mut normalized = requested.trim().to_lowercase();
    if normalized.len() > MAX_MODEL_NAME_LEN {
        warn!(len = normalized.len(), "model name too long, falling back to default");
        return (DEFAULT_MODEL.to_string(), false);
    }

    let mut thinking_requested = false;
    if let Some(stripped) = normalized.strip_suffix("-thinking") {
        thinking_requested = true;
        normalized = stripped.to_string();
        info!(model = %normalized, "thinking suffix detected");
    }

    // `auto` is not accepted by the backend; it falls through to the default.
    if normalized != "auto" && VALID_MODELS.contains(&normalized.as_str()) {
        return (normalized, thinking_requested);
    }

    if let Some((_, short)) = CANONICAL_TO_SHORT.iter().find(|(k, _)| *k == normalized) {
        return ((*short).to_string(), thinking_requested);
    }

    warn_unknown_once(&normalized, requested);
    (DEFAULT_MODEL.to_string(), thinking_requested)
}

/// Truncate and escape a client-supplied model name for log output.
pub(crate) fn sanitize_model_name(name: &str) -> String {
    let mut safe: String = name.chars().take(50).collect::<String>().replace('\n', "\\n").replace('\r', "\\r");
    if name.chars().count() > 50 {
        safe.push_str("...");
    }
    safe
}

/// Warn about an unknown model once per name, with a bounded memory of
/// names already warned about.
fn warn_unknown_once(normalized: &str, requested: &str) {
    static WARNED: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();
    let warned = WARNED.get_or_init(|| Mutex::new(VecDeque::new()));
    let mut warned = match warned.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if warned.iter().any(|w| w == normalized) {
        debug!(model = %sanitize_model_name(requested), "unknown model (already warned)");
        return;
    }
    warn!(
        model = %sanitize_model_name(requested),
        fallback = DEFAULT_MODEL,
        "unknown model, falling back to default"
    );
    warned.push_back(normalized.to_string());
    if warned.len() > WARNED_CAP {
        warned.pop_front();
    }
}
