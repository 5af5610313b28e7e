// SPDX-License-Identifier: MIT OR Apache-2.0
//! Account-store contract.
//!
//! The gateway multiplexes upstream requests across a pool of
//! OIDC-authenticated accounts. Persistence and rotation policy belong to
//! the host; the core only reports outcomes through this trait. The
//! in-memory implementation backs tests and single-account deployments.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Counters and status tracked per upstream account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountStatus {
    /// Whether the account participates in rotation.
    pub enabled: bool,
    /// Requests that completed against this account.
    pub success_count: u64,
    /// Requests that failed against this account.
    pub error_count: u64,
    /// Outcome of the most recent token refresh.
    pub last_refresh_ok: Option<bool>,
    /// When the most recent token refresh ran.
    pub last_refresh_at: Option<DateTime<Utc>>,
}

/// Host-implemented store of upstream accounts, keyed by opaque id.
pub trait AccountStore: Send + Sync {
    /// Enable or disable an account for rotation.
    fn set_enabled(&self, account_id: &str, enabled: bool);

    /// Whether the account is currently enabled.
    fn is_enabled(&self, account_id: &str) -> bool;

    /// Record a completed request.
    fn record_success(&self, account_id: &str);

    /// Record a failed request.
    fn record_error(&self, account_id: &str);

    /// Record a token-refresh attempt.
    fn record_refresh(&self, account_id: &str, ok: bool, at: DateTime<Utc>);

    /// Status snapshot, when the account is known.
    fn status(&self, account_id: &str) -> Option<AccountStatus>;
}

/// In-memory [`AccountStore`].
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, AccountStatus>>,
}

impl MemoryAccountStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<R>(&self, account_id: &str, f: impl FnOnce(&mut AccountStatus) -> R) -> R {
        let mut accounts = match self.accounts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = accounts.entry(account_id.to_string()).or_insert_with(|| {
            AccountStatus {
                enabled: true,
                ..AccountStatus::default()
            }
        });
        f(entry)
    }
}

impl AccountStore for MemoryAccountStore {
    fn set_enabled(&self, account_id: &str, enabled: bool) {
        self.with_entry(account_id, |status| status.enabled = enabled);
    }

    fn is_enabled(&self, account_id: &str) -> bool {
        self.with_entry(account_id, |status| status.enabled)
    }

    fn record_success(&self, account_id: &str) {
        self.with_entry(account_id, |status| status.success_count += 1);
    }

    fn record_error(&self, account_id: &str) {
        self.with_entry(account_id, |status| status.error_count += 1);
    }

    fn record_refresh(&self, account_id: &str, ok: bool, at: DateTime<Utc>) {
        self.with_entry(account_id, |status| {
            status.last_refresh_ok = Some(ok);
            status.last_refresh_at = Some(at);
        });
    }

    fn status(&self, account_id: &str) -> Option<AccountStatus> {
        let accounts = match self.accounts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        accounts.get(account_id).cloned()
    }
}
