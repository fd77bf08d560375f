//! Shared state behind the auth endpoints: configuration, credential
//! storage, and the in-flight two-factor logins.

use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::rate_limit::RateLimiter;
use super::storage::CredentialStore;
use crate::totp::TotpEngine;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_PENDING_LOGIN_TTL_SECONDS: u64 = 5 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    pending_login_ttl_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            pending_login_ttl_seconds: DEFAULT_PENDING_LOGIN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_pending_login_ttl_seconds(mut self, seconds: u64) -> Self {
        self.pending_login_ttl_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn pending_login_ttl_seconds(&self) -> u64 {
        self.pending_login_ttl_seconds
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

struct PendingLogin {
    user_id: i64,
    created_at: Instant,
}

/// Markers for logins that passed the password check and await a TOTP code.
///
/// Single-use and short-lived; the marker is consumed only on a successful
/// code check, so a wrong code leaves the login attempt intact.
pub struct PendingTwoFactor {
    ttl: Duration,
    pending: Mutex<HashMap<Uuid, PendingLogin>>,
}

impl PendingTwoFactor {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub(super) async fn store(&self, user_id: i64) -> Uuid {
        let marker = Uuid::new_v4();
        let entry = PendingLogin {
            user_id,
            created_at: Instant::now(),
        };
        let mut pending = self.pending.lock().await;
        // Expired markers are swept on insert rather than on a timer.
        pending.retain(|_, login| login.created_at.elapsed() < self.ttl);
        pending.insert(marker, entry);
        marker
    }

    /// Non-consuming lookup used before the code check.
    pub(super) async fn peek(&self, marker: Uuid) -> Option<i64> {
        let pending = self.pending.lock().await;
        match pending.get(&marker) {
            Some(entry) if entry.created_at.elapsed() < self.ttl => Some(entry.user_id),
            _ => None,
        }
    }

    /// Consume the marker after the code check succeeded.
    pub(super) async fn take(&self, marker: Uuid) -> Option<i64> {
        let mut pending = self.pending.lock().await;
        match pending.remove(&marker) {
            Some(entry) if entry.created_at.elapsed() < self.ttl => Some(entry.user_id),
            _ => None,
        }
    }
}

pub struct AuthState {
    config: AuthConfig,
    session_secret: SecretString,
    store: Arc<dyn CredentialStore>,
    rate_limiter: Arc<dyn RateLimiter>,
    pending: PendingTwoFactor,
    totp: TotpEngine,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        session_secret: SecretString,
        store: Arc<dyn CredentialStore>,
        rate_limiter: Arc<dyn RateLimiter>,
        totp: TotpEngine,
    ) -> Self {
        let pending =
            PendingTwoFactor::new(Duration::from_secs(config.pending_login_ttl_seconds()));
        Self {
            config,
            session_secret,
            store,
            rate_limiter,
            pending,
            totp,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn session_secret(&self) -> &SecretString {
        &self.session_secret
    }

    pub(super) fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(super) fn pending(&self) -> &PendingTwoFactor {
        &self.pending
    }

    pub(super) fn totp(&self) -> &TotpEngine {
        &self.totp
    }
}
