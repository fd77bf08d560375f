//! Fixed-window request limiter and the guards in front of the auth flows.
//!
//! Fixed-window counters keyed by client identity. Each guard (login, general
//! API, uploads) has its own limit/window pair and its own keyspace, so
//! exhausting one guard never starves another. Counters live behind the
//! [`CounterStore`] trait; the in-process [`MemoryCounterStore`] is the
//! single-process default and a shared cache can replace it in a
//! multi-process deployment.

use axum::http::{HeaderMap, HeaderName, HeaderValue, header::RETRY_AFTER};
use rand::Rng;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::debug;

pub const DEFAULT_LOGIN_MAX_REQUESTS: u32 = 5;
pub const DEFAULT_LOGIN_WINDOW_MS: u64 = 15 * 60 * 1000;
pub const DEFAULT_API_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_API_WINDOW_MS: u64 = 15 * 60 * 1000;
pub const DEFAULT_UPLOAD_MAX_REQUESTS: u32 = 10;
pub const DEFAULT_UPLOAD_WINDOW_MS: u64 = 60 * 60 * 1000;

/// Chance that a hit also sweeps expired windows from the store.
const SWEEP_PROBABILITY: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Login,
    Api,
    Upload,
}

impl RateLimitAction {
    /// Keyspace prefix. Guards never share counters.
    #[must_use]
    pub const fn keyspace(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Api => "api",
            Self::Upload => "upload",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the current window ends (unix milliseconds).
    pub reset_unix_ms: u64,
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, client_id: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _client_id: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            limit: u32::MAX,
            remaining: u32::MAX,
            reset_unix_ms: 0,
        }
    }
}

/// Storage seam for fixed-window counters.
pub trait CounterStore: Send + Sync {
    /// Record a hit against `key` and return the resulting decision.
    ///
    /// Implementations must serialize the read-then-write per key so
    /// concurrent hits cannot undercount.
    fn hit(&self, key: &str, policy: RateLimitPolicy, now_unix_ms: u64) -> RateLimitDecision;
}

#[derive(Debug)]
struct WindowRecord {
    count: u32,
    reset_unix_ms: u64,
}

/// Process-wide counter map behind a single mutex.
///
/// Expired records are not purged promptly; a probabilistic sweep trims them
/// opportunistically and every read re-checks the window boundary, so stale
/// records never affect decisions.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, WindowRecord>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep_expired(windows: &mut HashMap<String, WindowRecord>, now_unix_ms: u64) {
        windows.retain(|_, record| record.reset_unix_ms > now_unix_ms);
    }
}

impl CounterStore for MemoryCounterStore {
    fn hit(&self, key: &str, policy: RateLimitPolicy, now_unix_ms: u64) -> RateLimitDecision {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if rand::thread_rng().gen::<f64>() < SWEEP_PROBABILITY {
            Self::sweep_expired(&mut windows, now_unix_ms);
        }

        match windows.get_mut(key) {
            Some(record) if now_unix_ms < record.reset_unix_ms => {
                if record.count >= policy.max_requests {
                    // Denied hits do not increment, so a denial never extends the window.
                    return RateLimitDecision {
                        allowed: false,
                        limit: policy.max_requests,
                        remaining: 0,
                        reset_unix_ms: record.reset_unix_ms,
                    };
                }
                record.count += 1;
                RateLimitDecision {
                    allowed: true,
                    limit: policy.max_requests,
                    remaining: policy.max_requests - record.count,
                    reset_unix_ms: record.reset_unix_ms,
                }
            }
            _ => {
                let reset_unix_ms = now_unix_ms + policy.window_ms;
                windows.insert(
                    key.to_string(),
                    WindowRecord {
                        count: 1,
                        reset_unix_ms,
                    },
                );
                RateLimitDecision {
                    allowed: true,
                    limit: policy.max_requests,
                    remaining: policy.max_requests.saturating_sub(1),
                    reset_unix_ms,
                }
            }
        }
    }
}

/// Fixed-window limiter with independent per-guard policies and keyspaces.
#[derive(Clone)]
pub struct FixedWindowRateLimiter {
    store: Arc<dyn CounterStore>,
    login: RateLimitPolicy,
    api: RateLimitPolicy,
    upload: RateLimitPolicy,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            login: RateLimitPolicy::new(DEFAULT_LOGIN_MAX_REQUESTS, DEFAULT_LOGIN_WINDOW_MS),
            api: RateLimitPolicy::new(DEFAULT_API_MAX_REQUESTS, DEFAULT_API_WINDOW_MS),
            upload: RateLimitPolicy::new(DEFAULT_UPLOAD_MAX_REQUESTS, DEFAULT_UPLOAD_WINDOW_MS),
        }
    }

    #[must_use]
    pub fn with_login_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.login = policy;
        self
    }

    #[must_use]
    pub fn with_api_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.api = policy;
        self
    }

    #[must_use]
    pub fn with_upload_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.upload = policy;
        self
    }

    #[must_use]
    pub fn policy(&self, action: RateLimitAction) -> RateLimitPolicy {
        match action {
            RateLimitAction::Login => self.login,
            RateLimitAction::Api => self.api,
            RateLimitAction::Upload => self.upload,
        }
    }

    /// Deterministic variant; [`RateLimiter::check`] supplies the wall clock.
    #[must_use]
    pub fn check_at(
        &self,
        client_id: &str,
        action: RateLimitAction,
        now_unix_ms: u64,
    ) -> RateLimitDecision {
        let key = format!("{}:{client_id}", action.keyspace());
        self.store.hit(&key, self.policy(action), now_unix_ms)
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check(&self, client_id: &str, action: RateLimitAction) -> RateLimitDecision {
        let decision = self.check_at(client_id, action, now_unix_ms());
        if !decision.allowed {
            debug!(client_id, action = ?action, "rate limit exceeded");
        }
        decision
    }
}

/// Quota headers for rate-limited responses.
///
/// `X-RateLimit-Reset` is unix seconds; `Retry-After` is attached on denial
/// only, rounded up and never less than one second.
#[must_use]
pub fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(decision.remaining),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-reset"),
        HeaderValue::from(decision.reset_unix_ms / 1000),
    );

    if !decision.allowed {
        let retry_after = decision
            .reset_unix_ms
            .saturating_sub(now_unix_ms())
            .div_ceil(1000)
            .max(1);
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    }

    headers
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const WINDOW_MS: u64 = 900_000;

    fn limiter() -> FixedWindowRateLimiter {
        FixedWindowRateLimiter::new(Arc::new(MemoryCounterStore::new()))
            .with_login_policy(RateLimitPolicy::new(5, WINDOW_MS))
    }

    #[test]
    fn first_n_hits_allowed_then_denied() {
        let limiter = limiter();
        let start = 1_000;

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check_at("10.0.0.1", RateLimitAction::Login, start);
            assert!(decision.allowed);
            assert_eq!(decision.limit, 5);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.reset_unix_ms, start + WINDOW_MS);
        }

        let decision = limiter.check_at("10.0.0.1", RateLimitAction::Login, start + 10);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_unix_ms, start + WINDOW_MS);
    }

    #[test]
    fn window_elapses_and_counter_resets() {
        let limiter = limiter();
        let start = 1_000;

        for _ in 0..6 {
            limiter.check_at("10.0.0.1", RateLimitAction::Login, start);
        }

        let decision = limiter.check_at("10.0.0.1", RateLimitAction::Login, start + WINDOW_MS);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.reset_unix_ms, start + WINDOW_MS + WINDOW_MS);
    }

    #[test]
    fn denial_does_not_extend_window() {
        let limiter = limiter();
        let start = 1_000;

        for _ in 0..5 {
            limiter.check_at("10.0.0.1", RateLimitAction::Login, start);
        }

        // Hammering a denied key must not move the reset time.
        for offset in [10, 100, 1_000, 100_000] {
            let decision = limiter.check_at("10.0.0.1", RateLimitAction::Login, start + offset);
            assert!(!decision.allowed);
            assert_eq!(decision.reset_unix_ms, start + WINDOW_MS);
        }
    }

    #[test]
    fn clients_are_independent() {
        let limiter = limiter();
        let start = 1_000;

        for _ in 0..6 {
            limiter.check_at("10.0.0.1", RateLimitAction::Login, start);
        }

        let decision = limiter.check_at("10.0.0.2", RateLimitAction::Login, start);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn guards_are_independent() {
        let limiter = limiter();
        let start = 1_000;

        for _ in 0..6 {
            limiter.check_at("10.0.0.1", RateLimitAction::Login, start);
        }

        let login = limiter.check_at("10.0.0.1", RateLimitAction::Login, start);
        assert!(!login.allowed);

        let api = limiter.check_at("10.0.0.1", RateLimitAction::Api, start);
        assert!(api.allowed);
        assert_eq!(api.limit, DEFAULT_API_MAX_REQUESTS);
    }

    #[test]
    fn expired_records_do_not_affect_decisions() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
        let limiter = FixedWindowRateLimiter::new(Arc::clone(&store))
            .with_login_policy(RateLimitPolicy::new(2, WINDOW_MS));

        limiter.check_at("10.0.0.1", RateLimitAction::Login, 0);
        limiter.check_at("10.0.0.1", RateLimitAction::Login, 0);

        // The record may still be in the map; the decision must ignore it.
        let decision = limiter.check_at("10.0.0.1", RateLimitAction::Login, WINDOW_MS + 1);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn sweep_drops_only_elapsed_windows() {
        let mut windows = HashMap::new();
        windows.insert(
            "login:10.0.0.1".to_string(),
            WindowRecord {
                count: 3,
                reset_unix_ms: 100,
            },
        );
        windows.insert(
            "login:10.0.0.2".to_string(),
            WindowRecord {
                count: 1,
                reset_unix_ms: 500,
            },
        );

        MemoryCounterStore::sweep_expired(&mut windows, 200);

        assert!(!windows.contains_key("login:10.0.0.1"));
        assert!(windows.contains_key("login:10.0.0.2"));
    }

    #[test]
    fn denied_headers_report_quota() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 5,
            remaining: 0,
            reset_unix_ms: 42_000,
        };
        let headers = rate_limit_headers(&decision);

        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
        assert_eq!(headers.get("x-ratelimit-reset").unwrap(), "42");
        assert!(headers.get(RETRY_AFTER).is_some());
    }

    #[test]
    fn allowed_headers_skip_retry_after() {
        let decision = RateLimitDecision {
            allowed: true,
            limit: 5,
            remaining: 3,
            reset_unix_ms: 42_000,
        };
        let headers = rate_limit_headers(&decision);

        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "3");
        assert!(headers.get(RETRY_AFTER).is_none());
    }

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        let decision = limiter.check("10.0.0.1", RateLimitAction::Login);
        assert!(decision.allowed);
    }
}
