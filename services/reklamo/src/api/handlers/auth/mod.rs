//! Password and two-factor authentication endpoints.
//!
//! Login is a small state machine: a password check either issues a
//! session token directly or parks the attempt behind a short-lived
//! pending marker that a TOTP code must redeem. Sessions are stateless
//! HS256 tokens; the only server-side state is the pending marker map
//! and the fixed-window rate-limit counters guarding the endpoints.

mod error;
pub(crate) mod login;
pub(crate) mod rate_limit;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod two_factor;
pub(crate) mod types;
mod utils;

pub use error::{AuthError, ErrorResponse};
pub use rate_limit::{
    CounterStore, FixedWindowRateLimiter, MemoryCounterStore, NoopRateLimiter, RateLimitAction,
    RateLimitPolicy, RateLimiter,
};
pub use state::{AuthConfig, AuthState};
pub use storage::{
    CredentialStore, MemoryCredentialStore, PgCredentialStore, Role, StoreError, UserRecord,
};
