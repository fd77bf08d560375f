use crate::{
    api,
    api::handlers::auth::{AuthConfig, FixedWindowRateLimiter, MemoryCounterStore, RateLimitPolicy},
    cli::commands::rate_limit,
    totp::TotpEngine,
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub session_secret: SecretString,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub pending_ttl_seconds: u64,
    pub totp_issuer: String,
    pub totp_skew: u8,
    pub rate_limits: rate_limit::Options,
}

/// Boot the API server from parsed CLI arguments.
/// # Errors
/// Fails when the listener cannot bind or a startup dependency is unreachable.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_pending_login_ttl_seconds(args.pending_ttl_seconds);

    let totp = TotpEngine::new(args.totp_issuer).with_skew(args.totp_skew);

    let rate_limiter = Arc::new(
        FixedWindowRateLimiter::new(Arc::new(MemoryCounterStore::new()))
            .with_login_policy(policy(args.rate_limits.login))
            .with_api_policy(policy(args.rate_limits.api))
            .with_upload_policy(policy(args.rate_limits.upload)),
    );

    api::new(
        args.port,
        args.dsn,
        args.session_secret,
        auth_config,
        totp,
        rate_limiter,
    )
    .await
}

// CLI windows are in seconds; the limiter counts in milliseconds.
fn policy(guard: rate_limit::GuardOptions) -> RateLimitPolicy {
    RateLimitPolicy::new(
        guard.max_requests,
        guard.window_seconds.saturating_mul(1000),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_converts_seconds_to_milliseconds() {
        let converted = policy(rate_limit::GuardOptions {
            max_requests: 5,
            window_seconds: 900,
        });
        assert_eq!(converted, RateLimitPolicy::new(5, 900_000));
    }
}
