//! # Reklamo identity service
//!
//! `reklamo` is the authentication authority of the Reklamo consumer
//! complaint platform (users file complaints against companies, companies
//! respond, admins moderate). It owns password login, the optional TOTP
//! second factor, and stateless signed sessions.
//!
//! ## Sessions
//!
//! A successful login mints an HS256-signed session token (see the
//! `session_token` crate) carried in an `HttpOnly` cookie for up to 7 days.
//! Nothing is persisted server-side and there is no revocation list; logout
//! simply clears the cookie and the token ages out on its own.
//!
//! ## Two-factor flow
//!
//! When a 2FA-enabled account passes the password check, the service issues a
//! short-lived (5 minute) pending marker instead of a session. The marker
//! authorizes exactly one thing: the second-factor verification endpoint.
//! A successful TOTP check consumes the marker and mints the session.
//!
//! ## Rate limiting
//!
//! Sensitive endpoints sit behind fixed-window counters keyed by client
//! address, with independent guards for login, general API, and uploads.
//! Denials answer `429` with `X-RateLimit-*` and `Retry-After` headers
//! before any credential is examined.

pub mod api;
pub mod cli;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_is_hex_or_unknown() {
        if GIT_COMMIT_HASH == "unknown" {
            // Builds from a source tarball have no git metadata.
            return;
        }
        assert!(GIT_COMMIT_HASH.len() >= 7, "commit hash too short: {GIT_COMMIT_HASH}");
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "commit hash is not hex: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn user_agent_is_name_slash_version() {
        let expected = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        assert_eq!(APP_USER_AGENT, expected);
    }
}
