//! Turns parsed CLI matches into an [`Action`].
//!
//! `clap` has already type-checked every flag by the time `handler` runs;
//! this layer bundles them into the server's startup arguments and rejects
//! what clap cannot express on its own, like a too-short session secret.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_SESSION_SECRET, auth, rate_limit};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Build the server action from validated matches.
///
/// # Errors
/// Returns an error when a required flag is absent or fails validation.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    // Refuse to boot with a signing secret too weak to matter.
    crate::cli::commands::validate(matches).map_err(anyhow::Error::msg)?;

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = required(matches, "dsn", "dsn")?;
    let session_secret =
        SecretString::from(required(matches, ARG_SESSION_SECRET, "session-secret")?);

    let auth_opts = auth::Options::parse(matches)?;
    let rate_limits = rate_limit::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        session_secret,
        frontend_base_url: auth_opts.frontend_base_url,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        pending_ttl_seconds: auth_opts.pending_ttl_seconds,
        totp_issuer: auth_opts.totp_issuer,
        totp_skew: auth_opts.totp_skew,
        rate_limits,
    }))
}

fn required(matches: &clap::ArgMatches, id: &str, flag: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{flag}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_session_secret_fails_dispatch() {
        temp_env::with_vars(
            [
                (
                    "REKLAMO_DSN",
                    Some("postgres://user@localhost:5432/reklamo"),
                ),
                ("REKLAMO_SESSION_SECRET", Some("too-short")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["reklamo"]);
                let err = match handler(&matches) {
                    Ok(_) => panic!("dispatch accepted a 9-byte secret"),
                    Err(err) => err,
                };
                assert!(err.to_string().contains("at least 32 bytes"));
            },
        );
    }

    #[test]
    fn env_configured_server_action() {
        temp_env::with_vars(
            [
                (
                    "REKLAMO_DSN",
                    Some("postgres://user@localhost:5432/reklamo"),
                ),
                (
                    "REKLAMO_SESSION_SECRET",
                    Some("0123456789abcdef0123456789abcdef"),
                ),
                ("REKLAMO_RATE_LIMIT_UPLOAD_MAX", Some("20")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["reklamo"]);
                let Ok(Action::Server(args)) = handler(&matches) else {
                    panic!("expected a server action");
                };
                assert_eq!(args.port, 8080);
                assert_eq!(args.frontend_base_url, "https://reklamo.dev");
                assert_eq!(args.session_ttl_seconds, 604_800);
                assert_eq!(args.rate_limits.login.max_requests, 5);
                assert_eq!(args.rate_limits.upload.max_requests, 20);
            },
        );
    }
}
