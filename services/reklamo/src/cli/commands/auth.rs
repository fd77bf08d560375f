use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_PENDING_TTL_SECONDS: &str = "two-factor-pending-ttl-seconds";
pub const ARG_TOTP_ISSUER: &str = "totp-issuer";
pub const ARG_TOTP_SKEW: &str = "totp-skew";

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub pending_ttl_seconds: u64,
    pub totp_issuer: String,
    pub totp_skew: u8,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Fails when the frontend base URL is absent or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .filter(|value| !value.trim().is_empty());
        let Some(frontend_base_url) = frontend_base_url else {
            anyhow::bail!("missing required argument: --{ARG_FRONTEND_BASE_URL}");
        };

        Ok(Self {
            frontend_base_url,
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(7 * 24 * 60 * 60),
            pending_ttl_seconds: matches
                .get_one::<u64>(ARG_PENDING_TTL_SECONDS)
                .copied()
                .unwrap_or(300),
            totp_issuer: matches
                .get_one::<String>(ARG_TOTP_ISSUER)
                .cloned()
                .unwrap_or_else(|| "Reklamo".to_string()),
            totp_skew: matches
                .get_one::<u8>(ARG_TOTP_SKEW)
                .copied()
                .unwrap_or(0),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL; drives CORS and the cookie Secure flag")
                .env("REKLAMO_FRONTEND_BASE_URL")
                .default_value("https://reklamo.dev"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session token and cookie TTL in seconds")
                .env("REKLAMO_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_PENDING_TTL_SECONDS)
                .long(ARG_PENDING_TTL_SECONDS)
                .help("TTL for the pending two-factor login marker in seconds")
                .env("REKLAMO_TWO_FACTOR_PENDING_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_TOTP_ISSUER)
                .long(ARG_TOTP_ISSUER)
                .help("Issuer label shown in authenticator apps")
                .env("REKLAMO_TOTP_ISSUER")
                .default_value("Reklamo"),
        )
        .arg(
            Arg::new(ARG_TOTP_SKEW)
                .long(ARG_TOTP_SKEW)
                .help("Accepted TOTP clock skew in 30-second steps")
                .env("REKLAMO_TOTP_SKEW")
                .default_value("0")
                .value_parser(clap::value_parser!(u8)),
        )
}
