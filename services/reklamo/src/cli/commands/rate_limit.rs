use clap::{Arg, ArgMatches, Command};

pub const ARG_LOGIN_MAX: &str = "rate-limit-login-max";
pub const ARG_LOGIN_WINDOW_SECONDS: &str = "rate-limit-login-window-seconds";
pub const ARG_API_MAX: &str = "rate-limit-api-max";
pub const ARG_API_WINDOW_SECONDS: &str = "rate-limit-api-window-seconds";
pub const ARG_UPLOAD_MAX: &str = "rate-limit-upload-max";
pub const ARG_UPLOAD_WINDOW_SECONDS: &str = "rate-limit-upload-window-seconds";

/// One guard's quota as parsed from the CLI (window in seconds).
#[derive(Debug, Clone, Copy)]
pub struct GuardOptions {
    pub max_requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub login: GuardOptions,
    pub api: GuardOptions,
    pub upload: GuardOptions,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let guard = |max_arg: &str, window_arg: &str, max: u32, window: u64| GuardOptions {
            max_requests: matches.get_one::<u32>(max_arg).copied().unwrap_or(max),
            window_seconds: matches
                .get_one::<u64>(window_arg)
                .copied()
                .unwrap_or(window),
        };

        Self {
            login: guard(ARG_LOGIN_MAX, ARG_LOGIN_WINDOW_SECONDS, 5, 900),
            api: guard(ARG_API_MAX, ARG_API_WINDOW_SECONDS, 100, 900),
            upload: guard(ARG_UPLOAD_MAX, ARG_UPLOAD_WINDOW_SECONDS, 10, 3600),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_MAX)
                .long(ARG_LOGIN_MAX)
                .help("Login guard: attempts allowed per window")
                .env("REKLAMO_RATE_LIMIT_LOGIN_MAX")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_LOGIN_WINDOW_SECONDS)
                .long(ARG_LOGIN_WINDOW_SECONDS)
                .help("Login guard: window length in seconds")
                .env("REKLAMO_RATE_LIMIT_LOGIN_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_API_MAX)
                .long(ARG_API_MAX)
                .help("API guard: requests allowed per window")
                .env("REKLAMO_RATE_LIMIT_API_MAX")
                .default_value("100")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_API_WINDOW_SECONDS)
                .long(ARG_API_WINDOW_SECONDS)
                .help("API guard: window length in seconds")
                .env("REKLAMO_RATE_LIMIT_API_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_UPLOAD_MAX)
                .long(ARG_UPLOAD_MAX)
                .help("Upload guard: uploads allowed per window")
                .env("REKLAMO_RATE_LIMIT_UPLOAD_MAX")
                .default_value("10")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_UPLOAD_WINDOW_SECONDS)
                .long(ARG_UPLOAD_WINDOW_SECONDS)
                .help("Upload guard: window length in seconds")
                .env("REKLAMO_RATE_LIMIT_UPLOAD_WINDOW_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
}
