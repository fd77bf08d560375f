use clap::{Arg, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Accepts either a repeat count (`-vvv`, or `0`..`5` via the env var) or a
/// level name; both normalize to the count `start.rs` maps to a level.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(|level: &str| -> std::result::Result<u8, String> {
        match level.parse::<u8>() {
            Ok(count) if count <= 5 => Ok(count),
            _ => match level.to_lowercase().as_str() {
                "error" => Ok(0),
                "warn" => Ok(1),
                "info" => Ok(2),
                "debug" => Ok(3),
                "trace" => Ok(4),
                _ => Err("invalid log level".to_string()),
            },
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("REKLAMO_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
