use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!(
            "{} - {}",
            env!("CARGO_PKG_VERSION"),
            crate::api::GIT_COMMIT_HASH
        )
        .into_boxed_str(),
    );

    Command::new("gardi")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("GARDI_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("token-secret")
                .long("token-secret")
                .help("Process-wide session token signing secret, loaded once and never rotated mid-process")
                .env("GARDI_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("token-ttl")
                .long("token-ttl")
                .help("Session token time-to-live in seconds")
                .default_value("86400")
                .env("GARDI_TOKEN_TTL")
                .value_parser(clap::value_parser!(i64).range(60..)),
        )
        .arg(
            Arg::new("groups")
                .long("groups")
                .help("Closed vocabulary of group names usable in authorization decisions, comma separated. Must include Admin")
                .default_value("Admin,User,Moderator")
                .env("GARDI_GROUPS"),
        )
        .arg(
            Arg::new("group-backend")
                .long("group-backend")
                .help("Single source of truth for group membership")
                .default_value("directory")
                .env("GARDI_GROUP_BACKEND")
                .value_parser(["directory", "memory"]),
        )
        .arg(
            Arg::new("directory-timeout")
                .long("directory-timeout")
                .help("Bound in seconds on every credential directory call")
                .default_value("5")
                .env("GARDI_DIRECTORY_TIMEOUT")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("challenge-ttl")
                .long("challenge-ttl")
                .help("Lifetime in seconds of an outstanding login challenge session")
                .default_value("300")
                .env("GARDI_CHALLENGE_TTL")
                .value_parser(clap::value_parser!(u64).range(30..)),
        )
        .arg(
            Arg::new("bootstrap-admin")
                .long("bootstrap-admin")
                .help("Seed this username into the in-process directory with the Admin group")
                .env("GARDI_BOOTSTRAP_ADMIN")
                .requires("bootstrap-admin-password"),
        )
        .arg(
            Arg::new("bootstrap-admin-password")
                .long("bootstrap-admin-password")
                .help("Password for the bootstrap admin")
                .env("GARDI_BOOTSTRAP_ADMIN_PASSWORD")
                .hide_env_values(true)
                .requires("bootstrap-admin"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("GARDI_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
