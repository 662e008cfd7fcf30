//! Command-line interface handling for the Werewolf control service.

use clap::{value_parser, Arg, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
///
/// Every option except the config path overrides the matching setting from
/// the configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the node bind address
    pub bind_address: Option<String>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for per-node game capacity
    pub max_games_per_node: Option<usize>,
}

impl CliArgs {
    /// Parses command line arguments from the process environment.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parses an explicit argument list, for tests.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&Self::command().try_get_matches_from(args)?))
    }

    fn command() -> Command {
        Command::new("Werewolf Control")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Routes Werewolf chat commands to a pool of game nodes")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("config.toml"),
            )
            .arg(
                Arg::new("bind")
                    .short('b')
                    .long("bind")
                    .value_name("ADDRESS")
                    .help("Address nodes connect to (e.g., 0.0.0.0:9050)"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("max-games")
                    .short('m')
                    .long("max-games-per-node")
                    .value_name("COUNT")
                    .help("Most games placed on a single node")
                    .value_parser(value_parser!(usize)),
            )
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            bind_address: matches.get_one::<String>("bind").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            max_games_per_node: matches.get_one::<usize>("max-games").copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["werewolf-control"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("config.toml"));
        assert!(args.bind_address.is_none());
        assert!(args.log_level.is_none());
        assert!(!args.json_logs);
        assert!(args.max_games_per_node.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::try_parse_from([
            "werewolf-control",
            "-c",
            "prod.toml",
            "--bind",
            "0.0.0.0:9000",
            "--log-level",
            "debug",
            "--json-logs",
            "--max-games-per-node",
            "12",
        ])
        .unwrap();
        assert_eq!(args.config_path, PathBuf::from("prod.toml"));
        assert_eq!(args.bind_address.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert_eq!(args.max_games_per_node, Some(12));
    }

    #[test]
    fn test_rejects_non_numeric_capacity() {
        assert!(CliArgs::try_parse_from(["werewolf-control", "-m", "lots"]).is_err());
    }
}
