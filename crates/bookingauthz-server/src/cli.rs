use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bookingauthz", version)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate the configuration and evaluate the system expressions.
    Check,
    /// Print the object types with their roles and propagation rules.
    Registry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_parses_check_subcommand() {
        let cli = Cli::parse_from(["bookingauthz", "check"]);
        assert!(matches!(cli.command, Some(Command::Check)));
    }

    #[test]
    fn cli_parses_registry_subcommand() {
        let cli = Cli::parse_from(["bookingauthz", "registry"]);
        assert!(matches!(cli.command, Some(Command::Registry)));
    }

    #[test]
    fn cli_defaults_to_no_subcommand() {
        let cli = Cli::parse_from(["bookingauthz"]);
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_config_flag_works_after_subcommand() {
        let cli = Cli::parse_from([
            "bookingauthz",
            "registry",
            "--config",
            "/etc/bookingauthz.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/bookingauthz.toml")));
        assert!(matches!(cli.command, Some(Command::Registry)));
    }

    #[test]
    fn cli_rejects_unknown_subcommand() {
        let result = Cli::try_parse_from(["bookingauthz", "serve"]);
        assert!(result.is_err());
    }
}
