//! Command-line interface.

use clap::{Parser, Subcommand};

/// adpulse - Active Directory administration service
#[derive(Parser)]
#[command(name = "adpulse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP API and the change monitor (default)
    #[command(alias = "daemon", alias = "-d")]
    Serve,

    /// Write a default config.toml if none exists
    Init,

    /// Bind to the configured directory and read the base DN
    CheckConnection,

    /// Run one change-monitor pass and exit
    DetectChanges,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::parse_from(["adpulse"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["adpulse", "check-connection"]);
        assert_eq!(cli.command, Some(Commands::CheckConnection));

        let cli = Cli::parse_from(["adpulse", "daemon"]);
        assert_eq!(cli.command, Some(Commands::Serve));
    }
}
