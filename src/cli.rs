//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Client for WMP (Wi-Fi air-conditioning controllers)
#[derive(Parser, Debug)]
#[command(name = "wmp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Device address (overrides config)
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// WMP port (overrides config, default: 3310)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Config file (default: wmp.toml next to the executable)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log in before the command and out after it
    #[arg(long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Show device identity
    Id,

    /// Show device information
    Info,

    /// Read a feature (ONOFF, MODE, SETPTEMP, FANSP, ...)
    Get {
        #[arg(value_name = "FEATURE")]
        feature: String,
    },

    /// Write a feature
    Set {
        #[arg(value_name = "FEATURE")]
        feature: String,
        #[arg(value_name = "VALUE", allow_hyphen_values = true)]
        value: String,
    },

    /// Read the set-point temperature, or set it when DEGREES is given
    Temp {
        #[arg(value_name = "DEGREES", allow_hyphen_values = true)]
        degrees: Option<f64>,
    },

    /// Read the ambient temperature
    Ambient,

    /// Turn the unit on
    On,

    /// Turn the unit off
    Off,

    /// Print feature change notifications until interrupted
    Watch,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_defaults() {
        let cli = Cli::parse_from(["wmp", "id"]);
        assert!(!cli.verbose);
        assert!(!cli.json);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.config.is_none());
        assert_eq!(cli.command, Command::Id);
    }

    #[test]
    fn test_cli_parse_verbose() {
        let cli = Cli::parse_from(["wmp", "-v", "info"]);
        assert!(cli.verbose);

        let cli = Cli::parse_from(["wmp", "--verbose", "info"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_parse_connection_overrides() {
        let cli = Cli::parse_from([
            "wmp",
            "--host",
            "192.168.100.246",
            "--port",
            "3311",
            "--password",
            "secret",
            "on",
        ]);
        assert_eq!(cli.host.as_deref(), Some("192.168.100.246"));
        assert_eq!(cli.port, Some(3311));
        assert_eq!(cli.password.as_deref(), Some("secret"));
        assert_eq!(cli.command, Command::On);
    }

    #[test]
    fn test_cli_parse_set() {
        let cli = Cli::parse_from(["wmp", "set", "MODE", "HEAT"]);
        assert_eq!(
            cli.command,
            Command::Set {
                feature: "MODE".into(),
                value: "HEAT".into()
            }
        );
    }

    #[test]
    fn test_cli_parse_temp() {
        let cli = Cli::parse_from(["wmp", "temp"]);
        assert_eq!(cli.command, Command::Temp { degrees: None });

        let cli = Cli::parse_from(["wmp", "temp", "21.5"]);
        assert_eq!(cli.command, Command::Temp { degrees: Some(21.5) });
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["wmp"]).is_err());
    }

    #[test]
    fn test_cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["wmp", "--port", "99999", "id"]).is_err());
    }
}
